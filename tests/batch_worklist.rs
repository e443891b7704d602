#![cfg(unix)]

mod common;

use std::fs;

use common::{fake_snfsdefrag, write_worklist};
use snfs_defrag::{
    BatchScheduler, BatchState, Config, DefragDispatcher, DefragOptions, Invoker, Worklist,
};

/// Fails once for any path with a `<path>.busy` marker, logging successes
fn flaky_tool(dir: &std::path::Path) -> std::path::PathBuf {
    let log = dir.join("done.log");
    fake_snfsdefrag(
        dir,
        &format!(
            r#"if [ -e "$1.busy" ]; then rm "$1.busy"; exit 1; fi
echo "$1" >> '{}'"#,
            log.display()
        ),
    )
}

#[tokio::test]
async fn test_busy_files_are_retried_on_next_pass() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.mov").display().to_string();
    let b = dir.path().join("b.mov").display().to_string();
    let c = dir.path().join("c.mov").display().to_string();
    fs::write(format!("{}.busy", b), "").unwrap();

    let exe = flaky_tool(dir.path());
    let worklist_path = write_worklist(dir.path(), &[a.as_str(), b.as_str(), c.as_str()]);
    let worklist = Worklist::load(&worklist_path).unwrap();

    let config = Config::testing();
    let dispatcher = DefragDispatcher::new(Invoker::new(exe), DefragOptions::default());
    let mut scheduler = BatchScheduler::new(worklist, dispatcher, &config);
    let report = scheduler.run().await.unwrap();

    assert_eq!(report.state, BatchState::Drained);
    assert_eq!(report.passes, 2);
    assert_eq!(report.dispatched, 4);
    assert_eq!(report.failed_attempts, 1);

    let done = fs::read_to_string(dir.path().join("done.log")).unwrap();
    assert_eq!(done.lines().collect::<Vec<_>>(), vec![a.as_str(), c.as_str(), b.as_str()]);
    assert_eq!(fs::read_to_string(&worklist_path).unwrap(), "");
}

#[tokio::test]
async fn test_missing_tool_drops_items_after_retry_bound() {
    let dir = tempfile::tempdir().unwrap();
    let worklist_path = write_worklist(dir.path(), &["/a/one", "", "/a/two"]);
    let worklist = Worklist::load(&worklist_path).unwrap();

    let mut config = Config::testing();
    config.retry.max_attempts = Some(2);
    let dispatcher = DefragDispatcher::new(
        Invoker::new(dir.path().join("not-installed")),
        DefragOptions::default(),
    );
    let mut scheduler = BatchScheduler::new(worklist, dispatcher, &config);
    let report = scheduler.run().await.unwrap();

    assert_eq!(report.dispatched, 4);
    assert_eq!(report.dropped, vec!["/a/one", "/a/two"]);
    assert!(scheduler.worklist().is_empty());
}

#[tokio::test]
async fn test_interrupted_batch_keeps_unfinished_items() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), "sleep 10");
    let worklist_path = write_worklist(dir.path(), &["/a/one", "/a/two"]);
    let worklist = Worklist::load(&worklist_path).unwrap();

    let config = Config::testing();
    let dispatcher = DefragDispatcher::new(Invoker::new(exe), DefragOptions::default());
    let mut scheduler = BatchScheduler::new(worklist, dispatcher, &config);
    let result = scheduler
        .run_until(tokio::time::sleep(std::time::Duration::from_millis(200)))
        .await;

    assert!(result.is_err());
    assert_eq!(scheduler.state(), BatchState::Aborted);
    assert_eq!(fs::read_to_string(&worklist_path).unwrap(), "/a/one\n/a/two\n");
}
