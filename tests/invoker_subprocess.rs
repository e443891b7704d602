#![cfg(unix)]

mod common;

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::fake_snfsdefrag;
use snfs_defrag::{DefragError, DefragOptions, Invoker, OutputMode, Response};

#[tokio::test]
async fn test_arguments_reach_the_tool_literally() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), r#"for a in "$@"; do printf '%s\n' "$a"; done"#);
    let invoker = Invoker::new(exe);

    let tricky = "/stornext/with space/$(touch pwned);'x'";
    let options = DefragOptions::new().stripe_group(Some("sg 1".to_string()));
    let result = invoker.run(&options.to_args(&[tricky])).await;

    assert!(result.success());
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, format!("-G\nsg 1\n{}\n", tricky));
    assert!(!dir.path().join("pwned").exists());
}

#[tokio::test]
async fn test_nonzero_exit_is_reported_failure() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), "echo 'file is open' >&2\nexit 3");
    let invoker = Invoker::new(exe);

    let result = invoker.run(&[OsString::from("/a/file.mov")]).await;

    assert!(!result.success());
    assert_eq!(result.exit_code, Some(3));
    match result.error {
        Some(DefragError::SubprocessReported { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "file is open");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_hung_tool_is_killed_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), "sleep 10");
    let invoker = Invoker::new(exe).with_timeout(Some(Duration::from_millis(200)));

    let started = Instant::now();
    let result = invoker.run(&[]).await;

    assert!(matches!(result.error, Some(DefragError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_list_candidates_verbose() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(
        dir.path(),
        r#"[ "$1" = "-l" ] && [ "$2" = "-v" ] || exit 9
printf '/a/file.mov: 3 extents: fragmented\nscanned 1 file\n'"#,
    );
    let invoker = Invoker::new(exe);

    let options = DefragOptions::new().verbose(true);
    let records = invoker
        .list_candidates(&[PathBuf::from("/a")], &options, OutputMode::Structured)
        .await
        .unwrap()
        .records()
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, "/a/file.mov");
    assert_eq!(records[0].extent_count, Some(3));
    assert_eq!(records[0].message.as_deref(), Some("fragmented"));
}

#[tokio::test]
async fn test_list_candidates_raw_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), "printf 'anything at all\\n'");
    let invoker = Invoker::new(exe);

    let response = invoker
        .list_candidates(&[PathBuf::from("/a")], &DefragOptions::new(), OutputMode::Raw)
        .await
        .unwrap();

    assert_eq!(response, Response::Raw("anything at all\n".to_string()));
}

#[tokio::test]
async fn test_error_response_surfaces_raw_text() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), "echo 'Error: permission denied'\nexit 1");
    let invoker = Invoker::new(exe);

    let err = invoker
        .list_candidates(&[PathBuf::from("/a")], &DefragOptions::new(), OutputMode::Structured)
        .await
        .unwrap_err();

    match err {
        DefragError::ToolReported(text) => assert_eq!(text, "Error: permission denied"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_list_extents_structured() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(
        dir.path(),
        r#"[ "$1" = "-e" ] || exit 9
cat <<'OUT'

/a/file.mov:
#   group  frbase  fsbase  fsend  kbytes  depth
0   5      0x0     0x371   0x372  28      2
1   5      0x372   0x900   0x9ff  112     2

OUT"#,
    );
    let invoker = Invoker::new(exe);

    let listing = invoker
        .list_extents(&[PathBuf::from("/a/file.mov")], &DefragOptions::new(), OutputMode::Structured)
        .await
        .unwrap()
        .records()
        .unwrap();

    let rows = listing.get("/a/file.mov").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("fsbase"), Some("0x371"));
    assert_eq!(rows[1].get("kbytes"), Some("112"));
}

#[tokio::test]
async fn test_count_extents() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(
        dir.path(),
        r#"[ "$1" = "-c" ] && [ "$2" = "-r" ] || exit 9
printf '/a/one: 1 extent\n/a/two: 40 extents\n'"#,
    );
    let invoker = Invoker::new(exe);

    let counts = invoker
        .count_extents(&[PathBuf::from("/a")], &DefragOptions::new().recursive(true))
        .await
        .unwrap();

    assert_eq!(counts.len(), 2);
    assert_eq!(counts[1].extent_count, 40);
}

#[tokio::test]
async fn test_prune_passes_flag() {
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_snfsdefrag(dir.path(), r#"[ "$1" = "-p" ] && [ "$2" = "/a/f" ]"#);
    let invoker = Invoker::new(exe);

    assert!(invoker.prune(std::path::Path::new("/a/f")).await.success());
}
