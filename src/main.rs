mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cli::{Cli, Commands};
use snfs_defrag::json_output::{JsonOutput, JsonPretty};
use snfs_defrag::parser::{CandidateRecord, ExtentListing, OutputMode, Response};
use snfs_defrag::{
    logging, BatchScheduler, Config, DefragDispatcher, DefragOptions, Invoker, Worklist,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            return report_failure(&e, json);
        }
    };
    logging::init(&config.logging.level);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_failure(&e, json),
    }
}

fn report_failure(e: &anyhow::Error, json: bool) -> ExitCode {
    log::error!("{:?}", e);
    if json {
        println!("{}", JsonOutput::error(&format!("{:#}", e), 1));
    }
    ExitCode::FAILURE
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(executable) = &cli.executable {
        config.tool.executable = executable.clone();
    }
    if let Some(worklist) = &cli.worklist {
        config.worklist.path = worklist.clone();
    }

    config.check().context("Configuration validation failed")?;
    Ok(config)
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let invoker = Invoker::from_config(&config.tool);
    let json = cli.json;

    match cli.command {
        Commands::ListCandidates { paths, recursive, verbose, min_extents, raw } => {
            let options = DefragOptions::new()
                .recursive(recursive)
                .verbose(verbose)
                .min_extents(min_extents);
            cmd_list_candidates(&invoker, &paths, &options, raw, json).await
        }
        Commands::ListExtents { paths, recursive, raw } => {
            let options = DefragOptions::new().recursive(recursive);
            cmd_list_extents(&invoker, &paths, &options, raw, json).await
        }
        Commands::CountExtents { paths, recursive } => {
            cmd_count_extents(&invoker, &paths, recursive, json).await
        }
        Commands::Defrag { path, stripe_group, affinity_key, verbose } => {
            let options = DefragOptions::new()
                .stripe_group(stripe_group)
                .target_key(affinity_key)
                .verbose(verbose);
            cmd_defrag(&invoker, &path, &options, json).await
        }
        Commands::Prune { path } => cmd_prune(&invoker, &path, json).await,
        Commands::Enqueue { paths, recursive, min_extents } => {
            let options = DefragOptions::new().recursive(recursive).min_extents(min_extents);
            cmd_enqueue(&invoker, &config, &paths, &options, json).await
        }
        Commands::Batch => cmd_batch(invoker, &config, json).await,
        Commands::ShowConfig => {
            println!("{}", config.to_json());
            Ok(())
        }
    }
}

async fn cmd_list_candidates(
    invoker: &Invoker,
    paths: &[PathBuf],
    options: &DefragOptions,
    raw: bool,
    json: bool,
) -> Result<()> {
    let mode = if raw { OutputMode::Raw } else { OutputMode::Structured };
    let response = invoker
        .list_candidates(paths, options, mode)
        .await
        .context("Failed to list candidates")?;

    match response {
        Response::Raw(text) => print_raw(&text, json),
        Response::Records(records) if json => println!("{}", JsonPretty::format(&JsonOutput::candidates(&records))?),
        Response::Records(records) => print_candidates(&records),
    }
    Ok(())
}

fn print_candidates(records: &[CandidateRecord]) {
    println!("Candidates ({} total):", records.len());
    for record in records {
        match (&record.extent_count, &record.message) {
            (Some(count), Some(message)) => println!("  {} ({} extents) {}", record.path, count, message),
            _ => println!("  {}", record.path),
        }
    }
}

async fn cmd_list_extents(
    invoker: &Invoker,
    paths: &[PathBuf],
    options: &DefragOptions,
    raw: bool,
    json: bool,
) -> Result<()> {
    let mode = if raw { OutputMode::Raw } else { OutputMode::Structured };
    let response = invoker
        .list_extents(paths, options, mode)
        .await
        .context("Failed to list extents")?;

    match response {
        Response::Raw(text) => print_raw(&text, json),
        Response::Records(listing) if json => println!("{}", JsonPretty::format(&JsonOutput::extents(&listing))?),
        Response::Records(listing) => print_extents(&listing),
    }
    Ok(())
}

fn print_extents(listing: &ExtentListing) {
    println!("Extents ({} files, {} extents):", listing.len(), listing.total_extents());
    for (path, rows) in listing.iter() {
        println!();
        println!("  {}", path);
        for row in rows {
            let fields: Vec<String> = row.fields().map(|(k, v)| format!("{}={}", k, v)).collect();
            println!("    {}", fields.join(" "));
        }
    }
}

async fn cmd_count_extents(invoker: &Invoker, paths: &[PathBuf], recursive: bool, json: bool) -> Result<()> {
    let options = DefragOptions::new().recursive(recursive);
    let counts = invoker
        .count_extents(paths, &options)
        .await
        .context("Failed to count extents")?;

    if json {
        println!("{}", JsonPretty::format(&JsonOutput::extent_counts(&counts))?);
    } else {
        for count in &counts {
            println!("  {:>8}  {}", count.extent_count, count.path);
        }
    }
    Ok(())
}

async fn cmd_defrag(invoker: &Invoker, path: &Path, options: &DefragOptions, json: bool) -> Result<()> {
    log::info!("defragmenting {}", path.display());
    let output = invoker
        .defragment(path, options)
        .await
        .into_output()
        .with_context(|| format!("Failed to defragment {}", path.display()))?;

    if json {
        println!("{}", JsonOutput::success(serde_json::json!({ "path": path, "output": output })));
    } else {
        print!("{}", output);
        println!("✓ Defragmented {}", path.display());
    }
    Ok(())
}

async fn cmd_prune(invoker: &Invoker, path: &Path, json: bool) -> Result<()> {
    let output = invoker
        .prune(path)
        .await
        .into_output()
        .with_context(|| format!("Failed to prune {}", path.display()))?;

    if json {
        println!("{}", JsonOutput::success(serde_json::json!({ "path": path, "output": output })));
    } else {
        print!("{}", output);
        println!("✓ Pruned {}", path.display());
    }
    Ok(())
}

async fn cmd_enqueue(
    invoker: &Invoker,
    config: &Config,
    paths: &[PathBuf],
    options: &DefragOptions,
    json: bool,
) -> Result<()> {
    let records = invoker
        .list_candidates(paths, options, OutputMode::Structured)
        .await
        .context("Failed to list candidates")?
        .records()
        .unwrap_or_default();

    let mut worklist = Worklist::open_or_create(&config.worklist.path)?;
    let before = worklist.len();
    worklist.extend(records.into_iter().map(|r| r.path));
    worklist.persist()?;

    let added = worklist.len() - before;
    log::info!("queued {} candidates, worklist now holds {}", added, worklist.len());
    if json {
        println!(
            "{}",
            JsonOutput::success(serde_json::json!({
                "added": added,
                "worklist": worklist.path(),
                "pending": worklist.len()
            }))
        );
    } else {
        println!("✓ Queued {} files ({} pending in {})", added, worklist.len(), worklist.path().display());
    }
    Ok(())
}

async fn cmd_batch(invoker: Invoker, config: &Config, json: bool) -> Result<()> {
    let worklist = Worklist::load(&config.worklist.path).context("Failed to load worklist")?;
    let dispatcher = DefragDispatcher::new(invoker, DefragOptions::default());
    let mut scheduler = BatchScheduler::new(worklist, dispatcher, config);

    let report = scheduler.run_until(interrupted()).await?;

    if json {
        println!("{}", JsonPretty::format(&JsonOutput::batch(&report))?);
    } else {
        println!("Batch {} finished:", report.run_id);
        println!("  Passes:          {}", report.passes);
        println!("  Dispatched:      {}", report.dispatched);
        println!("  Defragmented:    {}", report.succeeded);
        println!("  Failed attempts: {}", report.failed_attempts);
        if !report.dropped.is_empty() {
            println!("  Dropped:         {}", report.dropped.len());
            for path in &report.dropped {
                println!("    - {}", path);
            }
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_raw(text: &str, json: bool) {
    if json {
        println!("{}", JsonOutput::raw(text));
    } else {
        print!("{}", text);
    }
}
