mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use dupe_watch_core::config::{self, AppConfig};
use dupe_watch_core::{scanner, DedupProcessor, IngestService, LoggingSink, Verdict};
use progress::{CliReporter, ConsoleSink};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let loaded = match &args.config {
        Some(name) => config::load_configuration_from(name),
        None => config::load_configuration(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    match args.command {
        Some(Commands::Watch { seed }) => {
            if let Err(err) = run_watch(&config, &seed) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::Scan { dirs }) => {
            if let Err(err) = run_scan(&config, &dirs) {
                error!("Error: {:#}", err);
                process::exit(1);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_watch(config: &AppConfig, seed_dirs: &[PathBuf]) -> anyhow::Result<()> {
    if config.watcher.watch_directories.is_empty() {
        bail!("No watch directories configured (watcher.watch_directories)");
    }

    let processor = Arc::new(DedupProcessor::new(&config.dedup, Arc::new(ConsoleSink)));
    if !seed_dirs.is_empty() {
        info!("Seeding index from {:?}", seed_dirs);
        let seeded = scanner::seed(&processor, seed_dirs, &config.watcher.ignore_patterns);
        println!("  {} existing files indexed", format!("{}", seeded).cyan());
    }

    let mut service = IngestService::start_with(config, processor, Arc::new(CliReporter::new()))
        .context("starting watcher")?;
    println!(
        "Watching {} with policy {}. Press Enter to stop.",
        format!("{:?}", config.watcher.watch_directories).cyan(),
        format!("{}", config.dedup.duplicate_action).yellow()
    );

    wait_for_enter()?;
    service.stop();

    let queue = service.queue().stats();
    let engine = service.processor().engine().stats();
    info!(
        "{} completed, {} failed, {} retries, {} abandoned",
        format!("{}", queue.completed).green(),
        format!("{}", queue.failed).red(),
        format!("{}", queue.retried).yellow(),
        queue.pending,
    );
    info!(
        "{} files checked, {} full-hash passes, {} bytes read",
        engine.files_checked, engine.full_hash_passes, engine.bytes_read
    );

    Ok(())
}

fn run_scan(config: &AppConfig, dirs: &[PathBuf]) -> anyhow::Result<()> {
    let processor = DedupProcessor::new(&config.dedup, Arc::new(LoggingSink));
    let reporter = CliReporter::new();
    let roots = config::non_overlapping_directories(dirs.to_vec());

    let report = scanner::scan(
        &processor,
        &roots,
        &config.watcher.ignore_patterns,
        true,
        &reporter,
    );

    println!();
    for outcome in report.duplicates() {
        let label = match outcome.verdict {
            Verdict::LikelyDuplicate { distance, .. } => format!("similar({})", distance).yellow(),
            _ => "duplicate".red(),
        };
        if let Some(of) = outcome.verdict.duplicate_of() {
            println!(
                "  {} {} = {}",
                label,
                outcome.path.display(),
                of.display()
            );
        }
    }
    for (path, err) in &report.failures {
        println!("  {} {}: {}", "failed".red(), path.display(), err);
    }

    info!(
        "{} files, {} unique, {} duplicates, {} bytes wasted in {:.2}s",
        report.outcomes.len(),
        format!("{}", report.unique_count()).green(),
        format!("{}", report.duplicates().count()).red(),
        format!("{}", report.wasted_bytes()).red(),
        report.duration.as_secs_f64(),
    );

    Ok(())
}

/// Block until a line (or EOF) arrives on stdin.
fn wait_for_enter() -> io::Result<()> {
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(())
}
