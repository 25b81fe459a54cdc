//! anekdot CLI
//!
//! Runs the sampling cache against the configured message backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anekdot::{
    error::{AppError, Result},
    models::{Config, ExtentMode},
    pipeline::{self, SourceRun},
    services::CacheService,
};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

/// Minimum period between throttle sweeps.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// anekdot - random posts from channel history
#[derive(Parser, Debug)]
#[command(
    name = "anekdot",
    version,
    about = "Background sampling cache for channel posts"
)]

struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl all sources forever, until Ctrl-C
    Run,

    /// Crawl every source once and print a few items
    Once {
        /// Number of distinct items to print
        #[arg(long, default_value_t = 5)]
        sample: usize,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }
    let config = Arc::new(config);

    match cli.command {
        Command::Validate => {
            log::info!("✓ Config OK ({} sources)", config.sources.len());
        }

        Command::Once { sample } => {
            if config.sources.is_empty() {
                return Err(AppError::config("No sources configured"));
            }
            let service = CacheService::from_config(Arc::clone(&config)).await?;
            let report = service.scheduler().run_once().await;

            for source in &report.sources {
                match &source.run {
                    SourceRun::Crawled(outcome) => log::info!(
                        "{}: {} fetched, {} accepted",
                        source.source,
                        outcome.fetched,
                        outcome.accepted
                    ),
                    SourceRun::Skipped => log::info!("{}: skipped", source.source),
                    SourceRun::Excluded(reason) | SourceRun::Failed(reason) => {
                        log::warn!("{}: {}", source.source, reason)
                    }
                }
            }
            log::info!(
                "Pool holds {} items ({} ms)",
                report.pool_size,
                (report.finished_at - report.started_at).num_milliseconds()
            );

            for item in service.pool().sample_distinct(sample) {
                println!("{item}\n");
            }
        }

        Command::Run => {
            if config.sources.is_empty() {
                return Err(AppError::config("No sources configured"));
            }
            let service = CacheService::from_config(Arc::clone(&config)).await?;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let tracker = match config.extent_mode {
                ExtentMode::Tracked => service.spawn_extent_tracker(),
                ExtentMode::Refresh => None,
            };
            let sweeper = pipeline::spawn_throttle_sweeper(
                Arc::clone(service.throttle()),
                config.throttle_window().max(SWEEP_PERIOD),
                shutdown_rx.clone(),
            );

            let scheduler = service.scheduler();
            let crawl = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

            tokio::signal::ctrl_c().await?;
            log::info!("Shutting down...");
            // Receivers may already be gone if the loop ended on its own.
            let _ = shutdown_tx.send(true);

            match crawl.await {
                Ok(cycles) => log::info!("Completed {} crawl cycles", cycles),
                Err(e) => log::error!("Crawl loop panicked: {}", e),
            }
            if let Err(e) = sweeper.await {
                log::error!("Throttle sweeper panicked: {}", e);
            }
            if let Some(tracker) = tracker {
                tracker.abort();
            }
            log::info!("Final pool size: {}", service.pool().len());
        }
    }

    log::info!("Done!");

    Ok(())
}
