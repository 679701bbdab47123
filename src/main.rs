use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedtide::config::Config;
use feedtide::crawler::{FeedCrawler, FetchGate};
use feedtide::scheduler::{
    self, spawn_catalog_loops, spawn_sweeps, BatchSweep, PollPipeline, SweepLock, SweepReport,
};
use feedtide::storage::{discover_catalogs, Catalog};

#[derive(Parser)]
#[command(
    name = "feedtide",
    version,
    about = "Adaptive feed poller with per-catalog scheduling",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML config file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one earliest-due loop per catalog until interrupted
    Serve {
        /// Also sweep this catalog once, sharing the loops' fetch gate (repeatable)
        #[arg(long = "sweep", value_name = "CATALOG")]
        sweeps: Vec<PathBuf>,
    },

    /// Poll every source of one catalog once, in priority order
    ///
    /// Runs in its own process with its own fetch gate, so it must not run
    /// while `serve` is polling the same feeds. Use `serve --sweep` instead.
    Sweep {
        /// Catalog file
        catalog: PathBuf,
    },

    /// Create a catalog with the full schema
    Init {
        /// Catalog file
        catalog: PathBuf,
    },

    /// Register a source in a catalog
    Add {
        /// Catalog file
        catalog: PathBuf,

        /// External feed id (e.g. a channel id)
        #[arg(long)]
        feed_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Canonical source url
        #[arg(long)]
        url: String,
    },

    /// Show the tracking state of every source in a catalog
    Status {
        /// Catalog file
        catalog: PathBuf,

        /// Print JSON instead of a table
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Predict the next check for a publish history
    Predict {
        /// Publish timestamps (RFC 3339 or RFC 2822)
        #[arg(required = true)]
        timestamps: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Serve { sweeps } => serve(&config, sweeps).await?,
        Commands::Sweep { catalog } => {
            tracing::info!(catalog = %catalog.display(), "Starting sweep command");
            sweep(&config, &catalog).await?;
        }
        Commands::Init { catalog } => init(&config, &catalog)?,
        Commands::Add {
            catalog,
            feed_id,
            name,
            url,
        } => add(&config, &catalog, &feed_id, &name, &url)?,
        Commands::Status { catalog, json } => status(&config, &catalog, json)?,
        Commands::Predict { timestamps } => predict(&timestamps)?,
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("feedtide=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("feedtide={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn pipeline(config: &Config) -> Result<PollPipeline> {
    let gate = FetchGate::new(config.politeness_delay());
    let crawler = FeedCrawler::new(&config.poller, gate).context("Failed to create HTTP client")?;
    Ok(PollPipeline::new(Arc::new(crawler)))
}

async fn serve(config: &Config, sweep_paths: Vec<PathBuf>) -> Result<()> {
    let catalog_dir = &config.storage.catalog_dir;
    let paths = discover_catalogs(catalog_dir)
        .with_context(|| format!("Failed to scan catalog directory: {}", catalog_dir.display()))?;

    tracing::info!(
        catalog_dir = %catalog_dir.display(),
        catalogs = paths.len(),
        sweeps = sweep_paths.len(),
        "feedtide starting"
    );
    if paths.is_empty() {
        tracing::warn!("No catalogs found, nothing to schedule");
    }

    let pipeline = pipeline(config)?;
    let mut loops =
        spawn_catalog_loops(paths, &pipeline, &config.scheduler, config.busy_timeout());
    let runner = BatchSweep::new(
        pipeline,
        SweepLock::new(),
        config.sweep_gap(),
        config.busy_timeout(),
    );
    let mut sweeps = spawn_sweeps(sweep_paths, &runner);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Shutdown requested");
                break;
            }
            joined = loops.join_next(), if !loops.is_empty() => match joined {
                Some(Ok((path, Err(e)))) => {
                    tracing::error!(catalog = %path.display(), error = %e, "Catalog loop stopped");
                }
                Some(Ok((path, Ok(())))) => {
                    tracing::info!(catalog = %path.display(), "Catalog loop finished");
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Catalog loop task failed");
                }
                None => {}
            },
            finished = sweeps.join_next(), if !sweeps.is_empty() => match finished {
                Some(Ok((path, Ok(report)))) => print_sweep_report(&path, &report),
                Some(Ok((path, Err(e)))) => {
                    tracing::error!(catalog = %path.display(), error = %e, "Sweep aborted");
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Sweep task failed");
                }
                None => {}
            },
        }
    }

    sweeps.shutdown().await;
    loops.shutdown().await;
    tracing::info!("feedtide stopped");
    Ok(())
}

async fn sweep(config: &Config, catalog: &Path) -> Result<()> {
    let runner = BatchSweep::new(
        pipeline(config)?,
        SweepLock::new(),
        config.sweep_gap(),
        config.busy_timeout(),
    );
    let report = runner.run(catalog).await?;
    print_sweep_report(catalog, &report);
    Ok(())
}

fn print_sweep_report(catalog: &Path, report: &SweepReport) {
    println!("Sweep of {}", catalog.display());
    println!("  Sources:    {}", report.total);
    println!("  Discovered: {}", report.discovered);
    println!("  No new:     {}", report.no_new);
    println!("  Failed:     {}", report.failed);
    println!("  New items:  {}", report.items_inserted);
}

fn init(config: &Config, catalog: &Path) -> Result<()> {
    Catalog::create(catalog, config.busy_timeout())?;
    println!("Initialized catalog {}", catalog.display());
    Ok(())
}

fn add(config: &Config, catalog: &Path, feed_id: &str, name: &str, url: &str) -> Result<()> {
    let store = Catalog::open(catalog, config.busy_timeout())?;
    let source_id = store.register_source(feed_id, name, url)?;
    println!("Registered {feed_id} as source {source_id} in {}", catalog.display());
    Ok(())
}

fn status(config: &Config, catalog: &Path, json: bool) -> Result<()> {
    let store = Catalog::open(catalog, config.busy_timeout())?;
    let overview = store.tracking_overview()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!(
        "{:<26} {:<10} {:>7} {:<17} {}",
        "FEED ID", "RANK", "COUNTER", "NEXT CHECK", "NAME"
    );
    for row in &overview {
        println!(
            "{:<26} {:<10} {:>7} {:<17} {}",
            row.tracking.feed_id,
            row.tracking.rank.as_str(),
            row.tracking.no_new_counter,
            row.tracking.next_due_display.as_deref().unwrap_or("-"),
            row.source.name,
        );
    }
    println!("{} source(s), {} item(s) discovered", overview.len(), store.discovered_items()?.len());
    Ok(())
}

fn predict(timestamps: &[String]) -> Result<()> {
    let next = scheduler::predict(timestamps, Utc::now())?;
    println!("{}  rank={}  ts={}", next.display, next.rank, next.at.timestamp());
    Ok(())
}
