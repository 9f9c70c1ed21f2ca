use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appcache_updater::config::Config;
use appcache_updater::events::{Topic, UpdateEvent};
use appcache_updater::refresh::HttpRefreshBackend;
use appcache_updater::registry::UpdateRegistry;
use appcache_updater::storage::SqliteEntryStore;
use appcache_updater::utils::format_millis;

#[derive(Parser)]
#[command(
    name = "appcache-updater",
    version,
    about = "Keeps offline application caches fresh by refreshing stale entries",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML). Environment variables are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable periodic updates and run until Ctrl-C
    Run {
        /// Staleness frequency in seconds
        #[arg(short, long)]
        frequency: Option<u64>,

        /// Seconds between reconciliation cycles
        #[arg(long)]
        scan_interval: Option<u64>,

        /// Run a cycle immediately instead of waiting one interval
        #[arg(long, default_value = "false")]
        scan_on_enable: bool,
    },

    /// Track a new cache entry
    Add {
        /// Identifier of the cached resource (e.g. manifest URL)
        resource_id: String,

        /// Location to refresh from; defaults to the resource identifier
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Stop tracking a cache entry
    Remove {
        /// Identifier of the cached resource
        resource_id: String,
    },

    /// List tracked entries
    List {
        /// Print entries as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a single reconciliation cycle and exit
    Cycle {
        /// Staleness frequency in seconds
        #[arg(short, long)]
        frequency: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.storage.sqlite_path = db;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    tracing::info!("appcache-updater starting");

    match cli.command {
        Commands::Run {
            frequency,
            scan_interval,
            scan_on_enable,
        } => {
            if let Some(secs) = frequency {
                config.scheduler.frequency_secs = secs;
            }
            if let Some(secs) = scan_interval {
                config.scheduler.scan_interval_secs = secs;
            }
            config.scheduler.scan_on_enable |= scan_on_enable;
            config.validate()?;

            tracing::info!(
                frequency_secs = config.scheduler.frequency_secs,
                scan_interval_secs = config.scheduler.scan_interval_secs,
                "Starting run command"
            );
            run(&config).await?;
        }

        Commands::Add {
            resource_id,
            source,
        } => {
            let source = source.unwrap_or_else(|| resource_id.clone());
            tracing::info!(resource_id = %resource_id, source = %source, "Starting add command");
            add(&config, resource_id, source).await?;
        }

        Commands::Remove { resource_id } => {
            tracing::info!(resource_id = %resource_id, "Starting remove command");
            remove(&config, &resource_id).await?;
        }

        Commands::List { json } => {
            list(&config, json).await?;
        }

        Commands::Cycle { frequency } => {
            if let Some(secs) = frequency {
                config.scheduler.frequency_secs = secs;
            }
            config.validate()?;
            tracing::info!(
                frequency_secs = config.scheduler.frequency_secs,
                "Starting cycle command"
            );
            cycle(&config).await?;
        }
    }

    tracing::info!("appcache-updater completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("appcache_updater=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| {
                tracing_subscriber::EnvFilter::try_new(format!("appcache_updater={level},warn"))
            })
            .context("Invalid log level")?
    };

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

async fn open_registry(config: &Config) -> Result<UpdateRegistry> {
    let store = Arc::new(SqliteEntryStore::new(&config.storage.sqlite_path));
    let backend = Arc::new(
        HttpRefreshBackend::new(config.http_backend_config())
            .context("Failed to create HTTP refresh backend")?,
    );

    let registry = UpdateRegistry::from_config(config, store, backend)?;
    registry.init().await.with_context(|| {
        format!(
            "Failed to open entry store: {}",
            config.storage.sqlite_path.display()
        )
    })?;

    Ok(registry)
}

async fn run(config: &Config) -> Result<()> {
    let registry = open_registry(config).await?;

    registry.subscribe(Topic::CycleCompleted, |event| {
        if let UpdateEvent::CycleCompleted { report } = event {
            println!(
                "cycle: {} evaluated, {} refreshed, {} failed, {} skipped",
                report.evaluated, report.refreshed, report.failed, report.skipped
            );
        }
    });

    registry.enable().await;
    println!("Updates enabled. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("Stopping, waiting for the running cycle to finish...");
    registry.shutdown().await;
    Ok(())
}

async fn add(config: &Config, resource_id: String, source: String) -> Result<()> {
    let registry = open_registry(config).await?;
    let entry = registry.add_entry(resource_id, source).await?;
    println!("Added {} ({})", entry.resource_id, entry.source_location);
    Ok(())
}

async fn remove(config: &Config, resource_id: &str) -> Result<()> {
    let registry = open_registry(config).await?;
    let entry = registry.remove_entry(resource_id).await?;
    println!("Removed {}", entry.resource_id);
    Ok(())
}

async fn list(config: &Config, json: bool) -> Result<()> {
    let registry = open_registry(config).await?;
    let entries = registry.entries().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No tracked entries");
        return Ok(());
    }

    println!("{:<50} {:<25} SOURCE", "RESOURCE", "LAST UPDATE");
    for entry in entries {
        println!(
            "{:<50} {:<25} {}",
            entry.resource_id,
            format_millis(entry.last_update),
            entry.source_location
        );
    }
    Ok(())
}

async fn cycle(config: &Config) -> Result<()> {
    let registry = open_registry(config).await?;
    let report = registry.run_cycle_now().await?;

    println!("Evaluated: {}", report.evaluated);
    println!("  Refreshed: {}", report.refreshed);
    println!("  Failed:    {}", report.failed);
    println!("  Skipped:   {}", report.skipped);
    if report.discarded > 0 {
        println!("  Discarded: {}", report.discarded);
    }

    // Keep the exit status meaningful for cron-style use
    if report.failed > 0 {
        anyhow::bail!("{} refresh(es) failed", report.failed);
    }
    Ok(())
}
