//! Tally daemon
//!
//! Loads the configuration, starts the dispatch worker and drives the
//! scheduling cycle until shutdown.
//!
//! # Configuration
//!
//! Environment variables override the config file:
//! - `TALLY_STORE_PATH`: path of the log database
//! - `TALLY_STORE_DIALECT`: `rich` or `reduced`
//! - `TALLY_LOG_LEVEL`: log level (default: info)
//! - `TALLY_LOG_FORMAT`: `pretty` or `json`

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tally::config::{generate_default_config, Config};
use tally::engine::Engine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tallyd", version, about = "Metrics-derivation engine daemon")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a commented default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config);
    tracing::info!("Starting tallyd v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Store: {}", config.store.path);

    let (engine, worker) = Engine::new(&config);
    let worker_handle = tokio::spawn(engine.clone().run(worker));

    match engine.store_version() {
        Ok(version) => tracing::info!("Store version: {}", version),
        Err(e) => tracing::warn!("Store not reachable yet: {}", e),
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(
        config.engine.cycle_interval_secs.max(1),
    ));
    loop {
        tokio::select! {
            _ = ticker.tick() => engine.run_cycle(),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    engine.suspend(true);
    worker_handle.abort();
    tracing::info!("tallyd stopped");
    Ok(())
}

/// Initialize tracing from the logging section.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={}", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
