//! PointVault service binary
//!
//! `serve` runs the HTTP API together with the periodic stale game scanner.
//! `cleanup` runs one scanner batch against the configured store and exits.

use clap::{Parser, Subcommand};
use pointvault::{
    api::{ApiServer, AppState},
    cleanup::{CleanupScheduler, ScannerConfig, StaleGameScanner, TracingNotifier},
    clock::{Clock, SystemClock},
    config::{ConfigLoader, RewardsConfig, StorageBackend},
    errors::RewardsResult,
    games::GameService,
    metrics::MetricsRegistry,
    storage::OptimizedStorage,
    store::{seed_game_settings, MemoryStore, PointsStore, RocksStore},
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::watch;
use tracing::{info, warn};

type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "pointvault")]
#[command(about = "Points ledger, casino mini-games and stale game cleanup")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the cleanup scheduler
    Serve {
        /// Override the listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not start the periodic cleanup job
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Settle stale games once and print the report
    Cleanup {
        /// Override the staleness threshold in seconds
        #[arg(long)]
        stale_after_secs: Option<u64>,
    },

    /// Print a configuration file with every default filled in
    SampleConfig {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit the testing preset (in-memory store, fast cleanup loop)
        #[arg(long)]
        testing: bool,
    },
}

#[tokio::main]
async fn main() -> BoxResult<()> {
    let cli = Cli::parse();

    if let Commands::SampleConfig { output, testing } = &cli.command {
        return sample_config(output.as_ref(), *testing);
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;
    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port, no_cleanup } => serve(config, port, no_cleanup).await,
        Commands::Cleanup { stale_after_secs } => cleanup_once(config, stale_after_secs).await,
        Commands::SampleConfig { .. } => Ok(()),
    }
}

fn init_tracing(config: &RewardsConfig, verbose: bool) {
    let fallback = if verbose {
        "pointvault=debug,tower_http=debug".to_string()
    } else {
        config.monitoring.log_filter.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

fn open_store(config: &RewardsConfig, clock: Arc<dyn Clock>) -> RewardsResult<Arc<dyn PointsStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("using in-memory store, balances are lost on exit");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
        StorageBackend::Rocks => {
            let dir = &config.storage.data_directory;
            if config.storage.clear_on_start {
                warn!(path = %dir, "clearing database on start");
                match std::fs::remove_dir_all(dir) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            let storage = OptimizedStorage::new_with_config(dir, config.storage.write_buffer_size_mb)?;
            info!(path = %dir, "opened RocksDB store");
            Ok(Arc::new(RocksStore::with_clock(storage, clock)))
        }
    }
}

fn build_scanner(
    config: &RewardsConfig,
    store: Arc<dyn PointsStore>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsRegistry>>,
) -> StaleGameScanner {
    let scanner = StaleGameScanner::new(
        store,
        clock,
        Arc::new(TracingNotifier),
        ScannerConfig::from(&config.cleanup),
    );
    match metrics {
        Some(metrics) => scanner.with_metrics(metrics),
        None => scanner,
    }
}

async fn serve(mut config: RewardsConfig, port: Option<u16>, no_cleanup: bool) -> BoxResult<()> {
    if let Some(port) = port {
        config.api.port = port;
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config, clock.clone())?;

    let seeded = seed_game_settings(store.as_ref(), &config.games).await?;
    if !seeded.is_empty() {
        info!(kinds = ?seeded, "seeded game settings from configuration");
    }

    let metrics = if config.monitoring.enable_metrics {
        Some(Arc::new(MetricsRegistry::new()?))
    } else {
        None
    };

    let mut service = GameService::new(store.clone(), clock.clone());
    if let Some(metrics) = &metrics {
        service = service.with_metrics(metrics.clone());
    }
    let scanner = Arc::new(build_scanner(&config, store.clone(), clock, metrics.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.cleanup.enabled && !no_cleanup {
        Some(CleanupScheduler::new(scanner.clone(), config.cleanup_interval()).spawn(shutdown_rx))
    } else {
        info!("cleanup scheduler disabled");
        None
    };

    let operator_key = std::env::var(pointvault::api::middleware::OPERATOR_KEY_ENV)
        .ok()
        .filter(|key| !key.is_empty());
    if operator_key.is_none() {
        warn!("CLEANUP_API_KEY is not set, operator endpoints are unauthenticated");
    }

    let result = if config.api.enabled {
        let state = Arc::new(AppState {
            service: Arc::new(service),
            store,
            scanner,
            metrics,
            operator_key,
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        ApiServer::new(config.api.clone(), state).run().await
    } else {
        info!("API disabled, running cleanup only");
        pointvault::api::shutdown_signal().await;
        Ok(())
    };

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!(error = %e, "cleanup scheduler task ended abnormally");
        }
    }
    result
}

async fn cleanup_once(mut config: RewardsConfig, stale_after_secs: Option<u64>) -> BoxResult<()> {
    if let Some(secs) = stale_after_secs {
        config.cleanup.stale_after_secs = secs;
        config.validate()?;
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(&config, clock.clone())?;
    let scanner = build_scanner(&config, store, clock, None);

    let report = scanner.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn sample_config(output: Option<&PathBuf>, testing: bool) -> BoxResult<()> {
    let config = if testing {
        RewardsConfig::testing()
    } else {
        RewardsConfig::production()
    };
    match output {
        Some(path) => {
            ConfigLoader::new().save(&config, &path.to_string_lossy())?;
            println!("wrote {}", path.display());
        }
        None => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}
