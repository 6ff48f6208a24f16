//! Visor daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   visor.conf ──▶ ConfigWatcher ──publish──▶ FilterHandle
//!                  (events + reconcile)           │
//!                                                 ▼ read per tip-set
//!   Lotus node ──▶ HeadWatcher ──▶ TipSetCache ──▶ TipSetIndexer ──▶ Storage
//!                  (supervised by Scheduler, restarted on failure/completion)
//!
//!   Ctrl+C ──▶ Shutdown ──▶ Scheduler + ConfigWatcher stop
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::{Args, Parser, Subcommand};

use visor::chain::indexer::{NullStorage, Storage, ALL_TASKS};
use visor::chain::lens::LotusClient;
use visor::chain::{HeadWatcher, TipSetIndexer};
use visor::config::{ConfigWatcher, WatcherSettings, DEFAULT_CONFIG_FILE};
use visor::lifecycle::Shutdown;
use visor::observability::{logging, metrics};
use visor::schedule::{Scheduler, TaskConfig};

/// Delay before the head watcher is restarted.
const RESTART_DELAY: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "visor", version)]
#[command(about = "Filecoin chain indexer", long_about = None)]
struct Cli {
    /// Log filter directive, overridden by RUST_LOG
    #[arg(long, global = true, env = "VISOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "VISOR_LOG_JSON")]
    log_json: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "VISOR_METRICS_ADDRESS")]
    metrics_address: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the head of the filecoin blockchain and process blocks as they arrive
    Watch(WatchArgs),
}

#[derive(Args)]
struct WatchArgs {
    /// Tip-sets held for possible reversion before being committed
    #[arg(long, default_value_t = 2, env = "VISOR_INDEXHEAD_CONFIDENCE")]
    indexhead_confidence: usize,

    /// Comma separated list of tasks to run
    #[arg(long, default_value_t = ALL_TASKS.join(","), env = "VISOR_WATCH_TASKS")]
    tasks: String,

    /// Address filter file, reloaded on change
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config_file: PathBuf,

    /// Name reported with indexed data
    #[arg(long, default_value = "visor", env = "VISOR_NAME")]
    name: String,

    /// Lotus JSON-RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:1234/rpc/v0", env = "VISOR_LENS_URL")]
    lens_url: String,

    /// Lotus API token
    #[arg(long, env = "VISOR_LENS_TOKEN")]
    lens_token: Option<String>,

    /// Seconds between chain head polls
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    /// Seconds between starting scheduled tasks
    #[arg(long, default_value_t = 0)]
    task_delay_secs: u64,

    /// Seconds between filter reconciliation reloads
    #[arg(long, default_value_t = 300)]
    reconcile_interval_secs: u64,

    /// First delay (ms) before re-creating a broken config file watch
    #[arg(long, default_value_t = 500)]
    watch_restart_base_ms: u64,

    /// Upper bound (ms) for the config file watch re-creation delay
    #[arg(long, default_value_t = 30_000)]
    watch_restart_max_ms: u64,
}

impl WatchArgs {
    fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs.max(1)),
            restart_base_ms: self.watch_restart_base_ms,
            restart_max_ms: self.watch_restart_max_ms.max(self.watch_restart_base_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level.as_deref(), cli.log_json)?;
    tracing::info!("visor v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr)?;
    }

    match cli.command {
        Commands::Watch(args) => watch(args).await,
    }
}

async fn watch(args: WatchArgs) -> Result<(), Box<dyn Error>> {
    let tasks: Vec<&str> = args.tasks.split(',').collect();

    tracing::warn!("database not specified, data will not be persisted");
    let storage: Arc<dyn Storage> = Arc::new(NullStorage);
    let indexer = Arc::new(TipSetIndexer::new(args.name.clone(), &tasks, storage)?);

    tracing::info!(
        reporter = %args.name,
        tasks = ?indexer.tasks(),
        confidence = args.indexhead_confidence,
        config_file = %args.config_file.display(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();

    let config_watcher = ConfigWatcher::new(&args.config_file, indexer.filter_handle())
        .with_settings(args.watcher_settings());
    let config_task = tokio::spawn(config_watcher.run(shutdown.subscribe()));

    let source = LotusClient::new(
        args.lens_url,
        args.lens_token,
        Duration::from_secs(args.poll_interval_secs),
    );

    let mut scheduler = Scheduler::new(Duration::from_secs(args.task_delay_secs));
    scheduler.add(TaskConfig {
        name: "Watcher".into(),
        task: Arc::new(HeadWatcher::new(indexer, source, args.indexhead_confidence)),
        restart_on_failure: true,
        // The indexer should always be running.
        restart_on_completion: true,
        restart_delay: RESTART_DELAY,
    });

    let run = scheduler.run(shutdown.subscribe());
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
            run.await
        }
    };

    shutdown.trigger();
    if let Err(e) = config_task.await {
        tracing::error!(error = %e, "Config watcher aborted");
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
