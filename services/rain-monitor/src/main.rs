//! Nowcast rain monitor service.
//!
//! Polls the nowcast tile feed for each configured location with:
//! - A fixed-time preview across aggregation methods
//! - Threshold alerts through the configured notifier
//! - Daily heartbeat messages
//! - Pruning of debug snapshots

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use rain_monitor::{LogNotifier, Monitor, MonitorConfig};

/// Wait before retrying when monitoring is disabled or the config is broken.
const IDLE_POLL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "rain-monitor")]
#[command(about = "Nowcast point rainfall monitor with threshold alerts")]
struct Args {
    /// Configuration file (JSON or YAML)
    #[arg(long, env = "RAIN_MONITOR_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Compare aggregation methods at every location and exit
    #[arg(long)]
    experiment: bool,

    /// Force debug snapshots and method comparison on
    #[arg(long)]
    debug: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn load_config(&self) -> Result<MonitorConfig> {
        let mut config = MonitorConfig::load(&self.config)?;
        if self.debug || self.experiment {
            config.debug = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);
    if args.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!(config = %args.config.display(), "Starting rain monitor");

    let mut monitor = Monitor::new(Arc::new(LogNotifier));

    if args.experiment {
        let config = args.load_config()?;
        let reports = monitor.run_experiment(&config).await;
        let failed = reports.iter().filter(|(_, r)| r.is_err()).count();
        info!(locations = reports.len(), failed, "Experiment finished");
        return Ok(());
    }

    if args.once {
        let config = args.load_config()?;
        let report = monitor.run_cycle(&config).await;
        info!(
            locations = report.locations.len(),
            failed = report.failures(),
            "Single cycle finished"
        );
        return Ok(());
    }

    // Shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    run_forever(&args, &mut monitor, shutdown_tx.subscribe()).await;
    info!("Rain monitor stopped");
    Ok(())
}

/// Re-read the config and run a cycle until shutdown.
async fn run_forever(args: &Args, monitor: &mut Monitor, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let wait = match args.load_config() {
            Ok(config) if config.monitoring.enabled => {
                monitor.run_cycle(&config).await;
                config.monitoring.interval()
            }
            Ok(_) => {
                info!("Monitoring disabled, waiting");
                IDLE_POLL
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to load config");
                IDLE_POLL
            }
        };

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutting down monitor");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
