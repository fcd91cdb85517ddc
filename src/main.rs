//! bedwatch - bedside pressure-injury prevention service
//!
//! Reads the mattress sensor boards, classifies posture, tracks how long each
//! body region has been under load and tells caregivers (and the actuator
//! controller) when a reposition is due.
//!
//! # Usage
//!
//! ```bash
//! # Run against the sensor boards with the config in ./bedwatch.toml
//! cargo run --release
//!
//! # Simulated boards, mock actuator, local store, stop after 30 cycles
//! cargo run --release -- --simulate --test --local --cycles 30
//!
//! # Show the serial ports the host can see
//! cargo run --release -- --list-ports
//! ```
//!
//! # Environment Variables
//!
//! - `BEDWATCH_CONFIG`: Path to the TOML config file
//! - `DEVICE_ID`, `SERIAL_PORT`, `SERIAL_BAUDRATE`, `CYCLE_INTERVAL`: Per-device overrides
//! - `SUPABASE_URL`, `SUPABASE_KEY`: Remote persistence credentials
//! - `CONTROL_NODE_ADDRESS`, `CONTROL_NODE_PORT`: Actuator controller endpoint
//! - `PUSH_WEBHOOK_URL`: Push notification relay
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bedwatch::acquisition::{list_ports, AcquisitionManager, ReaderSettings, SerialPortProvider, SimulatedProvider, SourceProvider};
use bedwatch::config::{BedwatchConfig, PersistenceBackend};
use bedwatch::delivery::{build_notifier, ActuationLink, MockControlLink, Notifier, PersistenceSink, SupabaseClient, TcpControlLink};
use bedwatch::pipeline::{CycleEngine, CycleLoop, LoopSettings};
use bedwatch::posture::build_classifier;
use bedwatch::storage::{LocalStore, ProcessLock};
use bedwatch::types::{DayLog, Thresholds};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "bedwatch")]
#[command(about = "Bedside pressure mapping and pressure-injury prevention")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides BEDWATCH_CONFIG and ./bedwatch.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use simulated sensor boards instead of serial ports
    #[arg(long)]
    simulate: bool,

    /// Use the mock actuator controller
    #[arg(long)]
    test: bool,

    /// Keep day and pressure logs in the local store
    #[arg(long)]
    local: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Stop after N cycles
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    CycleLoop,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::CycleLoop => write!(f, "CycleLoop"),
        }
    }
}

/// Monitor tasks; a failed or panicked task cancels the rest.
async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the cycle loop finish its shutdown after a Ctrl+C
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("Supervisor: task {} stopped", task_name);
        }
    }

    Ok(())
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<BedwatchConfig> {
    let mut config = match &args.config {
        Some(path) => BedwatchConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BedwatchConfig::load(),
    };
    config.apply_env_overrides();
    if args.local {
        config.persistence.backend = PersistenceBackend::Local;
    }
    if args.test {
        config.actuation.enabled = true;
        config.actuation.mock = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_acquisition(config: &BedwatchConfig, simulate: bool) -> Result<AcquisitionManager> {
    let provider: Arc<dyn SourceProvider> = if simulate {
        Arc::new(SimulatedProvider::default())
    } else {
        Arc::new(SerialPortProvider::from_config(&config.acquisition))
    };
    let mut manager = AcquisitionManager::new(provider, ReaderSettings::from_config(&config.acquisition))
        .context("Failed to build acquisition manager")?;
    match manager.connect() {
        Ok(sources) => info!(sources, "Acquisition started"),
        Err(e) => warn!(error = %e, "No sensor boards yet, the cycle loop will keep retrying"),
    }
    Ok(manager)
}

/// The persistence sink, plus the store lock when running locally
fn build_persistence(config: &BedwatchConfig) -> Result<(Arc<dyn PersistenceSink>, Option<ProcessLock>)> {
    let default_minutes = config.decision.default_threshold_minutes;
    match config.persistence.backend {
        PersistenceBackend::Local => {
            let path = &config.persistence.local_path;
            let lock = ProcessLock::acquire(path)?;
            let store = LocalStore::open(path, default_minutes)
                .with_context(|| format!("Failed to open local store at {}", path.display()))?;
            let sink: Arc<dyn PersistenceSink> = Arc::new(store);
            Ok((sink, Some(lock)))
        }
        PersistenceBackend::Supabase => {
            let client = SupabaseClient::new(&config.persistence, default_minutes)
                .context("Failed to configure remote persistence")?;
            let sink: Arc<dyn PersistenceSink> = Arc::new(client);
            Ok((sink, None))
        }
    }
}

fn build_actuation(config: &BedwatchConfig) -> Option<Box<dyn ActuationLink>> {
    if !config.actuation.enabled {
        return None;
    }
    if config.actuation.mock {
        info!("Using mock actuator controller");
        return Some(Box::new(MockControlLink::new()));
    }
    Some(Box::new(TcpControlLink::from_config(&config.actuation)))
}

/// Load today's day log so a restart continues the running totals
async fn restore_day_log(engine: &mut CycleEngine, persistence: &dyn PersistenceSink, device_id: i64) {
    let today = Local::now().date_naive();
    match persistence.fetch_day_log(device_id, today).await {
        Ok(Some(log)) => {
            info!(day = %log.day, id = ?log.id, "Restored today's day log");
            engine.tracker_mut().restore(log);
        }
        Ok(None) => match persistence.create_day_log(&DayLog::empty(device_id, today)).await {
            Ok(created) => {
                info!(day = %created.day, id = ?created.id, "Created today's day log");
                engine.tracker_mut().restore(created);
            }
            Err(e) => warn!(error = %e, "Day log creation failed, retrying on the first cycle"),
        },
        Err(e) => warn!(error = %e, "Day log lookup failed, starting from zero"),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if args.list_ports {
        for port in list_ports()? {
            match port.description {
                Some(description) => println!("{}\t{}\t{}", port.name, port.kind, description),
                None => println!("{}\t{}", port.name, port.kind),
            }
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    let device_id = config.device.id;
    info!(device_id, name = %config.device.name, "Starting bedwatch");

    let (persistence, _store_lock) = build_persistence(&config)?;
    let notifier: Arc<dyn Notifier> = Arc::from(
        build_notifier(&config.notification, Duration::from_secs(config.persistence.http_timeout_secs))
            .context("Failed to configure notifications")?,
    );

    let thresholds = match persistence.fetch_thresholds(device_id).await {
        Ok(thresholds) => thresholds,
        Err(e) => {
            warn!(error = %e, "Threshold lookup failed, using defaults");
            Thresholds::uniform(config.decision.default_threshold_minutes)
        }
    };

    let mut engine = CycleEngine::from_config(&config, build_classifier(&config.classifier));
    restore_day_log(&mut engine, persistence.as_ref(), device_id).await;

    let acquisition = tokio::task::spawn_blocking({
        let config = config.clone();
        let simulate = args.simulate;
        move || build_acquisition(&config, simulate)
    })
    .await
    .context("Acquisition startup task failed")??;

    let cancel_token = CancellationToken::new();
    let mut settings = LoopSettings::from_config(&config);
    settings.max_cycles = args.cycles;

    let mut cycle_loop = CycleLoop::new(
        engine,
        acquisition,
        persistence,
        notifier,
        thresholds,
        device_id,
        settings,
        cancel_token.clone(),
    );
    if let Some(link) = build_actuation(&config) {
        cycle_loop = cycle_loop.with_actuation(link);
    }

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    task_set.spawn(async move {
        let stats = cycle_loop.run().await;
        info!(
            cycles = stats.cycles,
            reposition_cycles = stats.reposition_cycles,
            alerts = stats.alerts_sent,
            "Cycle loop finished"
        );
        Ok(TaskName::CycleLoop)
    });

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, shutting down");
        shutdown_token.cancel();
    });

    run_supervisor(&mut task_set, cancel_token).await?;
    info!("bedwatch stopped");
    Ok(())
}
