//! # scanlink-daemon
//!
//! Headless runner for scanlink: loads the configuration, opens local
//! storage, starts one worker per scanner and a periodic backlog replay,
//! and logs everything the devices report.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ScanlinkConfig::load ──► LocalStore::open (prunes stale backlog)       │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  RemoteSyncEngine (offline when remote disabled or unconfigured)        │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  DeviceManager ──► add_devices ──► connect_all (auto_connect)           │
//! │          │                                                              │
//! │          ├──► event consumer task ──► tracing                           │
//! │          └──► BacklogProcessor (auto_sync)                              │
//! │                                                                         │
//! │  Ctrl-C ──► processor.shutdown ──► manager.shutdown (final sync)        │
//! │         ──► config saved with the current device list                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;

pub use cli::{Cli, Command};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use scanlink_core::DedupDecision;
use scanlink_device::{
    available_ports, DeviceManager, EventReceiver, ManagerEvent, ManagerSettings, SystemPortOpener,
};
use scanlink_store::{LocalStore, StoreConfig};
use scanlink_sync::{
    BacklogProcessor, MemoryRemoteStore, RemoteStore, RemoteSyncEngine, ScanlinkConfig,
};

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages everywhere
/// - `RUST_LOG=scanlink_device=trace` - Trace the device crate only
/// - Default: `info,scanlink=debug,reqwest=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,scanlink=debug,reqwest=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Runs the command selected on the command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or_default() {
        Command::Ports => list_ports(),
        Command::TestConnection => {
            let config = load_config(&cli)?;
            let (_store, engine) = open_engine(&config, cli.dry_run).await?;
            test_connection(&engine).await
        }
        Command::Sync => {
            let config = load_config(&cli)?;
            let (_store, engine) = open_engine(&config, cli.dry_run).await?;
            sync_once(&engine).await
        }
        Command::Stats => {
            let config = load_config(&cli)?;
            let (_store, engine) = open_engine(&config, cli.dry_run).await?;
            print_statistics(&engine).await
        }
        Command::Run { no_connect } => {
            let mut config = load_config(&cli)?;
            if no_connect {
                config.preferences.auto_connect = false;
            }
            serve(config, cli.config.clone(), cli.dry_run, shutdown_signal()).await
        }
    }
}

// =============================================================================
// Setup
// =============================================================================

fn load_config(cli: &Cli) -> anyhow::Result<ScanlinkConfig> {
    let config = ScanlinkConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    info!(
        devices = config.devices.len(),
        data_dir = ?config.storage.data_dir,
        remote = config.remote.is_active(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Opens local storage and builds the sync engine on top of it.
///
/// With `dry_run` the engine talks to an in-memory remote, so scans go
/// through the full upload path without touching the real store.
async fn open_engine(
    config: &ScanlinkConfig,
    dry_run: bool,
) -> anyhow::Result<(LocalStore, Arc<RemoteSyncEngine>)> {
    let store = LocalStore::open(StoreConfig::new(config.storage.data_dir.clone()))
        .await
        .with_context(|| format!("Failed to open data dir {}", config.storage.data_dir.display()))?;

    let engine = if dry_run {
        info!("Dry run: uploads go to an in-memory remote");
        let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemoteStore::new());
        RemoteSyncEngine::new(Some(remote), store.backlog())
    } else {
        RemoteSyncEngine::from_settings(&config.remote, store.backlog())
            .context("Failed to set up the remote store")?
    };

    if !engine.is_online() {
        warn!("Remote store disabled or not configured, recording locally only");
    }

    Ok((store, Arc::new(engine)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(?e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Shutdown signal received");
}

// =============================================================================
// Commands
// =============================================================================

fn list_ports() -> anyhow::Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{:<16} {}", port.name, port.description);
    }
    Ok(())
}

async fn test_connection(engine: &RemoteSyncEngine) -> anyhow::Result<()> {
    engine.test_connection().await.context("Remote store not reachable")?;
    println!("Remote store reachable");
    Ok(())
}

async fn sync_once(engine: &RemoteSyncEngine) -> anyhow::Result<()> {
    let report = engine.sync_backlog().await.context("Backlog replay failed")?;
    println!(
        "Replayed {} backlog entries: {} synced, {} failed",
        report.attempted, report.synced, report.failed
    );
    Ok(())
}

/// Runs the devices until `shutdown` resolves.
///
/// On the way out the backlog processor stops, every device is disconnected,
/// a final backlog replay runs and the manager's device list is written
/// back into the config file. Other settings in the file stay as they were,
/// so environment overrides held in `config` are not persisted.
pub async fn serve<S>(
    config: ScanlinkConfig,
    config_path: Option<PathBuf>,
    dry_run: bool,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()>,
{
    let (store, engine) = open_engine(&config, dry_run).await?;

    let (manager, events) = DeviceManager::new(
        ManagerSettings::from_scanner_settings(&config.scanners),
        Arc::new(SystemPortOpener),
        store.daily_set(),
        engine.clone(),
    );
    let consumer = tokio::spawn(consume_events(events));

    let ids = manager
        .add_devices(config.devices.clone())
        .await
        .context("Failed to register devices")?;
    info!(count = ids.len(), "Devices registered");

    if config.preferences.auto_connect {
        for (id, result) in manager.connect_all().await {
            if let Err(e) = result {
                warn!(device_id = id, error = %e, "Auto-connect failed");
            }
        }
    }

    let processor = if config.sync.auto_sync && engine.is_online() {
        let (processor, handle) = BacklogProcessor::new(engine.clone(), config.sync.backlog_interval());
        tokio::spawn(processor.run());
        Some(handle)
    } else {
        None
    };

    info!(today = manager.today_count().await, "scanlink running");
    shutdown.await;

    if let Some(handle) = processor {
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Backlog processor did not stop cleanly");
        }
    }

    let devices = manager.configs().await;

    if let Err(e) = manager.shutdown().await {
        warn!(error = %e, "Final backlog replay failed");
    }
    info!(total_scans = manager.total_scan_count(), "scanlink stopped");

    drop(manager);
    if let Err(e) = consumer.await {
        warn!(?e, "Event consumer ended abnormally");
    }

    ScanlinkConfig::save_devices(devices, config_path)
        .context("Failed to save configuration")?;
    Ok(())
}

async fn print_statistics(engine: &RemoteSyncEngine) -> anyhow::Result<()> {
    let stats = engine
        .scan_statistics()
        .await
        .context("Failed to read scan statistics")?;

    println!("Source: {:?}", stats.source);
    for (status, count) in &stats.by_status {
        println!("{:<12} {}", status.label(), count);
    }
    println!("{:<12} {}", "no status", stats.without_status);
    println!("{:<12} {}", "barcodes", stats.barcodes);
    if let Some(scans) = stats.scans {
        println!("{:<12} {}", "scans", scans);
    }
    if let Some(today) = stats.today {
        println!("{:<12} {}", "today", today);
    }
    if let Some(last) = stats.last_scan_time {
        println!("{:<12} {}", "last scan", last);
    }
    Ok(())
}

// =============================================================================
// Event Consumer
// =============================================================================

/// Logs manager events until every sender is gone.
async fn consume_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            ManagerEvent::Scan {
                device_id,
                event,
                decision,
            } => match decision {
                DedupDecision::New => info!(
                    device_id,
                    port = %event.device_port,
                    barcode = %event.barcode,
                    status = ?event.status,
                    "Scan"
                ),
                DedupDecision::DuplicateDaily => info!(
                    device_id,
                    barcode = %event.barcode,
                    "Already scanned today"
                ),
                DedupDecision::DuplicateWindow => debug!(
                    device_id,
                    barcode = %event.barcode,
                    "Repeat scan ignored"
                ),
            },
            ManagerEvent::StateChanged {
                device_id,
                port,
                state,
            } => info!(device_id, port = %port, %state, "Device state"),
            ManagerEvent::Warning {
                device_id,
                port,
                message,
            } => warn!(device_id, port = %port, "{}", message),
            ManagerEvent::Error {
                device_id,
                port,
                message,
            } => error!(device_id, port = %port, "{}", message),
        }
    }
    debug!("Event stream closed");
}

// =============================================================================
// Tests
// =============================================================================
