//! # Device Manager
//!
//! Registry of scanner configs and the workers that run them.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DeviceManager                                                          │
//! │    devices: RwLock<BTreeMap<device_id, DeviceHandle>>                   │
//! │       │        (only add/remove take the write lock)                    │
//! │       ▼                                                                 │
//! │  DeviceHandle ── commands (mpsc) ──► DeviceWorker task                  │
//! │              ── status (shared, written by the worker only)             │
//! │                                                                         │
//! │  Shared by every worker:                                                │
//! │    DedupFilter (window + today's set)                                   │
//! │    ScanRecorder (backlog + RemoteSyncEngine)                            │
//! │    event channel ──► one consumer                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let (manager, mut events) = DeviceManager::new(
//!     ManagerSettings::from_scanner_settings(&config.scanners),
//!     Arc::new(SystemPortOpener),
//!     store.daily_set(),
//!     engine,
//! );
//! let id = manager.add_device(ScannerDeviceConfig::new("COM3")).await?;
//! manager.connect(id).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dedup::DedupFilter;
use crate::error::{DeviceError, DeviceResult};
use crate::event::{DeviceSnapshot, DeviceStatus, EventReceiver, EventSender, SharedStatus};
use crate::pipeline::IngestContext;
use crate::recorder::ScanRecorder;
use crate::session::{DeviceSession, PortOpener, SessionTiming};
use crate::supervisor::{ReconnectPolicy, ReconnectSupervisor};
use crate::worker::{DeviceCommand, DeviceWorker};
use scanlink_core::validation::{validate_device_config, validate_device_list};
use scanlink_core::{ConnectionState, ScannerDeviceConfig, ValidationError};
use scanlink_store::DailyScanCache;
use scanlink_sync::config::ScannerSettings;
use scanlink_sync::{BacklogReport, RemoteSyncEngine, SyncStatus};

const COMMAND_BUFFER: usize = 16;

// =============================================================================
// Settings
// =============================================================================

/// Timing shared by every device of a manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub duplicate_window: Duration,
    pub poll_interval: Duration,
    pub timing: SessionTiming,
    pub reconnect: ReconnectPolicy,
    /// Pause before a failed manual connect is retried.
    pub connect_retry_delay: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_scanner_settings(&ScannerSettings::default())
    }
}

impl ManagerSettings {
    pub fn from_scanner_settings(settings: &ScannerSettings) -> Self {
        Self {
            duplicate_window: settings.duplicate_window(),
            poll_interval: settings.poll_interval(),
            timing: SessionTiming {
                stop_timeout: settings.stop_timeout(),
                close_grace: settings.close_grace(),
            },
            reconnect: ReconnectPolicy::default().with_max_attempts(settings.max_reconnect_attempts),
            connect_retry_delay: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

struct DeviceHandle {
    config: ScannerDeviceConfig,
    commands: mpsc::Sender<DeviceCommand>,
    status: SharedStatus,
    task: JoinHandle<()>,
}

/// Registry of scanners and their workers.
pub struct DeviceManager {
    settings: ManagerSettings,
    opener: Arc<dyn PortOpener>,
    dedup: DedupFilter,
    recorder: ScanRecorder,
    events: EventSender,
    devices: RwLock<BTreeMap<u32, DeviceHandle>>,
    next_id: AtomicU32,
    total_scans: Arc<AtomicU64>,
}

impl DeviceManager {
    /// Creates an empty manager and the receiver for its events.
    pub fn new(
        settings: ManagerSettings,
        opener: Arc<dyn PortOpener>,
        daily: Arc<DailyScanCache>,
        engine: Arc<RemoteSyncEngine>,
    ) -> (Self, EventReceiver) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            dedup: DedupFilter::new(settings.duplicate_window, daily),
            recorder: ScanRecorder::new(engine),
            settings,
            opener,
            events,
            devices: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            total_scans: Arc::new(AtomicU64::new(0)),
        };
        (manager, events_rx)
    }

    pub fn engine(&self) -> &Arc<RemoteSyncEngine> {
        self.recorder.engine()
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Registers a device and starts its (disconnected) worker.
    ///
    /// A `device_id` of zero, or one already taken, is replaced by the next
    /// free id. Returns the id used.
    pub async fn add_device(&self, mut config: ScannerDeviceConfig) -> DeviceResult<u32> {
        validate_device_config(&config)?;

        let mut devices = self.devices.write().await;
        if devices.values().any(|d| d.config.port == config.port) {
            return Err(ValidationError::Duplicate {
                field: "port".to_string(),
                value: config.port,
            }
            .into());
        }

        if config.device_id == 0 || devices.contains_key(&config.device_id) {
            config.device_id = self.next_id.fetch_add(1, Ordering::Relaxed);
            while devices.contains_key(&config.device_id) {
                config.device_id = self.next_id.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            self.next_id
                .fetch_max(config.device_id.saturating_add(1), Ordering::Relaxed);
        }

        let id = config.device_id;
        let handle = self.spawn_worker(config.clone());
        devices.insert(id, handle);

        info!(device_id = id, port = %config.port, baud = config.baud_rate, "Device added");
        Ok(id)
    }

    /// Registers a startup device list. The list is validated as a whole
    /// first, so nothing is added if any entry is invalid.
    pub async fn add_devices(&self, configs: Vec<ScannerDeviceConfig>) -> DeviceResult<Vec<u32>> {
        validate_device_list(&configs)?;
        let mut ids = Vec::with_capacity(configs.len());
        for config in configs {
            ids.push(self.add_device(config).await?);
        }
        Ok(ids)
    }

    /// Disconnects and forgets a device. Returns its config.
    pub async fn remove_device(&self, id: u32) -> DeviceResult<ScannerDeviceConfig> {
        let handle = self
            .devices
            .write()
            .await
            .remove(&id)
            .ok_or(DeviceError::UnknownDevice(id))?;

        let _ = handle.commands.send(DeviceCommand::Shutdown).await;
        if let Err(e) = handle.task.await {
            warn!(device_id = id, error = %e, "Device worker ended abnormally");
        }
        self.dedup.forget_port(&handle.config.port);

        info!(device_id = id, port = %handle.config.port, "Device removed");
        Ok(handle.config)
    }

    fn spawn_worker(&self, config: ScannerDeviceConfig) -> DeviceHandle {
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let status: SharedStatus = Arc::new(RwLock::new(DeviceStatus::default()));

        let ctx = IngestContext {
            device_id: config.device_id,
            port: config.port.clone(),
            dedup: self.dedup.clone(),
            recorder: self.recorder.clone(),
            events: self.events.clone(),
            status: Arc::clone(&status),
            total_scans: Arc::clone(&self.total_scans),
            poll_interval: self.settings.poll_interval,
        };
        let session = DeviceSession::new(
            config.clone(),
            Arc::clone(&self.opener),
            self.settings.timing,
        );
        let worker = DeviceWorker::new(
            session,
            ReconnectSupervisor::new(self.settings.reconnect),
            ctx,
            commands_rx,
            self.settings.connect_retry_delay,
        );

        DeviceHandle {
            config,
            commands,
            status,
            task: tokio::spawn(worker.run()),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn commands_for(&self, id: u32) -> DeviceResult<(String, mpsc::Sender<DeviceCommand>)> {
        let devices = self.devices.read().await;
        let handle = devices.get(&id).ok_or(DeviceError::UnknownDevice(id))?;
        Ok((handle.config.port.clone(), handle.commands.clone()))
    }

    async fn all_commands(&self) -> Vec<(u32, String, mpsc::Sender<DeviceCommand>)> {
        self.devices
            .read()
            .await
            .iter()
            .map(|(id, h)| (*id, h.config.port.clone(), h.commands.clone()))
            .collect()
    }

    async fn send_connect(
        port: String,
        commands: mpsc::Sender<DeviceCommand>,
    ) -> DeviceResult<oneshot::Receiver<DeviceResult<()>>> {
        let (reply, rx) = oneshot::channel();
        commands
            .send(DeviceCommand::Connect(reply))
            .await
            .map_err(|_| DeviceError::WorkerGone(port))?;
        Ok(rx)
    }

    async fn send_disconnect(
        port: String,
        commands: mpsc::Sender<DeviceCommand>,
    ) -> DeviceResult<oneshot::Receiver<()>> {
        let (reply, rx) = oneshot::channel();
        commands
            .send(DeviceCommand::Disconnect(reply))
            .await
            .map_err(|_| DeviceError::WorkerGone(port))?;
        Ok(rx)
    }

    /// Opens the device's port and starts scanning.
    ///
    /// A failed open is retried once. If the retry fails with a fatal
    /// error the device also starts automatic reconnection.
    pub async fn connect(&self, id: u32) -> DeviceResult<()> {
        let (port, commands) = self.commands_for(id).await?;
        let reply = Self::send_connect(port.clone(), commands).await?;
        reply.await.map_err(|_| DeviceError::WorkerGone(port))?
    }

    /// Stops scanning and closes the port. Returns once the port is free.
    pub async fn disconnect(&self, id: u32) -> DeviceResult<()> {
        let (port, commands) = self.commands_for(id).await?;
        let reply = Self::send_disconnect(port.clone(), commands).await?;
        reply.await.map_err(|_| DeviceError::WorkerGone(port))
    }

    /// Connects every device. Devices connect in parallel; results are in
    /// id order.
    pub async fn connect_all(&self) -> Vec<(u32, DeviceResult<()>)> {
        let mut pending = Vec::new();
        for (id, port, commands) in self.all_commands().await {
            pending.push((id, port.clone(), Self::send_connect(port, commands).await));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (id, port, sent) in pending {
            let result = match sent {
                Ok(reply) => reply.await.unwrap_or(Err(DeviceError::WorkerGone(port))),
                Err(e) => Err(e),
            };
            if let Err(ref e) = result {
                warn!(device_id = id, error = %e, "Device did not connect");
            }
            results.push((id, result));
        }
        results
    }

    /// Disconnects every device and waits until all ports are closed.
    pub async fn disconnect_all(&self) {
        let mut pending = Vec::new();
        for (id, port, commands) in self.all_commands().await {
            pending.push((id, Self::send_disconnect(port, commands).await));
        }
        for (id, sent) in pending {
            let done = match sent {
                Ok(reply) => reply.await.is_ok(),
                Err(_) => false,
            };
            if !done {
                warn!(device_id = id, "Device worker gone during disconnect");
            }
        }
        info!("All devices disconnected");
    }

    /// Stops every worker, then runs a final backlog pass.
    pub async fn shutdown(&self) -> DeviceResult<BacklogReport> {
        info!("Device manager shutting down");

        let handles: Vec<(u32, DeviceHandle)> =
            std::mem::take(&mut *self.devices.write().await).into_iter().collect();
        for (_, handle) in &handles {
            let _ = handle.commands.send(DeviceCommand::Shutdown).await;
        }
        for (id, handle) in handles {
            if let Err(e) = handle.task.await {
                warn!(device_id = id, error = %e, "Device worker ended abnormally");
            }
        }

        let report = self.engine().sync_backlog().await?;
        info!(
            synced = report.synced,
            failed = report.failed,
            "Device manager stopped"
        );
        Ok(report)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current state and counters of every device, in id order.
    pub async fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let entries: Vec<(u32, String, SharedStatus)> = self
            .devices
            .read()
            .await
            .iter()
            .map(|(id, h)| (*id, h.config.port.clone(), Arc::clone(&h.status)))
            .collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for (device_id, port, status) in entries {
            snapshots.push(DeviceSnapshot {
                device_id,
                port,
                status: status.read().await.clone(),
            });
        }
        snapshots
    }

    pub async fn state(&self, id: u32) -> DeviceResult<ConnectionState> {
        let status = {
            let devices = self.devices.read().await;
            let handle = devices.get(&id).ok_or(DeviceError::UnknownDevice(id))?;
            Arc::clone(&handle.status)
        };
        let state = status.read().await.state;
        Ok(state)
    }

    /// Registered configs in id order, for writing back to the config file.
    pub async fn configs(&self) -> Vec<ScannerDeviceConfig> {
        self.devices
            .read()
            .await
            .values()
            .map(|h| h.config.clone())
            .collect()
    }

    /// Id of the device registered for `port`.
    pub async fn device_for_port(&self, port: &str) -> Option<u32> {
        self.devices
            .read()
            .await
            .iter()
            .find(|(_, h)| h.config.port == port)
            .map(|(id, _)| *id)
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Scans counted since start across all devices, removed ones included.
    pub fn total_scan_count(&self) -> u64 {
        self.total_scans.load(Ordering::Relaxed)
    }

    /// Barcodes in today's dedup set.
    pub async fn today_count(&self) -> usize {
        self.dedup.daily_set().len().await
    }

    /// Runs a backlog pass now.
    pub async fn sync_now(&self) -> DeviceResult<BacklogReport> {
        Ok(self.engine().sync_backlog().await?)
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.engine().status().await
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("settings", &self.settings)
            .field("total_scans", &self.total_scan_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::event::ManagerEvent;
    use crate::testing::{MockOpener, MockPort};
    use scanlink_core::DedupDecision;
    use scanlink_store::{LocalStore, StoreConfig};
    use scanlink_sync::{MemoryRemoteStore, RemoteStore};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        manager: DeviceManager,
        events: EventReceiver,
        opener: Arc<MockOpener>,
        remote: Arc<MemoryRemoteStore>,
    }

    fn test_settings() -> ManagerSettings {
        ManagerSettings {
            duplicate_window: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            timing: SessionTiming {
                stop_timeout: Duration::from_millis(500),
                close_grace: Duration::from_millis(1),
            },
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(20),
                settle: Duration::from_millis(5),
                min_interval: Duration::from_secs(5),
                max_attempts: 2,
            },
            connect_retry_delay: Duration::from_millis(5),
        }
    }

    async fn fixture_with(settings: ManagerSettings) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(StoreConfig::new(dir.path())).await.unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = Arc::new(RemoteSyncEngine::new(
            Some(remote.clone() as Arc<dyn RemoteStore>),
            store.backlog(),
        ));
        let opener = Arc::new(MockOpener::new());
        let (manager, events) = DeviceManager::new(
            settings,
            opener.clone() as Arc<dyn PortOpener>,
            store.daily_set(),
            engine,
        );
        Fixture {
            _dir: dir,
            manager,
            events,
            opener,
            remote,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(test_settings()).await
    }

    async fn wait_for_state(manager: &DeviceManager, id: u32, expected: ConnectionState) {
        for _ in 0..300 {
            if manager.state(id).await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "device {} never reached {} (now {})",
            id,
            expected,
            manager.state(id).await.unwrap()
        );
    }

    async fn next_scan(events: &mut EventReceiver) -> (u32, String, DedupDecision) {
        loop {
            match tokio::time::timeout(Duration::from_secs(3), events.recv()).await {
                Ok(Some(ManagerEvent::Scan {
                    device_id,
                    event,
                    decision,
                })) => return (device_id, event.raw_line, decision),
                Ok(Some(_)) => continue,
                other => panic!("no scan event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_port() {
        let fx = fixture().await;

        let first = fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        let second = fx.manager.add_device(ScannerDeviceConfig::new("COM4")).await.unwrap();
        assert_ne!(first, second);

        let err = fx
            .manager
            .add_device(ScannerDeviceConfig::new("COM3"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid device: port 'COM3' already exists");
        assert_eq!(fx.manager.device_count().await, 2);

        let removed = fx.manager.remove_device(first).await.unwrap();
        assert_eq!(removed.port, "COM3");
        assert!(matches!(
            fx.manager.remove_device(first).await,
            Err(DeviceError::UnknownDevice(_))
        ));

        // The port is free again once removed.
        fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        let ports: Vec<String> = fx.manager.configs().await.into_iter().map(|c| c.port).collect();
        assert_eq!(ports, vec!["COM4", "COM3"]);
    }

    #[tokio::test]
    async fn test_add_devices_keeps_ids_and_validates_list() {
        let fx = fixture().await;

        let mut a = ScannerDeviceConfig::new("COM3");
        a.device_id = 7;
        let b = ScannerDeviceConfig::new("COM3");
        assert!(fx.manager.add_devices(vec![a.clone(), b]).await.is_err());
        assert_eq!(fx.manager.device_count().await, 0);

        let ids = fx
            .manager
            .add_devices(vec![a, ScannerDeviceConfig::new("COM4")])
            .await
            .unwrap();
        assert_eq!(ids[0], 7);
        assert!(ids[1] > 7);
        assert_eq!(fx.manager.device_for_port("COM4").await, Some(ids[1]));
    }

    #[tokio::test]
    async fn test_connect_scan_disconnect() {
        let mut fx = fixture().await;
        let port = MockPort::new();
        fx.opener.attach("COM3", port.clone());

        let id = fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        fx.manager.connect(id).await.unwrap();
        assert_eq!(fx.manager.state(id).await.unwrap(), ConnectionState::Scanning);

        port.push(b"2@LOT-55\r\n");
        assert_eq!(
            next_scan(&mut fx.events).await,
            (id, "2@LOT-55".to_string(), DedupDecision::New)
        );
        port.push(b"2@LOT-55\r\n");
        assert_eq!(next_scan(&mut fx.events).await.2, DedupDecision::DuplicateWindow);

        let snapshot = fx.manager.snapshot().await;
        assert_eq!(snapshot[0].status.scan_count, 1);
        assert!(snapshot[0].status.last_scan.is_some());
        assert_eq!(fx.manager.total_scan_count(), 1);

        fx.manager.disconnect(id).await.unwrap();
        assert_eq!(fx.manager.state(id).await.unwrap(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_daily_duplicate_from_other_device() {
        let mut fx = fixture().await;
        let com3 = MockPort::new();
        let com4 = MockPort::new();
        fx.opener.attach("COM3", com3.clone());
        fx.opener.attach("COM4", com4.clone());

        let a = fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        let b = fx.manager.add_device(ScannerDeviceConfig::new("COM4")).await.unwrap();
        for (_, result) in fx.manager.connect_all().await {
            result.unwrap();
        }

        com3.push(b"1@LOT-7\n");
        assert_eq!(next_scan(&mut fx.events).await, (a, "1@LOT-7".into(), DedupDecision::New));
        com4.push(b"1@LOT-7\n");
        assert_eq!(
            next_scan(&mut fx.events).await,
            (b, "1@LOT-7".into(), DedupDecision::DuplicateDaily)
        );

        assert_eq!(fx.manager.total_scan_count(), 2);
        assert_eq!(fx.manager.today_count().await, 1);

        fx.manager.shutdown().await.unwrap();
        // Uploaded once, never twice.
        assert_eq!(fx.remote.records().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_retries_once_then_reconnects_until_exhausted() {
        let fx = fixture().await;
        let id = fx.manager.add_device(ScannerDeviceConfig::new("COM9")).await.unwrap();

        let err = fx.manager.connect(id).await.unwrap_err();
        assert!(err.connection().map_or(false, ConnectionError::is_fatal));

        wait_for_state(&fx.manager, id, ConnectionState::Failed).await;
        for _ in 0..100 {
            if fx.opener.open_count("COM9") == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Two for the manual connect, then max_attempts automatic ones.
        assert_eq!(fx.opener.open_count("COM9"), 4);
        wait_for_state(&fx.manager, id, ConnectionState::Failed).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.opener.open_count("COM9"), 4);
        let snapshot = fx.manager.snapshot().await;
        assert_eq!(snapshot[0].status.reconnect_attempts, 2);
        assert!(snapshot[0].status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_second_attempt_succeeds() {
        let fx = fixture().await;
        let port = MockPort::new();
        fx.opener.attach("COM3", port);
        fx.opener
            .fail_open("COM3", ConnectionError::PortUnavailable("port busy".into()));

        let id = fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        fx.manager.connect(id).await.unwrap();
        assert_eq!(fx.opener.open_count("COM3"), 2);
        assert_eq!(fx.manager.state(id).await.unwrap(), ConnectionState::Scanning);
    }

    #[tokio::test]
    async fn test_unplug_triggers_reconnect() {
        let mut fx = fixture().await;
        let port = MockPort::new();
        fx.opener.attach("COM3", port.clone());

        let id = fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        fx.manager.connect(id).await.unwrap();

        port.unplug();
        loop {
            match tokio::time::timeout(Duration::from_secs(3), fx.events.recv()).await {
                Ok(Some(ManagerEvent::StateChanged {
                    state: ConnectionState::Failed,
                    ..
                })) => break,
                Ok(Some(_)) => continue,
                other => panic!("device never failed: {:?}", other),
            }
        }
        port.replug();

        wait_for_state(&fx.manager, id, ConnectionState::Scanning).await;
        assert_eq!(fx.opener.open_count("COM3"), 2);
        assert_eq!(fx.manager.snapshot().await[0].status.reconnect_attempts, 0);

        port.push(b"3@LOT-1\n");
        assert_eq!(next_scan(&mut fx.events).await.2, DedupDecision::New);
    }

    #[tokio::test]
    async fn test_disconnect_interrupts_reconnect_wait() {
        let mut settings = test_settings();
        settings.reconnect.base_delay = Duration::from_secs(30);
        let fx = fixture_with(settings).await;
        let id = fx.manager.add_device(ScannerDeviceConfig::new("COM9")).await.unwrap();

        assert!(fx.manager.connect(id).await.is_err());
        wait_for_state(&fx.manager, id, ConnectionState::Reconnecting).await;

        tokio::time::timeout(Duration::from_secs(2), fx.manager.disconnect(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fx.manager.state(id).await.unwrap(), ConnectionState::Disconnected);
        assert_eq!(fx.opener.open_count("COM9"), 2);
    }

    #[tokio::test]
    async fn test_shutdown_runs_final_sync() {
        let mut fx = fixture().await;
        let port = MockPort::new();
        fx.opener.attach("COM3", port.clone());
        fx.remote.set_offline(true);

        let id = fx.manager.add_device(ScannerDeviceConfig::new("COM3")).await.unwrap();
        fx.manager.connect(id).await.unwrap();
        port.push(b"5@LOT-200\n");
        next_scan(&mut fx.events).await;

        // Let the failed upload settle before the remote comes back.
        for _ in 0..100 {
            if fx.manager.sync_status().await.last_error.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        fx.remote.set_offline(false);

        let report = fx.manager.shutdown().await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(fx.manager.device_count().await, 0);
        assert!(fx.remote.record("LOT-200").is_some());
    }
}
