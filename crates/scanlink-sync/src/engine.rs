//! # Remote Sync Engine
//!
//! Replicates accepted scans to the remote store with create-or-update
//! semantics keyed on the barcode, and replays the local backlog.
//!
//! ## Upload Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         upload(entry)                                   │
//! │                                                                         │
//! │  status == none ──────────────────────────────► LocalOnly (no request)  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  GET ?barcode_data=eq.<barcode>                                         │
//! │       │                                                                 │
//! │   found ───► PATCH ?id=eq.<id>  {device_port, status_N_x, status_N_time}│
//! │       │                         └──► Updated                            │
//! │   absent ──► POST {barcode_data, device_port, status_N_x, status_N_time}│
//! │                 │ 200/201 ──► Created                                   │
//! │                 │ 400 ──► POST {barcode_data, device_port}              │
//! │                 │            └──► CreatedBasic                          │
//! │                 └ other ──► Err (entry stays unsynced)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability
//! The caller appends the entry to the backlog with `synced = false` before
//! uploading. Only a confirmed upload removes it again, so a crash, a
//! timeout or an offline remote all leave the entry for the next
//! [`RemoteSyncEngine::sync_backlog`] pass.

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::remote::{Fields, RemoteStore, RestRemoteStore};
use crate::stats::{local_statistics, remote_statistics, ScanStatistics};
use scanlink_core::{BacklogEntry, ScanStatus};
use scanlink_store::BacklogStore;

// =============================================================================
// Results
// =============================================================================

/// What an upload did on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    /// New record with the status pair.
    Created,
    /// New record with base fields only; the remote refused status columns.
    CreatedBasic,
    /// Existing record; status pair and port overwritten.
    Updated,
    /// No status prefix, nothing sent.
    LocalOnly,
}

/// Result of one backlog pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogReport {
    /// Unsynced entries found.
    pub attempted: usize,
    /// Entries confirmed and removed from the backlog.
    pub synced: usize,
    /// Entries left for a later pass.
    pub failed: usize,
}

/// Current sync status for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Whether a remote store is configured.
    pub online: bool,

    /// Unsynced entries in the backlog.
    pub pending_count: usize,

    /// Last backlog pass that finished without failures.
    pub last_sync: Option<DateTime<Local>>,

    /// Last upload error message (if any).
    pub last_error: Option<String>,
}

// =============================================================================
// Payloads
// =============================================================================

fn scan_time_value(entry: &BacklogEntry) -> Value {
    Value::String(entry.scan_time.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn status_fields(fields: &mut Fields, status: ScanStatus, entry: &BacklogEntry) {
    fields.insert(status.flag_column().to_string(), Value::Bool(true));
    fields.insert(status.time_column().to_string(), scan_time_value(entry));
}

/// Body of a create: base fields plus the status pair.
pub fn create_fields(entry: &BacklogEntry, status: ScanStatus) -> Fields {
    let mut fields = basic_fields(entry);
    status_fields(&mut fields, status, entry);
    fields
}

/// Body of the fallback create: barcode and port only.
pub fn basic_fields(entry: &BacklogEntry) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        "barcode_data".to_string(),
        Value::String(entry.barcode_data.clone()),
    );
    fields.insert(
        "device_port".to_string(),
        Value::String(entry.device_port.clone()),
    );
    fields
}

/// Body of an update: port plus the status pair. Other pairs are untouched.
pub fn update_fields(entry: &BacklogEntry, status: ScanStatus) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        "device_port".to_string(),
        Value::String(entry.device_port.clone()),
    );
    status_fields(&mut fields, status, entry);
    fields
}

// =============================================================================
// Engine
// =============================================================================

/// Uploads scans and replays the backlog.
pub struct RemoteSyncEngine {
    remote: Option<Arc<dyn RemoteStore>>,
    backlog: BacklogStore,
    pass_lock: Mutex<()>,
    status: RwLock<SyncStatus>,
}

impl RemoteSyncEngine {
    /// Engine over an explicit remote. `None` means offline mode.
    pub fn new(remote: Option<Arc<dyn RemoteStore>>, backlog: BacklogStore) -> Self {
        let status = SyncStatus {
            online: remote.is_some(),
            ..SyncStatus::default()
        };
        Self {
            remote,
            backlog,
            pass_lock: Mutex::new(()),
            status: RwLock::new(status),
        }
    }

    /// Engine for the configured REST remote, or offline when the remote is
    /// disabled or missing its URL or key.
    pub fn from_settings(settings: &RemoteSettings, backlog: BacklogStore) -> SyncResult<Self> {
        if !settings.is_active() {
            info!("Remote store not configured, running in offline mode");
            return Ok(Self::new(None, backlog));
        }
        let remote = RestRemoteStore::new(settings)?;
        info!(endpoint = %remote.endpoint(), "Remote store configured");
        Ok(Self::new(Some(Arc::new(remote)), backlog))
    }

    /// True when a remote store is configured.
    pub fn is_online(&self) -> bool {
        self.remote.is_some()
    }

    /// Backlog this engine replays.
    pub fn backlog(&self) -> &BacklogStore {
        &self.backlog
    }

    /// Uploads one entry with create-or-update semantics.
    pub async fn upload(&self, entry: &BacklogEntry) -> SyncResult<UploadOutcome> {
        let Some(status) = entry.status else {
            debug!(barcode = %entry.barcode_data, "No status prefix, not uploading");
            return Ok(UploadOutcome::LocalOnly);
        };
        let remote = self.remote.as_ref().ok_or(SyncError::Offline)?;

        let outcome = match remote.find_by_barcode(&entry.barcode_data).await? {
            Some(record) => {
                remote
                    .update(&record.id, &update_fields(entry, status))
                    .await?;
                UploadOutcome::Updated
            }
            None => match remote.create(&create_fields(entry, status)).await {
                Ok(()) => UploadOutcome::Created,
                Err(SyncError::SchemaMismatch(body)) => {
                    warn!(
                        barcode = %entry.barcode_data,
                        body = %body,
                        "Remote refused status columns, creating basic record"
                    );
                    remote.create(&basic_fields(entry)).await?;
                    UploadOutcome::CreatedBasic
                }
                Err(e) => return Err(e),
            },
        };

        info!(
            barcode = %entry.barcode_data,
            status = %status,
            port = %entry.device_port,
            ?outcome,
            "Scan uploaded"
        );
        Ok(outcome)
    }

    /// Uploads `entry` on its own task and, on success, removes it from the
    /// backlog and clears the last error. Failures are logged and recorded
    /// in [`SyncStatus`].
    pub fn dispatch(self: &Arc<Self>, entry: BacklogEntry) -> JoinHandle<SyncResult<UploadOutcome>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.upload(&entry).await {
                Ok(outcome) => {
                    engine.backlog.mark_synced(std::slice::from_ref(&entry)).await?;
                    engine.status.write().await.last_error = None;
                    Ok(outcome)
                }
                Err(e) => {
                    warn!(
                        barcode = %entry.barcode_data,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Upload failed, scan kept in backlog"
                    );
                    engine.status.write().await.last_error = Some(e.to_string());
                    Err(e)
                }
            }
        })
    }

    /// Re-uploads every unsynced backlog entry and removes the confirmed ones.
    ///
    /// Passes are serialized; a pass started while another runs waits for
    /// it. Appends made during a pass stay in the backlog for the next one.
    /// Offline mode returns an empty report.
    pub async fn sync_backlog(&self) -> SyncResult<BacklogReport> {
        if self.remote.is_none() {
            return Ok(BacklogReport::default());
        }

        let _pass = self.pass_lock.lock().await;

        let pending = self.backlog.load_unsynced().await?;
        let mut report = BacklogReport {
            attempted: pending.len(),
            ..BacklogReport::default()
        };
        if pending.is_empty() {
            debug!("Backlog empty");
            self.record_pass(&report, None).await?;
            return Ok(report);
        }

        info!(count = pending.len(), "Replaying backlog");

        let mut confirmed = Vec::with_capacity(pending.len());
        let mut last_error = None;
        for entry in pending {
            match self.upload(&entry).await {
                Ok(_) => confirmed.push(entry),
                Err(e) => {
                    warn!(
                        barcode = %entry.barcode_data,
                        scan_time = %entry.scan_time,
                        error = %e,
                        "Backlog entry not synced"
                    );
                    report.failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        report.synced = self.backlog.mark_synced(&confirmed).await?;
        info!(
            synced = report.synced,
            failed = report.failed,
            "Backlog pass finished"
        );

        self.record_pass(&report, last_error).await?;
        Ok(report)
    }

    async fn record_pass(&self, report: &BacklogReport, error: Option<String>) -> SyncResult<()> {
        let pending = self.backlog.count_pending().await?;
        let mut status = self.status.write().await;
        status.pending_count = pending;
        if report.failed == 0 {
            status.last_sync = Some(Local::now());
            status.last_error = None;
        } else {
            status.last_error = error;
        }
        Ok(())
    }

    /// Issues the cheap ping request against the remote.
    pub async fn test_connection(&self) -> SyncResult<()> {
        let remote = self.remote.as_ref().ok_or(SyncError::Offline)?;
        remote.ping().await?;
        info!("Remote connection test succeeded");
        Ok(())
    }

    /// Status counts from the remote table, or from the backlog when the
    /// remote is offline or the listing fails.
    pub async fn scan_statistics(&self) -> SyncResult<ScanStatistics> {
        if let Some(remote) = &self.remote {
            match remote.list_records().await {
                Ok(records) => return Ok(remote_statistics(&records)),
                Err(e) => warn!(error = %e, "Remote statistics unavailable, using local backlog"),
            }
        }
        let entries = self.backlog.load_all().await?;
        Ok(local_statistics(&entries, Local::now().date_naive()))
    }

    /// Current status with a fresh pending count.
    pub async fn status(&self) -> SyncStatus {
        let pending = match self.backlog.count_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not count pending backlog entries");
                self.status.read().await.pending_count
            }
        };
        let mut status = self.status.write().await;
        status.pending_count = pending;
        status.clone()
    }
}

impl std::fmt::Debug for RemoteSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSyncEngine")
            .field("online", &self.remote.is_some())
            .field("backlog", &self.backlog.dir())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRemoteStore;
    use crate::stats::StatsSource;
    use chrono::NaiveDateTime;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(barcode: &str, status: Option<ScanStatus>, time: &str) -> BacklogEntry {
        BacklogEntry {
            barcode_data: barcode.to_string(),
            scan_time: NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S").unwrap(),
            device_port: "COM3".to_string(),
            status,
            synced: false,
        }
    }

    fn engine(dir: &TempDir) -> (Arc<RemoteSyncEngine>, Arc<MemoryRemoteStore>) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = RemoteSyncEngine::new(
            Some(remote.clone() as Arc<dyn RemoteStore>),
            BacklogStore::new(dir.path()),
        );
        (Arc::new(engine), remote)
    }

    #[tokio::test]
    async fn test_create_then_update_same_record() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);

        let first = entry("LOT-55", Some(ScanStatus::Cleaned), "2025-07-21 10:00:00");
        let second = entry("LOT-55", Some(ScanStatus::PartialOut), "2025-07-21 11:30:00");

        assert_eq!(engine.upload(&first).await.unwrap(), UploadOutcome::Created);
        assert_eq!(engine.upload(&second).await.unwrap(), UploadOutcome::Updated);

        let records = remote.records();
        assert_eq!(records.len(), 1);
        let fields = &records[0].fields;
        assert_eq!(fields["status_3_cleaned"], json!(true));
        assert_eq!(fields["status_3_time"], json!("2025-07-21T10:00:00"));
        assert_eq!(fields["status_5_partial_out"], json!(true));
        assert_eq!(fields["status_5_time"], json!("2025-07-21T11:30:00"));
    }

    #[tokio::test]
    async fn test_same_status_twice_is_one_record() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);
        let cut = entry("LOT-7", Some(ScanStatus::Cut), "2025-07-21 10:00:00");

        engine.upload(&cut).await.unwrap();
        engine.upload(&cut).await.unwrap();

        assert_eq!(remote.records().len(), 1);
        assert_eq!(remote.record("LOT-7").unwrap().fields["status_2_cut"], json!(true));
    }

    #[tokio::test]
    async fn test_schema_mismatch_falls_back_to_basic_record() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);
        remote.set_reject_status_columns(true);

        let outcome = engine
            .upload(&entry("LOT-9", Some(ScanStatus::Stored), "2025-07-21 10:00:00"))
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::CreatedBasic);
        let record = remote.record("LOT-9").unwrap();
        assert_eq!(record.fields.get("device_port"), Some(&json!("COM3")));
        assert!(record.fields.keys().all(|k| !k.starts_with("status_")));
    }

    #[tokio::test]
    async fn test_no_status_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);

        let outcome = engine
            .upload(&entry("LOT-1", None, "2025-07-21 10:00:00"))
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::LocalOnly);
        assert!(remote.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_stays_until_replay_succeeds() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);
        remote.set_offline(true);

        let scan = entry("LOT-3", Some(ScanStatus::Shipped), "2025-07-21 10:00:00");
        engine.backlog().append(&scan).await.unwrap();
        let result = engine.dispatch(scan.clone()).await.unwrap();
        assert!(matches!(result, Err(SyncError::NetworkFailure(_))));
        assert_eq!(engine.backlog().load_unsynced().await.unwrap(), vec![scan]);
        assert!(engine.status().await.last_error.is_some());

        let report = engine.sync_backlog().await.unwrap();
        assert_eq!(report, BacklogReport { attempted: 1, synced: 0, failed: 1 });

        remote.set_offline(false);
        let report = engine.sync_backlog().await.unwrap();
        assert_eq!(report, BacklogReport { attempted: 1, synced: 1, failed: 0 });
        assert!(engine.backlog().load_unsynced().await.unwrap().is_empty());

        let status = engine.status().await;
        assert_eq!(status.pending_count, 0);
        assert!(status.last_sync.is_some());
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_success_clears_backlog() {
        let dir = TempDir::new().unwrap();
        let (engine, _remote) = engine(&dir);

        let scan = entry("LOT-4", Some(ScanStatus::Cut), "2025-07-21 10:00:00");
        engine.backlog().append(&scan).await.unwrap();
        let outcome = engine.dispatch(scan).await.unwrap().unwrap();

        assert_eq!(outcome, UploadOutcome::Created);
        assert_eq!(engine.backlog().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_success_clears_last_error() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);

        remote.set_offline(true);
        let first = entry("LOT-6", Some(ScanStatus::Cut), "2025-07-21 10:00:00");
        assert!(engine.dispatch(first).await.unwrap().is_err());
        assert!(engine.status().await.last_error.is_some());

        remote.set_offline(false);
        let second = entry("LOT-8", Some(ScanStatus::Cut), "2025-07-21 10:05:00");
        engine.dispatch(second).await.unwrap().unwrap();
        assert!(engine.status().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_statistics_fall_back_to_backlog() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);

        engine
            .upload(&entry("LOT-1", Some(ScanStatus::Cut), "2025-07-21 10:00:00"))
            .await
            .unwrap();
        engine
            .upload(&entry("LOT-2", Some(ScanStatus::Shipped), "2025-07-21 10:01:00"))
            .await
            .unwrap();

        let stats = engine.scan_statistics().await.unwrap();
        assert_eq!(stats.source, StatsSource::Remote);
        assert_eq!(stats.barcodes, 2);
        assert_eq!(stats.count_for(ScanStatus::Shipped), 1);

        remote.set_offline(true);
        engine
            .backlog()
            .append(&entry("LOT-3", Some(ScanStatus::Stored), "2025-07-21 10:02:00"))
            .await
            .unwrap();

        let stats = engine.scan_statistics().await.unwrap();
        assert_eq!(stats.source, StatsSource::Local);
        assert_eq!(stats.barcodes, 1);
        assert_eq!(stats.count_for(ScanStatus::Stored), 1);
        assert_eq!(stats.scans, Some(1));
    }

    #[tokio::test]
    async fn test_replay_twice_is_harmless() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir);
        engine
            .backlog()
            .append(&entry("LOT-5", Some(ScanStatus::Cut), "2025-07-21 10:00:00"))
            .await
            .unwrap();

        let (a, b) = tokio::join!(engine.sync_backlog(), engine.sync_backlog());
        assert_eq!(a.unwrap().synced + b.unwrap().synced, 1);
        assert_eq!(remote.records().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_mode() {
        let dir = TempDir::new().unwrap();
        let engine = RemoteSyncEngine::from_settings(
            &RemoteSettings::default(),
            BacklogStore::new(dir.path()),
        )
        .unwrap();

        assert!(!engine.is_online());
        assert_eq!(engine.sync_backlog().await.unwrap(), BacklogReport::default());
        assert!(matches!(engine.test_connection().await, Err(SyncError::Offline)));
        assert!(matches!(
            engine
                .upload(&entry("LOT-1", Some(ScanStatus::Cut), "2025-07-21 10:00:00"))
                .await,
            Err(SyncError::Offline)
        ));
    }
}
