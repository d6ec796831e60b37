//! Fan-out of accepted scans: the local backlog always, the remote store
//! when a status is present and a remote is configured.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::DeviceResult;
use scanlink_core::ScanEvent;
use scanlink_sync::RemoteSyncEngine;

/// Where an accepted scan went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Stored unsynced; an upload task was started.
    Dispatched,
    /// Stored unsynced; offline mode, the backlog will carry it.
    Stored,
    /// No status prefix. Stored as synced, never uploaded.
    LocalOnly,
}

/// Records accepted scans. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScanRecorder {
    engine: Arc<RemoteSyncEngine>,
}

impl ScanRecorder {
    pub fn new(engine: Arc<RemoteSyncEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RemoteSyncEngine> {
        &self.engine
    }

    /// Appends `event` to the backlog and, if it carries a status, hands it
    /// to the sync engine. The append completes before any request starts.
    pub async fn record(&self, event: &ScanEvent) -> DeviceResult<RecordOutcome> {
        if event.status.is_none() {
            warn!(
                port = %event.device_port,
                barcode = %event.barcode,
                "No status prefix, scan kept locally only"
            );
            self.engine
                .backlog()
                .append(&event.to_backlog_entry(true))
                .await?;
            return Ok(RecordOutcome::LocalOnly);
        }

        let entry = event.to_backlog_entry(false);
        self.engine.backlog().append(&entry).await?;

        if !self.engine.is_online() {
            debug!(barcode = %entry.barcode_data, "Offline, scan left in backlog");
            return Ok(RecordOutcome::Stored);
        }

        // The task owns the result; failures are logged there.
        drop(self.engine.dispatch(entry));
        Ok(RecordOutcome::Dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use scanlink_store::BacklogStore;
    use scanlink_sync::{MemoryRemoteStore, RemoteStore};
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(line: &str) -> ScanEvent {
        let at = Local.with_ymd_and_hms(2025, 7, 21, 10, 15, 30).unwrap();
        ScanEvent::from_line(line, "COM3", at)
    }

    async fn wait_for_pending(backlog: &BacklogStore, expected: usize) {
        for _ in 0..100 {
            if backlog.count_pending().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("backlog never reached {} pending", expected);
    }

    #[tokio::test]
    async fn test_status_scan_is_uploaded_and_confirmed() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = Arc::new(RemoteSyncEngine::new(
            Some(remote.clone() as Arc<dyn RemoteStore>),
            BacklogStore::new(dir.path()),
        ));
        let recorder = ScanRecorder::new(engine.clone());

        let outcome = recorder.record(&event("2@LOT-55")).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Dispatched);

        wait_for_pending(engine.backlog(), 0).await;
        let record = remote.record("LOT-55").unwrap();
        assert_eq!(record.fields["status_3_cleaned"].as_bool(), Some(true));
    }

    #[tokio::test]
    async fn test_failed_upload_stays_in_backlog() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_offline(true);
        let engine = Arc::new(RemoteSyncEngine::new(
            Some(remote.clone() as Arc<dyn RemoteStore>),
            BacklogStore::new(dir.path()),
        ));
        let recorder = ScanRecorder::new(engine.clone());

        recorder.record(&event("1@LOT-8")).await.unwrap();
        for _ in 0..100 {
            if engine.status().await.last_error.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let pending = engine.backlog().load_unsynced().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].barcode_data, "LOT-8");
    }

    #[tokio::test]
    async fn test_offline_and_local_only() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(RemoteSyncEngine::new(None, BacklogStore::new(dir.path())));
        let recorder = ScanRecorder::new(engine.clone());

        assert_eq!(
            recorder.record(&event("3@LOT-9")).await.unwrap(),
            RecordOutcome::Stored
        );
        assert_eq!(
            recorder.record(&event("LOT-10")).await.unwrap(),
            RecordOutcome::LocalOnly
        );
        assert_eq!(engine.backlog().count_pending().await.unwrap(), 1);
    }
}
