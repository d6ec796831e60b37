//! In-memory [`RemoteStore`] with the same create/update rules as the REST
//! table: unique `barcode_data`, numeric ids, optional refusal of status
//! columns. Used by tests across the workspace and by `--dry-run`.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::remote::{Fields, RecordId, RemoteRecord, RemoteStore};

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<RemoteRecord>,
    next_id: i64,
    offline: bool,
    reject_status_columns: bool,
    requests: Vec<String>,
}

/// Remote store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every request fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Makes creates carrying `status_*` columns fail with HTTP 400.
    pub fn set_reject_status_columns(&self, reject: bool) {
        self.state().reject_status_columns = reject;
    }

    /// All records, in creation order.
    pub fn records(&self) -> Vec<RemoteRecord> {
        self.state().records.clone()
    }

    /// The record for `barcode`, if any.
    pub fn record(&self, barcode: &str) -> Option<RemoteRecord> {
        self.state()
            .records
            .iter()
            .find(|r| r.barcode_data == barcode)
            .cloned()
    }

    /// Requests seen so far, e.g. `"GET LOT-55"`, `"POST LOT-55"`, `"PATCH 1"`,
    /// `"LIST"`.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn find_by_barcode(&self, barcode: &str) -> SyncResult<Option<RemoteRecord>> {
        let mut state = self.state();
        state.requests.push(format!("GET {}", barcode));
        if state.offline {
            return Err(SyncError::NetworkFailure("connection refused".into()));
        }
        Ok(state
            .records
            .iter()
            .find(|r| r.barcode_data == barcode)
            .cloned())
    }

    async fn create(&self, fields: &Fields) -> SyncResult<()> {
        let mut state = self.state();
        let barcode = fields
            .get("barcode_data")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        state.requests.push(format!("POST {}", barcode));

        if state.offline {
            return Err(SyncError::NetworkFailure("connection refused".into()));
        }
        if state.reject_status_columns && fields.keys().any(|k| k.starts_with("status_")) {
            return Err(SyncError::SchemaMismatch(
                "column does not exist".to_string(),
            ));
        }
        if state.records.iter().any(|r| r.barcode_data == barcode) {
            return Err(SyncError::RemoteRejected {
                status: 409,
                body: "duplicate key value violates unique constraint".into(),
            });
        }

        state.next_id += 1;
        let mut rest = fields.clone();
        rest.remove("barcode_data");
        let record = RemoteRecord {
            id: RecordId::Int(state.next_id),
            barcode_data: barcode,
            fields: rest,
        };
        state.records.push(record);
        Ok(())
    }

    async fn update(&self, id: &RecordId, fields: &Fields) -> SyncResult<()> {
        let mut state = self.state();
        state.requests.push(format!("PATCH {}", id));
        if state.offline {
            return Err(SyncError::NetworkFailure("connection refused".into()));
        }
        if let Some(record) = state.records.iter_mut().find(|r| &r.id == id) {
            for (key, value) in fields {
                record.fields.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn ping(&self) -> SyncResult<()> {
        let mut state = self.state();
        state.requests.push("PING".to_string());
        if state.offline {
            return Err(SyncError::NetworkFailure("connection refused".into()));
        }
        Ok(())
    }

    async fn list_records(&self) -> SyncResult<Vec<RemoteRecord>> {
        let mut state = self.state();
        state.requests.push("LIST".to_string());
        if state.offline {
            return Err(SyncError::NetworkFailure("connection refused".into()));
        }
        Ok(state.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_is_unique_per_barcode() {
        let store = MemoryRemoteStore::new();
        let body = fields(json!({"barcode_data": "LOT-1", "device_port": "COM3"}));

        store.create(&body).await.unwrap();
        let err = store.create(&body).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 409, .. }));
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_columns() {
        let store = MemoryRemoteStore::new();
        store
            .create(&fields(json!({"barcode_data": "LOT-1", "status_2_cut": true})))
            .await
            .unwrap();

        let record = store.find_by_barcode("LOT-1").await.unwrap().unwrap();
        store
            .update(&record.id, &fields(json!({"status_4_stored": true})))
            .await
            .unwrap();

        let record = store.record("LOT-1").unwrap();
        assert_eq!(record.fields["status_2_cut"], json!(true));
        assert_eq!(record.fields["status_4_stored"], json!(true));
    }
}
