//! # Scan Statistics
//!
//! Per-status counts of scanned barcodes, taken from the remote table when
//! it answers and from the local backlog otherwise.
//!
//! ## Current Status
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remote record   status_N_x = true for every stage it passed            │
//! │                  current = set flag with the latest status_N_time       │
//! │                            (ties and missing times: highest stage)      │
//! │                                                                         │
//! │  backlog         current = status of the barcode's latest scan that     │
//! │                            carried a prefix                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote::RemoteRecord;
use scanlink_core::{BacklogEntry, ScanStatus};

/// Where the numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    Remote,
    Local,
}

/// Barcode counts by current status.
///
/// `by_status` plus `without_status` always adds up to `barcodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub source: StatsSource,

    /// Distinct barcodes (remote records, or barcodes in the backlog).
    pub barcodes: usize,

    /// Barcodes per current status, in prefix order. Zero counts included.
    pub by_status: Vec<(ScanStatus, usize)>,

    /// Barcodes never scanned with a status prefix.
    pub without_status: usize,

    /// Backlog lines, repeats included. Local only.
    pub scans: Option<usize>,

    /// Backlog lines dated today. Local only.
    pub today: Option<usize>,

    /// Latest scan in the backlog. Local only.
    pub last_scan_time: Option<NaiveDateTime>,
}

impl ScanStatistics {
    fn empty(source: StatsSource) -> Self {
        Self {
            source,
            barcodes: 0,
            by_status: ScanStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            without_status: 0,
            scans: None,
            today: None,
            last_scan_time: None,
        }
    }

    fn count(&mut self, status: Option<ScanStatus>) {
        self.barcodes += 1;
        match status {
            Some(status) => {
                if let Some((_, n)) = self.by_status.iter_mut().find(|(s, _)| *s == status) {
                    *n += 1;
                }
            }
            None => self.without_status += 1,
        }
    }

    /// Count for one status.
    pub fn count_for(&self, status: ScanStatus) -> usize {
        self.by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Stage a remote record is currently at.
pub fn current_status(record: &RemoteRecord) -> Option<ScanStatus> {
    ScanStatus::ALL
        .iter()
        .copied()
        .filter(|s| record.fields.get(s.flag_column()) == Some(&Value::Bool(true)))
        .max_by_key(|s| {
            let time = record.fields.get(s.time_column()).and_then(Value::as_str);
            (time.map(str::to_string), s.code())
        })
}

/// Statistics over a remote table listing.
pub fn remote_statistics(records: &[RemoteRecord]) -> ScanStatistics {
    let mut stats = ScanStatistics::empty(StatsSource::Remote);
    for record in records {
        stats.count(current_status(record));
    }
    stats
}

/// Statistics over backlog entries, with `today` deciding the daily count.
pub fn local_statistics(entries: &[BacklogEntry], today: NaiveDate) -> ScanStatistics {
    let mut stats = ScanStatistics::empty(StatsSource::Local);

    let mut latest: HashMap<&str, (NaiveDateTime, ScanStatus)> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for entry in entries {
        seen.insert(entry.barcode_data.as_str());
        if let Some(status) = entry.status {
            let slot = latest
                .entry(entry.barcode_data.as_str())
                .or_insert((entry.scan_time, status));
            if entry.scan_time >= slot.0 {
                *slot = (entry.scan_time, status);
            }
        }
    }

    for barcode in &seen {
        stats.count(latest.get(barcode).map(|(_, status)| *status));
    }

    stats.scans = Some(entries.len());
    stats.today = Some(entries.iter().filter(|e| e.scan_date() == today).count());
    stats.last_scan_time = entries.iter().map(|e| e.scan_time).max();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RecordId;
    use serde_json::json;

    fn record(id: i64, fields: Value) -> RemoteRecord {
        RemoteRecord {
            id: RecordId::Int(id),
            barcode_data: format!("LOT-{}", id),
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    fn entry(barcode: &str, time: &str, status: Option<ScanStatus>) -> BacklogEntry {
        BacklogEntry {
            barcode_data: barcode.to_string(),
            scan_time: NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S").unwrap(),
            device_port: "COM3".to_string(),
            status,
            synced: false,
        }
    }

    #[test]
    fn test_current_status_follows_latest_time() {
        let moved_back = record(
            1,
            json!({
                "status_4_stored": true, "status_4_time": "2025-07-21T09:00:00",
                "status_5_partial_out": true, "status_5_time": "2025-07-21T08:00:00",
            }),
        );
        assert_eq!(current_status(&moved_back), Some(ScanStatus::Stored));

        let untimed = record(2, json!({"status_2_cut": true, "status_3_cleaned": true}));
        assert_eq!(current_status(&untimed), Some(ScanStatus::Cleaned));

        let cleared = record(3, json!({"status_2_cut": false}));
        assert_eq!(current_status(&cleared), None);
    }

    #[test]
    fn test_remote_counts() {
        let records = vec![
            record(1, json!({"status_2_cut": true})),
            record(2, json!({"status_2_cut": true})),
            record(3, json!({"status_6_shipped": true})),
            record(4, json!({"device_port": "COM3"})),
        ];
        let stats = remote_statistics(&records);

        assert_eq!(stats.source, StatsSource::Remote);
        assert_eq!(stats.barcodes, 4);
        assert_eq!(stats.count_for(ScanStatus::Cut), 2);
        assert_eq!(stats.count_for(ScanStatus::Shipped), 1);
        assert_eq!(stats.count_for(ScanStatus::Stored), 0);
        assert_eq!(stats.without_status, 1);
        assert_eq!(stats.by_status.len(), ScanStatus::ALL.len());
        assert_eq!(stats.scans, None);
    }

    #[test]
    fn test_local_counts() {
        let entries = vec![
            entry("LOT-1", "2025-07-20 10:00:00", Some(ScanStatus::Cut)),
            entry("LOT-1", "2025-07-21 09:00:00", Some(ScanStatus::Stored)),
            entry("LOT-1", "2025-07-21 09:30:00", None),
            entry("LOT-2", "2025-07-21 11:00:00", None),
        ];
        let today = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        let stats = local_statistics(&entries, today);

        assert_eq!(stats.source, StatsSource::Local);
        assert_eq!(stats.barcodes, 2);
        assert_eq!(stats.count_for(ScanStatus::Stored), 1);
        assert_eq!(stats.count_for(ScanStatus::Cut), 0);
        assert_eq!(stats.without_status, 1);
        assert_eq!(stats.scans, Some(4));
        assert_eq!(stats.today, Some(3));
        assert_eq!(
            stats.last_scan_time,
            Some(NaiveDateTime::parse_from_str("2025-07-21 11:00:00", "%Y-%m-%d %H:%M:%S").unwrap())
        );
    }

    #[test]
    fn test_empty_backlog() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        let stats = local_statistics(&[], today);
        assert_eq!(stats.barcodes, 0);
        assert_eq!(stats.today, Some(0));
        assert_eq!(stats.last_scan_time, None);
    }
}
