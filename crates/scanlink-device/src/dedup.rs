//! # Dedup Filter
//!
//! Two-tier duplicate suppression shared by every device of a manager.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  accept(port, payload)                                                  │
//! │       │                                                                 │
//! │       ├── seen on this port within the window? ──► DuplicateWindow      │
//! │       │      (window records the payload either way)                    │
//! │       │                                                                 │
//! │       ├── in today's set (any port)? ────────────► DuplicateDaily       │
//! │       │                                                                 │
//! │       └── insert into today's set, persisted ────► New                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The key is the framed line with its status prefix, so `2@LOT-55` and
//! `4@LOT-55` on the same day are different payloads.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::warn;

use scanlink_core::{DedupDecision, DuplicateWindow};
use scanlink_store::DailyScanCache;

/// Window plus daily set. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct DedupFilter {
    window: Arc<Mutex<DuplicateWindow>>,
    daily: Arc<DailyScanCache>,
}

impl DedupFilter {
    pub fn new(window: Duration, daily: Arc<DailyScanCache>) -> Self {
        Self {
            window: Arc::new(Mutex::new(DuplicateWindow::new(window))),
            daily,
        }
    }

    /// Decides whether `payload` read on `port` is a new scan.
    ///
    /// A daily set that cannot be written is logged and the scan is still
    /// accepted.
    pub async fn accept(
        &self,
        port: &str,
        payload: &str,
        now: Instant,
        today: NaiveDate,
    ) -> DedupDecision {
        let in_window = self
            .window
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .check(port, payload, now);
        if in_window {
            return DedupDecision::DuplicateWindow;
        }

        match self.daily.insert(payload, today).await {
            Ok(true) => DedupDecision::New,
            Ok(false) => DedupDecision::DuplicateDaily,
            Err(e) => {
                warn!(port, payload, error = %e, "Daily scan cache not persisted");
                DedupDecision::New
            }
        }
    }

    /// Forgets the window entries of `port` (device removed).
    pub fn forget_port(&self, port: &str) {
        self.window
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear_port(port);
    }

    pub fn daily_set(&self) -> &Arc<DailyScanCache> {
        &self.daily
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn filter(dir: &TempDir, today: NaiveDate) -> DedupFilter {
        let daily = DailyScanCache::load(dir.path(), today).await.unwrap();
        DedupFilter::new(Duration::from_secs(5), Arc::new(daily))
    }

    #[tokio::test]
    async fn test_window_then_daily() {
        let dir = TempDir::new().unwrap();
        let today = date("2025-07-21");
        let filter = filter(&dir, today).await;
        let t0 = Instant::now();

        assert_eq!(filter.accept("COM3", "LOT-99", t0, today).await, DedupDecision::New);
        assert_eq!(
            filter.accept("COM3", "LOT-99", t0 + Duration::from_secs(2), today).await,
            DedupDecision::DuplicateWindow
        );
        // Past the window the daily set still knows it.
        assert_eq!(
            filter.accept("COM3", "LOT-99", t0 + Duration::from_secs(10), today).await,
            DedupDecision::DuplicateDaily
        );
    }

    #[tokio::test]
    async fn test_daily_applies_across_ports() {
        let dir = TempDir::new().unwrap();
        let today = date("2025-07-21");
        let filter = filter(&dir, today).await;
        let t0 = Instant::now();

        assert_eq!(filter.accept("COM3", "LOT-1", t0, today).await, DedupDecision::New);
        assert_eq!(
            filter.accept("COM4", "LOT-1", t0, today).await,
            DedupDecision::DuplicateDaily
        );
    }

    #[tokio::test]
    async fn test_status_prefix_is_part_of_key() {
        let dir = TempDir::new().unwrap();
        let today = date("2025-07-21");
        let filter = filter(&dir, today).await;
        let t0 = Instant::now();

        assert_eq!(filter.accept("COM3", "2@LOT-55", t0, today).await, DedupDecision::New);
        assert_eq!(
            filter.accept("COM3", "4@LOT-55", t0 + Duration::from_secs(1), today).await,
            DedupDecision::New
        );
    }

    #[tokio::test]
    async fn test_membership_survives_restart() {
        let dir = TempDir::new().unwrap();
        let today = date("2025-07-21");
        let t0 = Instant::now();

        let first = filter(&dir, today).await;
        assert_eq!(first.accept("COM3", "LOT-7", t0, today).await, DedupDecision::New);
        drop(first);

        let second = filter(&dir, today).await;
        assert_eq!(
            second.accept("COM3", "LOT-7", t0, today).await,
            DedupDecision::DuplicateDaily
        );
    }

    #[tokio::test]
    async fn test_date_change_starts_fresh_set() {
        let dir = TempDir::new().unwrap();
        let filter = filter(&dir, date("2025-07-21")).await;
        let t0 = Instant::now();

        filter.accept("COM3", "LOT-7", t0, date("2025-07-21")).await;
        assert_eq!(
            filter
                .accept("COM3", "LOT-7", t0 + Duration::from_secs(60), date("2025-07-22"))
                .await,
            DedupDecision::New
        );
    }
}
