//! # Duplicate Suppression
//!
//! The two in-memory structures behind duplicate suppression.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  line ──► DuplicateWindow ──dup──► DuplicateWindow  (double read)       │
//! │  (port,        │ (per port, 5s)                                         │
//! │   barcode)     │ new                                                    │
//! │                ▼                                                        │
//! │           DailyScanSet ─────dup──► DuplicateDaily   (seen today)        │
//! │           (all ports, one day)                                          │
//! │                │ new                                                    │
//! │                ▼                                                        │
//! │              New                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Neither structure reads a clock: callers pass `now`, which keeps the
//! window logic deterministic under test. Persistence of the daily set lives
//! in `scanlink-store`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Decision
// =============================================================================

/// Outcome of running a line through both duplicate tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupDecision {
    /// First sighting: record and upload.
    New,
    /// Same device repeated the payload inside the window.
    DuplicateWindow,
    /// Some device already reported the barcode today.
    DuplicateDaily,
}

impl DedupDecision {
    pub fn is_new(&self) -> bool {
        matches!(self, DedupDecision::New)
    }
}

impl std::fmt::Display for DedupDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupDecision::New => write!(f, "new"),
            DedupDecision::DuplicateWindow => write!(f, "duplicate (window)"),
            DedupDecision::DuplicateDaily => write!(f, "duplicate (today)"),
        }
    }
}

// =============================================================================
// Duplicate Window
// =============================================================================

/// Per-device memory of recent payloads.
///
/// A hit does not refresh the entry: a payload held under the scanner for
/// longer than the window is accepted again once per window.
#[derive(Debug, Clone)]
pub struct DuplicateWindow {
    window: Duration,
    seen: HashMap<String, HashMap<String, Instant>>,
}

impl DuplicateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Returns `true` if `(port, barcode)` was seen within the window.
    /// Otherwise records it at `now` and returns `false`.
    pub fn check(&mut self, port: &str, barcode: &str, now: Instant) -> bool {
        let window = self.window;
        let entries = self.seen.entry(port.to_string()).or_default();
        entries.retain(|_, last_seen| now.saturating_duration_since(*last_seen) <= window);

        if entries.contains_key(barcode) {
            return true;
        }
        entries.insert(barcode.to_string(), now);
        false
    }

    /// Entries currently held for `port`, expired ones included until the
    /// next check on that port.
    pub fn len_for(&self, port: &str) -> usize {
        self.seen.get(port).map_or(0, HashMap::len)
    }

    /// Forgets everything recorded for `port`.
    pub fn clear_port(&mut self, port: &str) {
        self.seen.remove(port);
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::DUPLICATE_WINDOW_SECS))
    }
}

// =============================================================================
// Daily Scan Set
// =============================================================================

/// Barcodes accepted since local midnight, across every device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyScanSet {
    date: NaiveDate,
    barcodes: HashSet<String>,
}

impl DailyScanSet {
    /// Empty set for `date`.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            barcodes: HashSet::new(),
        }
    }

    /// Set for `date` seeded with previously persisted barcodes.
    pub fn with_barcodes<I, S>(date: NaiveDate, barcodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            date,
            barcodes: barcodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Starts a new empty day if `today` differs. Returns `true` on rotation.
    pub fn rotate(&mut self, today: NaiveDate) -> bool {
        if today == self.date {
            return false;
        }
        self.date = today;
        self.barcodes.clear();
        true
    }

    pub fn contains(&self, barcode: &str) -> bool {
        self.barcodes.contains(barcode)
    }

    /// Adds a barcode. Returns `false` if it was already present.
    pub fn insert(&mut self, barcode: impl Into<String>) -> bool {
        self.barcodes.insert(barcode.into())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }

    /// Sorted snapshot, the order written to disk.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut barcodes: Vec<String> = self.barcodes.iter().cloned().collect();
        barcodes.sort();
        barcodes
    }
}
