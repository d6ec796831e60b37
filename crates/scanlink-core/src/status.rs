//! # Status Prefix Protocol
//!
//! Scanners at different workstations print the same lot barcode with a
//! two-character prefix naming the workflow stage that was just completed.
//!
//! ## Prefix Mapping
//! ```text
//! ┌──────────┬──────────────┬──────────────────────────┬────────────────┐
//! │  Prefix  │  Status      │  Remote flag column      │  Time column   │
//! ├──────────┼──────────────┼──────────────────────────┼────────────────┤
//! │  0@      │  scheduled   │  status_1_scheduled      │  status_1_time │
//! │  1@      │  cut         │  status_2_cut            │  status_2_time │
//! │  2@      │  cleaned     │  status_3_cleaned        │  status_3_time │
//! │  3@      │  stored      │  status_4_stored         │  status_4_time │
//! │  4@      │  partial_out │  status_5_partial_out    │  status_5_time │
//! │  5@      │  shipped     │  status_6_shipped        │  status_6_time │
//! └──────────┴──────────────┴──────────────────────────┴────────────────┘
//! ```
//!
//! The prefix is stripped before the value is used as the record key, so
//! `"2@LOT-55"` and `"4@LOT-55"` address the same remote record.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Workflow stage encoded by a status prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Scheduled,
    Cut,
    Cleaned,
    Stored,
    PartialOut,
    Shipped,
}

impl ScanStatus {
    /// All statuses in prefix order.
    pub const ALL: [ScanStatus; 6] = [
        ScanStatus::Scheduled,
        ScanStatus::Cut,
        ScanStatus::Cleaned,
        ScanStatus::Stored,
        ScanStatus::PartialOut,
        ScanStatus::Shipped,
    ];

    /// Maps a prefix digit (0..=5) to its status.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The prefix digit for this status.
    pub fn code(self) -> u8 {
        match self {
            ScanStatus::Scheduled => 0,
            ScanStatus::Cut => 1,
            ScanStatus::Cleaned => 2,
            ScanStatus::Stored => 3,
            ScanStatus::PartialOut => 4,
            ScanStatus::Shipped => 5,
        }
    }

    /// Stable lowercase label used in backlog files and logs.
    pub fn label(self) -> &'static str {
        match self {
            ScanStatus::Scheduled => "scheduled",
            ScanStatus::Cut => "cut",
            ScanStatus::Cleaned => "cleaned",
            ScanStatus::Stored => "stored",
            ScanStatus::PartialOut => "partial_out",
            ScanStatus::Shipped => "shipped",
        }
    }

    /// The two-character payload prefix, e.g. `"2@"`.
    pub fn prefix(self) -> String {
        format!("{}@", self.code())
    }

    /// Boolean column on the remote record that this status sets.
    pub fn flag_column(self) -> &'static str {
        match self {
            ScanStatus::Scheduled => "status_1_scheduled",
            ScanStatus::Cut => "status_2_cut",
            ScanStatus::Cleaned => "status_3_cleaned",
            ScanStatus::Stored => "status_4_stored",
            ScanStatus::PartialOut => "status_5_partial_out",
            ScanStatus::Shipped => "status_6_shipped",
        }
    }

    /// Timestamp column paired with [`ScanStatus::flag_column`].
    pub fn time_column(self) -> &'static str {
        match self {
            ScanStatus::Scheduled => "status_1_time",
            ScanStatus::Cut => "status_2_time",
            ScanStatus::Cleaned => "status_3_time",
            ScanStatus::Stored => "status_4_time",
            ScanStatus::PartialOut => "status_5_time",
            ScanStatus::Shipped => "status_6_time",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.label() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

/// Splits a scanned payload into its record key and optional status.
///
/// ## Rules
/// - `"<0-5>@<rest>"` with a non-empty rest → `(rest, Some(status))`
/// - anything else (no prefix, digit out of range, empty rest) → `(payload, None)`
///
/// ## Example
/// ```rust
/// use scanlink_core::status::parse_status_prefix;
/// use scanlink_core::ScanStatus;
///
/// assert_eq!(parse_status_prefix("4@LOT-55"), ("LOT-55", Some(ScanStatus::PartialOut)));
/// assert_eq!(parse_status_prefix("LOT-99"), ("LOT-99", None));
/// assert_eq!(parse_status_prefix("9@LOT-99"), ("9@LOT-99", None));
/// ```
pub fn parse_status_prefix(payload: &str) -> (&str, Option<ScanStatus>) {
    let bytes = payload.as_bytes();
    if bytes.len() > 2 && bytes[1] == b'@' && bytes[0].is_ascii_digit() {
        if let Some(status) = ScanStatus::from_code(bytes[0] - b'0') {
            return (&payload[2..], Some(status));
        }
    }
    (payload, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prefix_maps_to_its_status() {
        for status in ScanStatus::ALL {
            let payload = format!("{}LOT-1", status.prefix());
            assert_eq!(parse_status_prefix(&payload), ("LOT-1", Some(status)));
        }
    }

    #[test]
    fn test_unrecognized_prefixes_keep_payload() {
        assert_eq!(parse_status_prefix("Rich-07212025-10"), ("Rich-07212025-10", None));
        assert_eq!(parse_status_prefix("123456789012"), ("123456789012", None));
        assert_eq!(parse_status_prefix("6@LOT"), ("6@LOT", None));
        assert_eq!(parse_status_prefix("2@"), ("2@", None));
        assert_eq!(parse_status_prefix("@LOT"), ("@LOT", None));
    }

    #[test]
    fn test_columns_follow_one_based_numbering() {
        assert_eq!(ScanStatus::Cleaned.flag_column(), "status_3_cleaned");
        assert_eq!(ScanStatus::PartialOut.flag_column(), "status_5_partial_out");
        assert_eq!(ScanStatus::Shipped.time_column(), "status_6_time");
    }

    #[test]
    fn test_label_round_trip_and_serde_form() {
        assert_eq!("partial_out".parse::<ScanStatus>().unwrap(), ScanStatus::PartialOut);
        assert!("done".parse::<ScanStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ScanStatus::PartialOut).unwrap(),
            "\"partial_out\""
        );
    }
}
