//! # Domain Types
//!
//! Core domain types shared by every scanlink crate.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │ ScannerDeviceConfig │   │    ScanEvent    │   │  BacklogEntry   │   │
//! │  │  ─────────────────  │   │  ─────────────  │   │  ─────────────  │   │
//! │  │  device_id          │   │  raw_line       │   │  barcode_data   │   │
//! │  │  port (identity)    │──►│  barcode        │──►│  scan_time      │   │
//! │  │  baud_rate          │   │  status         │   │  device_port    │   │
//! │  │  parity/stop_bits   │   │  device_port    │   │  status         │   │
//! │  │  read_timeout_ms    │   │  observed_at    │   │  synced         │   │
//! │  └─────────────────────┘   └─────────────────┘   └─────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │     Parity      │   │ ConnectionState │                             │
//! │  │  N E O M S      │   │  Disconnected   │                             │
//! │  └─────────────────┘   │  Connecting     │                             │
//! │  ┌─────────────────┐   │  Connected      │                             │
//! │  │    StopBits     │   │  Scanning       │                             │
//! │  │  1 / 1.5 / 2    │   │  Reconnecting   │                             │
//! │  └─────────────────┘   │  Failed         │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! A device is identified by its OS port name (`COM3`, `/dev/ttyACM0`).
//! `device_id` is a manager-assigned handle and is never reused while the
//! process runs.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::{parse_status_prefix, ScanStatus};

// =============================================================================
// Serial Line Settings
// =============================================================================

/// Parity setting of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl Parity {
    /// Single-letter form used in configuration files.
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }
}

impl TryFrom<String> for Parity {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Parity::None),
            "E" | "EVEN" => Ok(Parity::Even),
            "O" | "ODD" => Ok(Parity::Odd),
            "M" | "MARK" => Ok(Parity::Mark),
            "S" | "SPACE" => Ok(Parity::Space),
            _ => Err(CoreError::InvalidParity(value)),
        }
    }
}

impl From<Parity> for String {
    fn from(parity: Parity) -> Self {
        parity.letter().to_string()
    }
}

/// Stop bits of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

impl TryFrom<f32> for StopBits {
    type Error = CoreError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if value == 1.0 {
            Ok(StopBits::One)
        } else if value == 1.5 {
            Ok(StopBits::OnePointFive)
        } else if value == 2.0 {
            Ok(StopBits::Two)
        } else {
            Err(CoreError::InvalidStopBits(value))
        }
    }
}

impl From<StopBits> for f32 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1.0,
            StopBits::OnePointFive => 1.5,
            StopBits::Two => 2.0,
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_read_timeout_ms() -> u64 {
    1000
}

/// Configuration of one scanner.
///
/// `port` is the identity: the manager rejects a second config for a port
/// that is already registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerDeviceConfig {
    /// Manager-assigned handle. Zero in files means "assign on add".
    #[serde(default)]
    pub device_id: u32,

    /// OS port name.
    pub port: String,

    /// Line speed in baud.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits per character (5-8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity letter.
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Driver read timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl ScannerDeviceConfig {
    /// Creates a config for `port` with 9600 8N1 and a 1s read timeout.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            device_id: 0,
            port: port.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    /// Same config with a different baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of one device.
///
/// ```text
/// Disconnected ──► Connecting ──► Connected ──► Scanning
///      ▲               │                           │ fatal error
///      │               ▼                           ▼
///      └────────── Failed ◄────────────── Reconnecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Scanning,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// True while the port is open.
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Scanning)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Scan Event
// =============================================================================

/// One framed line read from a device. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// The line as framed, prefix included.
    pub raw_line: String,

    /// Record key: the line with any status prefix removed.
    pub barcode: String,

    /// Status carried by the prefix, if any.
    pub status: Option<ScanStatus>,

    /// Port the line was read from.
    pub device_port: String,

    /// Local wall-clock time the line was framed.
    pub observed_at: DateTime<Local>,
}

impl ScanEvent {
    /// Builds an event from a framed line, splitting off the status prefix.
    pub fn from_line(
        raw_line: impl Into<String>,
        device_port: impl Into<String>,
        observed_at: DateTime<Local>,
    ) -> Self {
        let raw_line = raw_line.into();
        let (barcode, status) = parse_status_prefix(&raw_line);
        let barcode = barcode.to_string();
        Self {
            raw_line,
            barcode,
            status,
            device_port: device_port.into(),
            observed_at,
        }
    }

    /// Backlog form of this event.
    pub fn to_backlog_entry(&self, synced: bool) -> BacklogEntry {
        BacklogEntry {
            barcode_data: self.barcode.clone(),
            scan_time: self.observed_at.naive_local(),
            device_port: self.device_port.clone(),
            status: self.status,
            synced,
        }
    }
}

// =============================================================================
// Backlog Entry
// =============================================================================

/// One line of the local JSON-lines backlog.
///
/// ```json
/// {"barcode_data":"LOT-55","scan_time":"2025-07-21T10:15:30.120","device_port":"COM3","status":"cleaned","synced":false}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogEntry {
    /// Barcode with the status prefix removed.
    pub barcode_data: String,

    /// Local time of the scan (ISO-8601, no offset).
    pub scan_time: NaiveDateTime,

    /// Port the scan came from.
    pub device_port: String,

    /// Status carried by the scan.
    #[serde(default)]
    pub status: Option<ScanStatus>,

    /// True once the remote store confirmed the record.
    #[serde(default)]
    pub synced: bool,
}

impl BacklogEntry {
    /// Calendar date that selects the backlog file.
    pub fn scan_date(&self) -> NaiveDate {
        self.scan_time.date()
    }

    /// Entries carry no id; two entries are the same record when every
    /// field except `synced` matches.
    pub fn same_record(&self, other: &BacklogEntry) -> bool {
        self.barcode_data == other.barcode_data
            && self.device_port == other.device_port
            && self.scan_time == other.scan_time
            && self.status == other.status
    }
}
