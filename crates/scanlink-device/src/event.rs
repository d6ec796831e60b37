//! Messages and status the device workers publish.
//!
//! Workers push [`ManagerEvent`]s on one unbounded channel that a single
//! consumer drains (the daemon logs them, a UI would render them).
//! [`DeviceStatus`] is the per-device record behind
//! [`crate::DeviceManager::snapshot`].

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use scanlink_core::{ConnectionState, DedupDecision, ScanEvent};

/// Something a device worker wants the outside to know.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A line was framed and ran through the dedup filter.
    Scan {
        device_id: u32,
        event: ScanEvent,
        decision: DedupDecision,
    },

    StateChanged {
        device_id: u32,
        port: String,
        state: ConnectionState,
    },

    /// A serial or storage error. Never stops the manager.
    Error {
        device_id: u32,
        port: String,
        message: String,
    },

    /// Degraded but working, e.g. a scan without a status prefix.
    Warning {
        device_id: u32,
        port: String,
        message: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<ManagerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ManagerEvent>;

/// Live state and counters of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub state: ConnectionState,

    /// Scans counted for this device: new ones and daily duplicates.
    pub scan_count: u64,

    pub last_scan: Option<DateTime<Local>>,

    /// Automatic reconnect attempts since the last success.
    pub reconnect_attempts: u32,

    pub last_error: Option<String>,
}

pub(crate) type SharedStatus = Arc<RwLock<DeviceStatus>>;

/// Point-in-time view of one device for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_id: u32,
    pub port: String,
    #[serde(flatten)]
    pub status: DeviceStatus,
}
