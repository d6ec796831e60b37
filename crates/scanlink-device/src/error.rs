//! # Device Error Types
//!
//! Serial failures are sorted into a small taxonomy so the worker knows
//! whether to keep reading or hand the device to the reconnect supervisor.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  error text / kind                        ConnectionError   ErrorClass  │
//! │  ───────────────────────────────────────  ───────────────   ──────────  │
//! │  "not functioning", "device not found",   DeviceRemoved     Fatal       │
//! │  "no such device", "I/O error" (EIO),                                   │
//! │  NoDevice, BrokenPipe                                                   │
//! │  "permission", "access"                   PermissionDenied  Fatal       │
//! │  "could not open port", "busy",           PortUnavailable   Fatal       │
//! │  "serial exception"                                                     │
//! │  anything else                            Unknown           Transient   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fatal errors start a reconnect; transient ones are only logged.

use std::io;

use thiserror::Error;

use scanlink_core::ValidationError;
use scanlink_store::StoreError;
use scanlink_sync::SyncError;

// =============================================================================
// Connection Errors
// =============================================================================

/// Whether an I/O failure ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged; the pipeline keeps polling.
    Transient,
    /// The port is gone or unusable; reconnection is needed.
    Fatal,
}

/// Why a serial operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("port unavailable: {0}")]
    PortUnavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device removed: {0}")]
    DeviceRemoved(String),

    #[error("serial error: {0}")]
    Unknown(String),
}

impl ConnectionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectionError::Unknown(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

const REMOVED_MARKERS: &[&str] = &[
    "device attached to the system is not functioning",
    "not functioning",
    "device not found",
    "no such device",
    "no such file or directory",
    // EIO: what a Linux tty read returns once its USB adapter is unplugged.
    "i/o error",
    "input/output error",
];

const PERMISSION_MARKERS: &[&str] = &["permission", "access"];

const UNAVAILABLE_MARKERS: &[&str] = &[
    "could not open port",
    "serial exception",
    "resource busy",
    "device or resource busy",
    "in use",
];

/// Maps an error message to a [`ConnectionError`] by scanning for known
/// substrings, case-insensitively.
pub fn classify(message: &str) -> ConnectionError {
    let lower = message.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(REMOVED_MARKERS) {
        ConnectionError::DeviceRemoved(message.to_string())
    } else if has(PERMISSION_MARKERS) {
        ConnectionError::PermissionDenied(message.to_string())
    } else if has(UNAVAILABLE_MARKERS) {
        ConnectionError::PortUnavailable(message.to_string())
    } else {
        ConnectionError::Unknown(message.to_string())
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            io::ErrorKind::PermissionDenied => ConnectionError::PermissionDenied(message),
            io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => {
                ConnectionError::DeviceRemoved(message)
            }
            _ => classify(&message),
        }
    }
}

impl From<serialport::Error> for ConnectionError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => ConnectionError::DeviceRemoved(err.description),
            serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                ConnectionError::PermissionDenied(err.description)
            }
            serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
                ConnectionError::DeviceRemoved(err.description)
            }
            _ => classify(&err.description),
        }
    }
}

// =============================================================================
// Manager Errors
// =============================================================================

/// Errors returned by [`crate::DeviceManager`] commands.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The config failed validation, or its port is already registered.
    #[error("Invalid device: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown device id {0}")]
    UnknownDevice(u32),

    /// Opening the port failed, including the single retry.
    #[error("Connection to {port} failed: {source}")]
    Connection {
        port: String,
        #[source]
        source: ConnectionError,
    },

    /// The device's worker task has exited.
    #[error("Worker for {0} is not running")]
    WorkerGone(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// The OS port enumeration failed.
    #[error("Could not list serial ports: {0}")]
    PortListing(String),
}

impl DeviceError {
    /// The underlying serial error, if this is a connection failure.
    pub fn connection(&self) -> Option<&ConnectionError> {
        match self {
            DeviceError::Connection { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_markers() {
        assert!(matches!(
            classify("A device attached to the system is not functioning."),
            ConnectionError::DeviceRemoved(_)
        ));
        assert!(matches!(
            classify("could not open port 'COM7': FileNotFoundError"),
            ConnectionError::PortUnavailable(_)
        ));
        assert!(matches!(
            classify("Access is denied."),
            ConnectionError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify("Permission denied (os error 13)"),
            ConnectionError::PermissionDenied(_)
        ));
        assert!(matches!(classify("framing error"), ConnectionError::Unknown(_)));
    }

    #[test]
    fn test_error_class() {
        assert_eq!(
            ConnectionError::DeviceRemoved("gone".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            ConnectionError::PortUnavailable("busy".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            ConnectionError::Unknown("parity error".into()).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_io_error_kinds() {
        let err: ConnectionError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, ConnectionError::DeviceRemoved(_)));

        let err: ConnectionError = io::Error::new(io::ErrorKind::Other, "overrun").into();
        assert!(matches!(err, ConnectionError::Unknown(_)));
    }

    #[test]
    fn test_unplugged_tty_is_fatal() {
        // serialport's description of EIO from bytes_to_read/read.
        let err: ConnectionError =
            serialport::Error::new(serialport::ErrorKind::Io(io::ErrorKind::Other), "I/O error")
                .into();
        assert!(matches!(err, ConnectionError::DeviceRemoved(_)));
        assert_eq!(err.class(), ErrorClass::Fatal);

        let err: ConnectionError =
            io::Error::new(io::ErrorKind::Other, "Input/output error (os error 5)").into();
        assert!(err.is_fatal());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_eio_os_error_is_fatal() {
        let err: ConnectionError = io::Error::from_raw_os_error(5).into();
        assert!(matches!(err, ConnectionError::DeviceRemoved(_)));
    }

    #[test]
    fn test_serialport_error_kinds() {
        let err: ConnectionError =
            serialport::Error::new(serialport::ErrorKind::NoDevice, "unplugged").into();
        assert_eq!(err, ConnectionError::DeviceRemoved("unplugged".into()));

        let err: ConnectionError = serialport::Error::new(
            serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied),
            "denied",
        )
        .into();
        assert!(err.is_fatal());
    }
}
