//! # Sync Error Types
//!
//! Error types for remote replication and configuration.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Transport    │  │     Remote Store        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  NetworkFailure │  │  RemoteRejected         │ │
//! │  │  InvalidUrl     │  │                 │  │  SchemaMismatch         │ │
//! │  │  ConfigLoad/Save│  │                 │  │  UnexpectedResponse     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Local Store    │  │    Internal     │                              │
//! │  │  Store          │  │  Serialization  │                              │
//! │  │                 │  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these ever stop ingestion: a failed upload leaves an unsynced
//! backlog entry behind.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all remote and configuration failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Remote URL does not parse or is not http(s).
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// No remote store is configured; scans stay local.
    #[error("Remote store not configured (offline mode)")]
    Offline,

    /// The request never got an HTTP response (DNS, refused, timeout, TLS).
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    // =========================================================================
    // Remote Store Errors
    // =========================================================================
    /// The remote answered with a non-success status.
    #[error("Remote rejected request with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    /// The remote refused the status columns (HTTP 400 on create).
    #[error("Remote schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The remote answered 2xx with a body we could not read.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Backlog read or rewrite failed.
    #[error("Local store error: {0}")]
    Store(String),

    /// Payload could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The backlog processor has stopped.
    #[error("Backlog processor is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<scanlink_store::StoreError> for SyncError {
    fn from(err: scanlink_store::StoreError) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::UnexpectedResponse(err.to_string())
        } else {
            SyncError::NetworkFailure(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt may succeed without operator action.
    ///
    /// ## Retryable Errors
    /// - Network failures
    /// - 5xx, 408 and 429 responses
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Other 4xx responses and schema mismatches
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::NetworkFailure(_) => true,
            SyncError::RemoteRejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::NetworkFailure("refused".into()).is_retryable());
        assert!(SyncError::RemoteRejected {
            status: 503,
            body: String::new()
        }
        .is_retryable());

        assert!(!SyncError::RemoteRejected {
            status: 401,
            body: "bad key".into()
        }
        .is_retryable());
        assert!(!SyncError::SchemaMismatch("no column".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("x".into()).is_config_error());
        assert!(!SyncError::NetworkFailure("x".into()).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::RemoteRejected {
            status: 409,
            body: "duplicate key".into(),
        };
        assert_eq!(
            err.to_string(),
            "Remote rejected request with status 409: duplicate key"
        );
    }
}
