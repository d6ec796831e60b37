//! # Store Error Types
//!
//! Error types for local persistence.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  std::io::Error / serde_json::Error                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds the path that failed                  │
//! │       │                                                                 │
//! │       ├──► SyncError::Store   (backlog replay)                         │
//! │       └──► logged by the ingest pipeline (never stops a device)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;

use thiserror::Error;

/// Local persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The data directory could not be created or listed.
    ///
    /// ## When This Occurs
    /// - Parent directory is read-only
    /// - Path exists but is a file
    #[error("Data directory unavailable at {path}: {reason}")]
    DirectoryUnavailable { path: String, reason: String },

    /// Reading or writing one file failed.
    ///
    /// ## When This Occurs
    /// - Disk full
    /// - File removed or locked by another process
    #[error("I/O failed on {path}: {reason}")]
    FileFailed { path: String, reason: String },

    /// An entry could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other I/O error without a known path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Wraps an I/O error with the directory it concerns.
    pub fn directory(path: &Path, err: impl std::fmt::Display) -> Self {
        StoreError::DirectoryUnavailable {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Wraps an I/O error with the file it concerns.
    pub fn file(path: &Path, err: impl std::fmt::Display) -> Self {
        StoreError::FileFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
