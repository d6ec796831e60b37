//! # Error Types
//!
//! Domain-specific error types for scanlink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  scanlink-core errors (this file)                                      │
//! │  ├── CoreError        - General domain errors                           │
//! │  ├── ValidationError  - Input validation failures                       │
//! │  └── DecodeError      - Decoder misses (never leaves framing.rs)        │
//! │                                                                         │
//! │  scanlink-store errors  → StoreError  (files)                          │
//! │  scanlink-sync errors   → SyncError   (remote store, config)           │
//! │  scanlink-device errors → ConnectionError / DeviceError (serial)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DeviceError → event channel       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Parity letter outside `N`, `E`, `O`, `M`, `S`.
    #[error("Invalid parity '{0}': expected one of N, E, O, M, S")]
    InvalidParity(String),

    /// Stop bits outside 1, 1.5, 2.
    #[error("Invalid stop bits {0}: expected 1, 1.5 or 2")]
    InvalidStopBits(f32),

    /// Status label that does not belong to the status protocol.
    #[error("Unknown scan status '{0}'")]
    UnknownStatus(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., a port configured twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Decode Error
// =============================================================================

/// A single decoder could not interpret a byte chunk.
///
/// The decode chain swallows these and moves to the next decoder; the last
/// decoder in every chain is lossy and cannot fail.
#[derive(Debug, Error)]
#[error("{decoder} could not decode {len} bytes")]
pub struct DecodeError {
    pub decoder: &'static str,
    pub len: usize,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
