//! # scanlink-core: Pure Domain Logic for scanlink
//!
//! This crate is the **heart** of scanlink. It holds the domain types and
//! every algorithm that can be expressed without touching a port, a file or
//! a socket.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        scanlink Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 scanlink-device (serial I/O)                    │   │
//! │  │  DeviceSession ──► FrameReader ──► DedupFilter ──► Manager     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ scanlink-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  framing  │  │   dedup   │  │  status   │  │   │
//! │  │   │ ScanEvent │  │ Decoders  │  │  Window   │  │  0@..5@   │  │   │
//! │  │   │ DeviceCfg │  │ LineFramer│  │ DailySet  │  │  prefixes │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO FILES • NO NETWORK • CALLERS PASS THE CLOCK      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          scanlink-store / scanlink-sync (persistence, HTTP)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (device config, scan events, backlog entries)
//! - [`status`] - Status prefix protocol (`"2@LOT-55"`)
//! - [`framing`] - Byte decoding fallback chain and CR/LF line framing
//! - [`dedup`] - Duplicate window and in-memory daily scan set
//! - [`error`] - Domain error types
//! - [`validation`] - Device configuration validation
//!
//! ## Example Usage
//!
//! ```rust
//! use scanlink_core::framing::FrameDecoder;
//! use scanlink_core::status::parse_status_prefix;
//! use scanlink_core::ScanStatus;
//!
//! let mut decoder = FrameDecoder::new();
//! let lines = decoder.feed(b"2@LOT-55\r\n3@LOT");
//! assert_eq!(lines, vec!["2@LOT-55".to_string()]);
//!
//! let (barcode, status) = parse_status_prefix(&lines[0]);
//! assert_eq!(barcode, "LOT-55");
//! assert_eq!(status, Some(ScanStatus::Cleaned));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod dedup;
pub mod error;
pub mod framing;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use dedup::{DailyScanSet, DedupDecision, DuplicateWindow};
pub use error::{CoreError, ValidationError};
pub use status::ScanStatus;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default duplicate window in seconds.
///
/// A scanner that reports the same payload again within this window is
/// treated as a physical double-read, not as a new scan.
pub const DUPLICATE_WINDOW_SECS: u64 = 5;

/// Default number of automatic reconnect attempts before a device is left
/// in `Failed` and needs an operator.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Default interval between serial polls in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
