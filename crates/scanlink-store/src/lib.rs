//! # scanlink-store: Local Persistence for scanlink
//!
//! Everything scanlink keeps on disk lives behind this crate: the
//! date-partitioned scan backlog and the daily duplicate cache.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        scanlink Data Flow                               │
//! │                                                                         │
//! │  accepted ScanEvent (scanlink-device)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 scanlink-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │  LocalStore   │    │  BacklogStore  │    │ DailyScan-   │  │   │
//! │  │   │  (store.rs)   │───►│  (backlog.rs)  │    │ Cache        │  │   │
//! │  │   │               │    │  JSONL / date  │    │ JSON / today │  │   │
//! │  │   │  open, prune  │───►│                │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  RemoteSyncEngine replays load_unsynced() (scanlink-sync)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Opening the data directory
//! - [`backlog`] - Append-only scan backlog
//! - [`daily_set`] - Persisted daily dedup set
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scanlink_store::{LocalStore, StoreConfig};
//!
//! let store = LocalStore::open(StoreConfig::new("local_data")).await?;
//! store.backlog().append(&event.to_backlog_entry(false)).await?;
//! let pending = store.backlog().load_unsynced().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backlog;
pub mod daily_set;
pub mod error;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use backlog::BacklogStore;
pub use daily_set::DailyScanCache;
pub use error::{StoreError, StoreResult};
pub use store::{LocalStore, StoreConfig};
