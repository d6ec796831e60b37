//! # scanlink-sync: Remote Replication for scanlink
//!
//! Uploads accepted scans to the remote store and replays whatever the
//! local backlog still holds.
//!
//! ## Offline-First Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  accepted scan                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BacklogStore.append(synced=false)      ◄── always, before any request  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  RemoteSyncEngine.dispatch() ──ok──► mark_synced                        │
//! │       │                                                                 │
//! │       └─ err ──► stays in backlog                                       │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │              BacklogProcessor (every 300s / sync_now)                   │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │              RemoteSyncEngine.sync_backlog()                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration file and environment overrides
//! - [`engine`] - Upload and backlog replay
//! - [`remote`] - Remote store trait and REST client
//! - [`memory`] - In-memory remote store
//! - [`processor`] - Background backlog processor
//! - [`stats`] - Per-status scan statistics
//! - [`error`] - Sync error types

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod processor;
pub mod remote;
pub mod stats;

pub use config::ScanlinkConfig;
pub use engine::{BacklogReport, RemoteSyncEngine, SyncStatus, UploadOutcome};
pub use error::{SyncError, SyncResult};
pub use memory::MemoryRemoteStore;
pub use processor::{BacklogProcessor, BacklogProcessorHandle};
pub use remote::{RecordId, RemoteRecord, RemoteStore, RestRemoteStore};
pub use stats::{ScanStatistics, StatsSource};
