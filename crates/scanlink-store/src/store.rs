//! # Local Store
//!
//! Opens the data directory and hands out the two file-backed stores.
//!
//! ## Layout on Disk
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  <data_dir>/                                                            │
//! │  ├── scans_2025-07-20.jsonl      backlog, kept while entries pending    │
//! │  ├── scans_2025-07-21.jsonl      backlog, today                         │
//! │  └── today_scans_20250721.json   daily dedup cache, today only          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::info;

use crate::backlog::BacklogStore;
use crate::daily_set::DailyScanCache;
use crate::error::{StoreError, StoreResult};

// =============================================================================
// Configuration
// =============================================================================

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for backlog and cache files. Created if missing.
    pub data_dir: PathBuf,

    /// Delete past backlog files with nothing pending when opening.
    /// Default: true
    pub prune_on_open: bool,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            prune_on_open: true,
        }
    }

    /// Sets whether stale backlog files are pruned on open.
    pub fn prune_on_open(mut self, prune: bool) -> Self {
        self.prune_on_open = prune;
        self
    }
}

// =============================================================================
// Local Store
// =============================================================================

/// Handle to everything scanlink keeps on disk. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
    backlog: BacklogStore,
    daily: Arc<DailyScanCache>,
}

impl LocalStore {
    /// Opens the store for the current local date.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::open_at(config, Local::now().date_naive()).await
    }

    /// Opens the store as if today were `today`.
    ///
    /// ## What This Does
    /// 1. Creates the data directory
    /// 2. Loads today's daily cache, dropping other days' caches
    /// 3. Prunes past backlog files with nothing pending (if enabled)
    pub async fn open_at(config: StoreConfig, today: NaiveDate) -> StoreResult<Self> {
        info!(path = %config.data_dir.display(), "Opening local store");

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| StoreError::directory(&config.data_dir, e))?;

        let daily = DailyScanCache::load(&config.data_dir, today).await?;
        let backlog = BacklogStore::new(&config.data_dir);

        if config.prune_on_open {
            backlog.prune_stale(today).await?;
        }

        let pending = backlog.count_pending().await?;
        info!(pending, "Local store ready");

        Ok(LocalStore {
            data_dir: config.data_dir,
            backlog,
            daily: Arc::new(daily),
        })
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Returns the scan backlog.
    pub fn backlog(&self) -> BacklogStore {
        self.backlog.clone()
    }

    /// Returns the shared daily dedup cache.
    pub fn daily_set(&self) -> Arc<DailyScanCache> {
        Arc::clone(&self.daily)
    }
}
