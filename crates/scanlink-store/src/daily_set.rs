//! # Daily Scan Cache
//!
//! The persisted form of [`DailyScanSet`]: every barcode accepted today, by
//! any device, stored as a JSON array in `today_scans_YYYYMMDD.json`.
//!
//! ## Rules
//! - Loading drops cache files whose date is not today.
//! - Every new barcode is written to disk before `insert` returns.
//! - When the local date changes the set starts empty and the previous
//!   day's file is removed.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use scanlink_core::DailyScanSet;

const FILE_PREFIX: &str = "today_scans_";
const FILE_SUFFIX: &str = ".json";

/// File name of the cache for `date`.
pub fn daily_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", FILE_PREFIX, date.format("%Y%m%d"), FILE_SUFFIX)
}

fn parse_daily_file_name(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y%m%d").ok()
}

/// Shared, persisted set of barcodes seen today.
#[derive(Debug)]
pub struct DailyScanCache {
    dir: PathBuf,
    set: Mutex<DailyScanSet>,
}

impl DailyScanCache {
    /// Loads today's cache from `dir`, deleting caches of other dates.
    ///
    /// An unreadable cache file is logged and treated as empty.
    pub async fn load(dir: impl Into<PathBuf>, today: NaiveDate) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::directory(&dir, e))?;

        purge_other_dates(&dir, today).await?;

        let path = dir.join(daily_file_name(today));
        let set = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
                Ok(barcodes) => DailyScanSet::with_barcodes(today, barcodes),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Daily cache unreadable, starting empty");
                    DailyScanSet::new(today)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DailyScanSet::new(today),
            Err(e) => return Err(StoreError::file(&path, e)),
        };

        info!(date = %today, barcodes = set.len(), "Daily scan cache loaded");
        Ok(Self {
            dir,
            set: Mutex::new(set),
        })
    }

    /// True if `barcode` was accepted on `today`.
    pub async fn contains(&self, barcode: &str, today: NaiveDate) -> bool {
        let mut set = self.set.lock().await;
        self.rotate_locked(&mut set, today).await;
        set.contains(barcode)
    }

    /// Adds `barcode` to today's set and persists the set.
    ///
    /// Returns `Ok(false)` if it was already present. On a write failure the
    /// barcode stays in memory and the error is returned.
    pub async fn insert(&self, barcode: &str, today: NaiveDate) -> StoreResult<bool> {
        let mut set = self.set.lock().await;
        self.rotate_locked(&mut set, today).await;

        if !set.insert(barcode) {
            return Ok(false);
        }
        write_set(&self.dir, &set).await?;
        debug!(barcode, total = set.len(), "Daily scan cache updated");
        Ok(true)
    }

    /// Number of barcodes in the current day's set.
    pub async fn len(&self) -> usize {
        self.set.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.set.lock().await.is_empty()
    }

    /// Writes the current set to disk.
    pub async fn persist(&self) -> StoreResult<()> {
        let set = self.set.lock().await;
        write_set(&self.dir, &set).await
    }

    async fn rotate_locked(&self, set: &mut DailyScanSet, today: NaiveDate) {
        let previous = set.date();
        if set.rotate(today) {
            info!(from = %previous, to = %today, "Daily scan cache rotated");
            let old = self.dir.join(daily_file_name(previous));
            if let Err(e) = tokio::fs::remove_file(&old).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %old.display(), error = %e, "Could not remove stale daily cache");
                }
            }
        }
    }
}

async fn purge_other_dates(dir: &Path, today: NaiveDate) -> StoreResult<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StoreError::directory(dir, e))?;

    while let Some(item) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::directory(dir, e))?
    {
        let name = item.file_name();
        let Some(date) = name.to_str().and_then(parse_daily_file_name) else {
            continue;
        };
        if date != today {
            let path = item.path();
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::file(&path, e))?;
            debug!(path = %path.display(), "Removed stale daily cache");
        }
    }
    Ok(())
}

async fn write_set(dir: &Path, set: &DailyScanSet) -> StoreResult<()> {
    let path = dir.join(daily_file_name(set.date()));
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_vec(&set.to_sorted_vec())?;

    tokio::fs::write(&tmp, &content)
        .await
        .map_err(|e| StoreError::file(&tmp, e))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| StoreError::file(&path, e))?;
    Ok(())
}
