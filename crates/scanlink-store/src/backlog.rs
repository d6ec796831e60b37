//! # Scan Backlog
//!
//! Append-only JSON-lines log of accepted scans, one file per calendar date.
//!
//! ## Lifecycle of an Entry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  accepted scan                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  append() ──► scans_2025-07-21.jsonl   {"barcode_data":..,"synced":false}│
//! │       │                                                                 │
//! │       │  upload fails / remote offline                                  │
//! │       ▼                                                                 │
//! │  load_unsynced() ──► replay ──► confirmed?                              │
//! │                                    │                                    │
//! │                        yes ────────┴──────── no                         │
//! │                         │                     │                         │
//! │                         ▼                     ▼                         │
//! │  mark_synced(): file rewritten       stays for the next pass            │
//! │  without the confirmed lines                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - Each append is one `write_all` of a full line, under the writer lock.
//! - A rewrite holds the same lock, so appends that race a replay land after
//!   it and are never lost.
//! - Lines that fail to parse are logged and kept verbatim on rewrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use scanlink_core::BacklogEntry;

const FILE_PREFIX: &str = "scans_";
const FILE_SUFFIX: &str = ".jsonl";

/// File name holding the entries scanned on `date`.
pub fn backlog_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX)
}

fn parse_backlog_file_name(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// One line of a backlog file as read back.
enum Line {
    Entry(BacklogEntry),
    Malformed(String),
}

/// Date-partitioned backlog of scans.
#[derive(Debug, Clone)]
pub struct BacklogStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl BacklogStore {
    /// Store rooted at `dir`. The directory is created on first append.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory holding the backlog files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one entry to the file of its scan date.
    pub async fn append(&self, entry: &BacklogEntry) -> StoreResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::directory(&self.dir, e))?;

        let path = self.dir.join(backlog_file_name(entry.scan_date()));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::file(&path, e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::file(&path, e))?;
        file.sync_data()
            .await
            .map_err(|e| StoreError::file(&path, e))?;

        debug!(
            barcode = %entry.barcode_data,
            port = %entry.device_port,
            synced = entry.synced,
            "Backlog entry appended"
        );
        Ok(())
    }

    /// Every entry with `synced = false`, oldest file first, file order
    /// within a file.
    pub async fn load_unsynced(&self) -> StoreResult<Vec<BacklogEntry>> {
        let _guard = self.write_lock.lock().await;

        let mut pending = Vec::new();
        for (_, path) in self.list_files().await? {
            for line in read_lines(&path).await? {
                if let Line::Entry(entry) = line {
                    if !entry.synced {
                        pending.push(entry);
                    }
                }
            }
        }
        Ok(pending)
    }

    /// Every readable entry, synced or not, oldest file first.
    pub async fn load_all(&self) -> StoreResult<Vec<BacklogEntry>> {
        let _guard = self.write_lock.lock().await;

        let mut entries = Vec::new();
        for (_, path) in self.list_files().await? {
            for line in read_lines(&path).await? {
                if let Line::Entry(entry) = line {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Number of entries waiting for upload.
    pub async fn count_pending(&self) -> StoreResult<usize> {
        Ok(self.load_unsynced().await?.len())
    }

    /// Removes confirmed entries from their files.
    ///
    /// Each affected file is rewritten keeping only lines that are still
    /// unsynced and were not confirmed, plus any malformed lines. A file
    /// left empty is deleted. Returns the number of lines removed for
    /// confirmed entries.
    pub async fn mark_synced(&self, confirmed: &[BacklogEntry]) -> StoreResult<usize> {
        if confirmed.is_empty() {
            return Ok(0);
        }

        let mut by_date: HashMap<NaiveDate, Vec<&BacklogEntry>> = HashMap::new();
        for entry in confirmed {
            by_date.entry(entry.scan_date()).or_default().push(entry);
        }

        let _guard = self.write_lock.lock().await;

        let mut removed = 0;
        for (date, entries) in by_date {
            let path = self.dir.join(backlog_file_name(date));
            let lines = read_lines(&path).await?;
            if lines.is_empty() {
                continue;
            }

            let mut kept = Vec::with_capacity(lines.len());
            for line in lines {
                match line {
                    Line::Entry(entry) => {
                        if entries.iter().any(|c| c.same_record(&entry)) {
                            removed += 1;
                        } else if !entry.synced {
                            kept.push(serde_json::to_string(&entry)?);
                        }
                    }
                    Line::Malformed(raw) => kept.push(raw),
                }
            }

            rewrite(&path, &kept).await?;
        }

        info!(removed, "Backlog entries marked synced");
        Ok(removed)
    }

    /// Deletes files dated before `today` that hold nothing left to upload.
    ///
    /// Files with unsynced or malformed lines are kept. Returns the number
    /// of files deleted.
    pub async fn prune_stale(&self, today: NaiveDate) -> StoreResult<usize> {
        let _guard = self.write_lock.lock().await;

        let mut deleted = 0;
        for (date, path) in self.list_files().await? {
            if date >= today {
                continue;
            }
            let lines = read_lines(&path).await?;
            let retained = lines.iter().any(|line| match line {
                Line::Entry(entry) => !entry.synced,
                Line::Malformed(_) => true,
            });
            if retained {
                continue;
            }
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::file(&path, e))?;
            deleted += 1;
        }

        if deleted > 0 {
            info!(deleted, "Pruned stale backlog files");
        }
        Ok(deleted)
    }

    /// Backlog files sorted by date. Missing directory means no files.
    async fn list_files(&self) -> StoreResult<Vec<(NaiveDate, PathBuf)>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::directory(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::directory(&self.dir, e))?
        {
            let name = item.file_name();
            if let Some(date) = name.to_str().and_then(parse_backlog_file_name) {
                files.push((date, item.path()));
            }
        }
        files.sort();
        Ok(files)
    }
}

async fn read_lines(path: &Path) -> StoreResult<Vec<Line>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::file(path, e)),
    };

    let mut lines = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_str::<BacklogEntry>(raw) {
            Ok(entry) => lines.push(Line::Entry(entry)),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Unreadable backlog line kept as is"
                );
                lines.push(Line::Malformed(raw.to_string()));
            }
        }
    }
    Ok(lines)
}

/// Replaces `path` with `lines` through a temp file, or deletes it when
/// nothing is left.
async fn rewrite(path: &Path, lines: &[String]) -> StoreResult<()> {
    if lines.is_empty() {
        return match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::file(path, e)),
        };
    }

    let mut content = lines.join("\n");
    content.push('\n');

    let tmp = path.with_extension("jsonl.tmp");
    tokio::fs::write(&tmp, content.as_bytes())
        .await
        .map_err(|e| StoreError::file(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::file(path, e))?;
    Ok(())
}
