//! Download history.
//!
//! The history is a single JSON array, most recent first, read once when the
//! store is opened and rewritten after every mutation. Writes go to a temporary
//! file in the same directory which then replaces the history file, so a crash
//! mid-write leaves the previous file intact.
//!
//! A missing or unreadable file yields an empty history. A failed write leaves
//! the in-memory state authoritative and is reported through
//! [`Persisted::warning`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Maximum number of records kept; older records are dropped on write.
pub const HISTORY_CAP: usize = 500;

/// Default number of records returned by [`HistoryStore::list`] callers.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// File name of the history log.
pub const HISTORY_FILE_NAME: &str = "download_history.json";

/// Outcome recorded for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    /// The file was downloaded.
    Completed,
    /// The attempt failed.
    Failed,
    /// The attempt was cancelled.
    Cancelled,
}

impl std::fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// A stored history record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Record id, unique and increasing within a store.
    pub id: u64,
    /// Source URL.
    pub url: String,
    /// Media title.
    pub title: String,
    /// Platform display name.
    pub platform: String,
    /// Output file; empty for attempts without a file.
    pub file_path: String,
    /// Thumbnail URL.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    /// Quality label.
    pub quality: String,
    /// Attempt status.
    pub status: HistoryStatus,
    /// When the record was written.
    pub downloaded_at: DateTime<Local>,
}

/// Record contents supplied by the caller; id and timestamp are assigned on add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryRecord {
    /// Source URL.
    pub url: String,
    /// Media title.
    pub title: String,
    /// Platform display name.
    pub platform: String,
    /// Output file.
    pub file_path: String,
    /// Thumbnail URL.
    pub thumbnail: Option<String>,
    /// Duration in seconds.
    pub duration_seconds: Option<u64>,
    /// Quality label.
    pub quality: String,
    /// Attempt status.
    pub status: HistoryStatus,
}

impl NewHistoryRecord {
    /// Create a record with the given status.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        platform: impl Into<String>,
        quality: impl Into<String>,
        status: HistoryStatus,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            platform: platform.into(),
            file_path: String::new(),
            thumbnail: None,
            duration_seconds: None,
            quality: quality.into(),
            status,
        }
    }

    /// Set the output file.
    #[must_use]
    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = path.as_ref().to_string_lossy().into_owned();
        self
    }

    /// Set the thumbnail URL.
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    /// Set the duration.
    #[must_use]
    pub const fn with_duration(mut self, seconds: Option<u64>) -> Self {
        self.duration_seconds = seconds;
        self
    }
}

/// Result of a mutation: the value, plus a warning if saving failed.
#[derive(Debug)]
pub struct Persisted<T> {
    /// Mutation result; valid in memory regardless of the warning.
    pub value: T,
    /// `Some(Error::PersistenceDegraded)` if the history file was not updated.
    pub warning: Option<Error>,
}

impl<T> Persisted<T> {
    fn from_save(value: T, saved: Result<()>) -> Self {
        Self {
            value,
            warning: saved.err(),
        }
    }

    /// Whether the file could not be written.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }

    /// Discard the warning.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// History store shared between the download relay and front ends.
pub type SharedHistory = Arc<tokio::sync::Mutex<HistoryStore>>;

/// Default history file: `<data dir>/vidgrab/download_history.json`.
#[must_use]
pub fn default_history_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidgrab")
        .join(HISTORY_FILE_NAME)
}

/// Persistent, bounded log of download attempts.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<HistoryRecord>,
    next_id: u64,
}

impl HistoryStore {
    /// Open the history at `path`. Never fails; see the module docs.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut records = load_records(&path);
        if records.len() > HISTORY_CAP {
            warn!(
                path = %path.display(),
                count = records.len(),
                "History exceeds cap, dropping oldest records"
            );
            records.truncate(HISTORY_CAP);
        }
        let next_id = records.iter().map(|r| r.id).max().map_or(1, |max| max + 1);

        info!(path = %path.display(), records = records.len(), "History loaded");
        Self {
            path,
            records,
            next_id,
        }
    }

    /// Open the history at [`default_history_path`].
    pub fn open_default() -> Self {
        Self::open(default_history_path())
    }

    /// Wrap the store for sharing across tasks.
    #[must_use]
    pub fn into_shared(self) -> SharedHistory {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// History file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record, assigning the next id and the current time.
    pub fn add(&mut self, entry: NewHistoryRecord) -> Persisted<HistoryRecord> {
        let record = HistoryRecord {
            id: self.next_id,
            url: entry.url,
            title: entry.title,
            platform: entry.platform,
            file_path: entry.file_path,
            thumbnail: entry.thumbnail,
            duration_seconds: entry.duration_seconds,
            quality: entry.quality,
            status: entry.status,
            downloaded_at: Local::now(),
        };
        self.next_id += 1;

        self.records.insert(0, record.clone());
        self.records.truncate(HISTORY_CAP);
        debug!(id = record.id, status = %record.status, "History record added");

        Persisted::from_save(record, self.save())
    }

    /// Up to `limit` records, most recent first.
    #[must_use]
    pub fn list(&self, limit: usize) -> &[HistoryRecord] {
        &self.records[..limit.min(self.records.len())]
    }

    /// All records, most recent first.
    #[must_use]
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Records whose title or platform contains `keyword` (case-insensitive).
    #[must_use]
    pub fn search(&self, keyword: &str) -> Vec<&HistoryRecord> {
        let keyword = keyword.to_lowercase();
        self.records
            .iter()
            .filter(|r| {
                r.title.to_lowercase().contains(&keyword)
                    || r.platform.to_lowercase().contains(&keyword)
            })
            .collect()
    }

    /// Record with the given id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Delete a record. The value is `false` when no record had that id.
    pub fn delete_by_id(&mut self, id: u64) -> Persisted<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            debug!(id, "No history record to delete");
            return Persisted::from_save(false, Ok(()));
        }
        info!(id, "History record deleted");
        Persisted::from_save(true, self.save())
    }

    /// Remove every record. The value is the number removed.
    ///
    /// Ids keep increasing afterwards.
    pub fn clear(&mut self) -> Persisted<usize> {
        let removed = self.records.len();
        self.records.clear();
        info!(removed, "History cleared");
        Persisted::from_save(removed, self.save())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn save(&self) -> Result<()> {
        self.write_file().map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to save history");
            Error::PersistenceDegraded {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn write_file(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.records)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

fn load_records(path: &Path) -> Vec<HistoryRecord> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No history file yet");
            return Vec::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read history, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str(&content) {
        Ok(records) => records,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt history file, starting empty");
            Vec::new()
        }
    }
}
