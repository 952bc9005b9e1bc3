//! Per-file outcomes and run totals

use crate::artifacts::{ManifestRecord, RecordStatus};
use crate::catalog::CatalogError;
use crate::writers::WriterError;
use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;
use thiserror::Error;

/// Machine-readable reason codes recorded in the manifest
pub mod reason {
    pub const UPDATED: &str = "updated";
    pub const RESTORED: &str = "restored";
    pub const WRITE_DISABLED: &str = "write_disabled";
    pub const MISSING_FILE: &str = "missing_file";
    pub const NO_MATCH: &str = "no_match";
    pub const DRM: &str = "drm";
    pub const NO_TAGS: &str = "no_tags";
    pub const EXISTING_TAGS: &str = "existing_tags";
    pub const INSUFFICIENT_BACKUP_SPACE: &str = "insufficient_backup_space";
    pub const WRITER_FAILED: &str = "writer_failed";
    pub const RESTORE_FAILED: &str = "restore_failed";
    pub const RESOURCE_BUSY: &str = "resource_busy";
    /// Non-terminal: the file was locked and waits for the retry pass
    pub const DEFERRED_BUSY: &str = "deferred_busy";
}

/// Terminal result of processing one file
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub status: RecordStatus,
    pub reason: String,
    pub tmdb_id: Option<u64>,
    pub title: Option<String>,
}

impl FileOutcome {
    pub fn ok(reason: &str) -> Self {
        Self::new(RecordStatus::Ok, reason)
    }

    pub fn skipped(reason: &str) -> Self {
        Self::new(RecordStatus::Skipped, reason)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new(RecordStatus::Failed, reason)
    }

    fn new(status: RecordStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            tmdb_id: None,
            title: None,
        }
    }

    /// Attach the matched catalog entry
    pub fn with_match(mut self, matched: Option<&MatchInfo>) -> Self {
        if let Some(matched) = matched {
            self.tmdb_id = matched.tmdb_id;
            self.title = Some(matched.title.clone());
        }
        self
    }

    /// Manifest line for this outcome, stamped with the file's state when processing began
    pub fn to_record(&self, path: &Path, metadata: Option<&Metadata>) -> ManifestRecord {
        ManifestRecord {
            path: path.display().to_string(),
            status: self.status,
            reason: self.reason.clone(),
            tmdb_id: self.tmdb_id,
            title: self.title.clone(),
            mtime: metadata.and_then(mtime_seconds),
            size: metadata.map(Metadata::len),
        }
    }
}

/// Catalog entry a file was matched to (or the filename title for extras)
#[derive(Debug, Clone, PartialEq)]
pub struct MatchInfo {
    pub tmdb_id: Option<u64>,
    pub title: String,
}

fn mtime_seconds(metadata: &Metadata) -> Option<f64> {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs_f64())
}

/// Result of one attempt at a file
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Done(FileOutcome),
    /// A writer found the file locked; retried once at the end of the run
    Deferred { matched: Option<MatchInfo>, message: String },
}

/// Errors that end one file's processing as FAILED
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Writer(#[from] WriterError),
}

impl FileError {
    /// Manifest reason for this error
    pub fn reason(&self) -> String {
        match self {
            FileError::Catalog(CatalogError::ApiError(status, _)) => format!("tmdb_http_error: {}", status),
            other => format!("error: {}", other),
        }
    }
}

/// Run totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files that went through the end-of-run retry pass
    pub retried: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome.status {
            RecordStatus::Ok => self.ok += 1,
            RecordStatus::Skipped => self.skipped += 1,
            RecordStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.skipped + self.failed
    }

    /// 0 when nothing failed, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }
}
