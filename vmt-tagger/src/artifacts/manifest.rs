//! Outcome manifest (JSON Lines)
//!
//! One record per file outcome, appended and flushed as soon as the outcome
//! is known. Records are never rewritten; a rerun appends new ones. The rerun
//! selector reads the file back and keeps the paths whose status is `failed`.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize manifest record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Skipped,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Ok => "ok",
            RecordStatus::Skipped => "skipped",
            RecordStatus::Failed => "failed",
        }
    }
}

/// One manifest line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub path: String,
    pub status: RecordStatus,
    pub reason: String,
    pub tmdb_id: Option<u64>,
    pub title: Option<String>,
    /// Modification time, seconds since the Unix epoch
    pub mtime: Option<f64>,
    pub size: Option<u64>,
}

/// Append-only manifest writer; disabled when the run keeps no artifacts
#[derive(Debug, Default)]
pub struct ManifestWriter {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl ManifestWriter {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append and flush one record
    pub fn append(&self, record: &ManifestRecord) -> Result<(), ManifestError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let io_err = |source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(())
    }
}

/// A run directory means its `run.jsonl`; anything else is taken as the manifest itself
pub fn manifest_path_for_rerun(target: &Path) -> PathBuf {
    if target.is_dir() {
        target.join(super::MANIFEST_FILE)
    } else {
        target.to_path_buf()
    }
}

#[derive(Deserialize)]
struct RecordFields {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Paths of `failed` records, in manifest order
///
/// Blank and malformed lines are skipped. A missing manifest yields an empty
/// list with a warning.
pub fn load_failed_paths(manifest: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let file = match std::fs::File::open(manifest) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %manifest.display(), "Run manifest not found");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ManifestError::Io {
                path: manifest.display().to_string(),
                source,
            })
        }
    };

    let io_error = |source: std::io::Error| ManifestError::Io {
        path: manifest.display().to_string(),
        source,
    };
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut failed = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(io_error)? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Lines are bytes: a torn tail from an interrupted run may not be UTF-8
        let Ok(record) = serde_json::from_slice::<RecordFields>(&line) else {
            tracing::debug!(line = %String::from_utf8_lossy(&line), "Ignoring malformed manifest line");
            continue;
        };
        if record.status.as_deref() != Some("failed") {
            continue;
        }
        if let Some(path) = record.path.filter(|p| !p.trim().is_empty()) {
            failed.push(PathBuf::from(path));
        }
    }
    Ok(failed)
}
