//! Run artifacts
//!
//! Each tagging run gets a timestamped directory under the backup root
//! holding the outcome manifest (`run.jsonl`), a free-form run log
//! (`run.log`), metadata snapshots, original-file backups and downloaded
//! artwork. Test-mode and restore runs create no directory.

pub mod manifest;

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use manifest::{
    load_failed_paths, manifest_path_for_rerun, ManifestError, ManifestRecord, ManifestWriter,
    RecordStatus,
};

pub const MANIFEST_FILE: &str = "run.jsonl";
pub const RUN_LOG_FILE: &str = "run.log";

/// Paths of the current run's artifacts; all `None` when the run keeps none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunDirs {
    pub run_dir: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

impl RunDirs {
    pub fn none() -> Self {
        Self::default()
    }

    /// Create `<base>/<YYYYmmdd-HHMMSS>` for a run starting at `now`
    pub fn create(base_dir: &Path, now: DateTime<Local>) -> io::Result<Self> {
        let run_dir = base_dir.join(run_dir_name(now));
        std::fs::create_dir_all(&run_dir)?;
        tracing::info!(run_dir = %run_dir.display(), "Created run directory");
        Ok(Self {
            manifest_path: Some(run_dir.join(MANIFEST_FILE)),
            log_path: Some(run_dir.join(RUN_LOG_FILE)),
            run_dir: Some(run_dir),
        })
    }
}

pub fn run_dir_name(now: DateTime<Local>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

/// Flattened file name for a backup: path relative to `root` with separators as `__`
fn flattened_name(input: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|root| input.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .or_else(|| input.file_name().map(PathBuf::from))
        .unwrap_or_else(|| input.to_path_buf());
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("__")
}

/// `<dir>/<flattened>.ffmeta`
pub fn backup_metadata_path(dir: &Path, input: &Path, root: Option<&Path>) -> PathBuf {
    dir.join(format!("{}.ffmeta", flattened_name(input, root)))
}

/// `<dir>/<flattened><suffix>`, repeating the suffix until the name is free
pub fn backup_original_path(dir: &Path, input: &Path, root: Option<&Path>, suffix: &str) -> PathBuf {
    let mut name = format!("{}{}", flattened_name(input, root), suffix);
    while dir.join(&name).exists() {
        name.push_str(suffix);
    }
    dir.join(name)
}

/// Bytes available to unprivileged users on the filesystem holding `path`
#[cfg(unix)]
pub fn available_space(path: &Path) -> io::Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
    Ok((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64))
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free-space query not supported on this platform",
    ))
}

/// True when `dir` can hold `required` more bytes; an unknown answer counts as enough
pub fn has_sufficient_backup_space(dir: &Path, required: u64) -> bool {
    match available_space(dir) {
        Ok(free) => free >= required,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Cannot determine free space");
            true
        }
    }
}

/// Append-only plain-text run log
///
/// Cloneable handle; a disabled log swallows writes.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    path: Option<Arc<PathBuf>>,
    lock: Arc<Mutex<()>>,
}

impl RunLog {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(Arc::new(path.into())),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Append one line; failures are reported through tracing only
    pub fn append(&self, line: &str) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line.trim_end()));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Cannot append to run log");
        }
    }
}
