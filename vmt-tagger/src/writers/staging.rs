//! Staged output files
//!
//! Tools write into `<stem>.<label>.XXXXXX<ext>` in the target's directory.
//! Committing renames the staged file over the target (or copies it when
//! atomic replacement is off). A target held open elsewhere makes the rename
//! fail with "resource busy"; that is retried a bounded number of times with a
//! growing pause before giving up with [`ReplaceError::Busy`].
//!
//! Dropping an uncommitted `StagedOutput` deletes the staged file.

use std::io;
use std::path::Path;
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("Resource busy: {path} (gave up after {attempts} attempts)")]
    Busy { path: String, attempts: u32 },

    #[error("Cannot replace target: {0}")]
    Io(#[from] io::Error),
}

/// Bounded retry of the final replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacePolicy {
    pub attempts: u32,
    /// Pause after attempt `n` (0-based) is `base_delay * (n + 1)`
    pub base_delay: Duration,
}

impl Default for ReplacePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Whether an I/O error means another process holds the file
pub fn is_busy(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(nix::errno::Errno::EBUSY as i32)
    }
    #[cfg(not(unix))]
    {
        // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
}

/// A temporary output file next to its target
#[derive(Debug)]
pub struct StagedOutput {
    temp: TempPath,
}

impl StagedOutput {
    /// Create an empty staging file for `target`; `label` is `tagtmp` or `restore`
    pub fn new(target: &Path, label: &str) -> io::Result<Self> {
        let dir = target
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = tempfile::Builder::new()
            .prefix(&staging_prefix(target, label))
            .suffix(&extension_suffix(target))
            .tempfile_in(dir)?;
        Ok(Self {
            temp: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Move the staged file over `target`
    pub fn commit(self, target: &Path, atomic: bool, policy: ReplacePolicy) -> Result<(), ReplaceError> {
        let mut temp = self.temp;
        let attempts = policy.attempts.max(1);

        for attempt in 0..attempts {
            let result = if atomic {
                match temp.persist(target) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        temp = err.path;
                        Err(err.error)
                    }
                }
            } else {
                std::fs::copy(&temp, target).map(|_| ())
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if is_busy(&e) => {
                    tracing::debug!(
                        target = %target.display(),
                        attempt = attempt + 1,
                        "Target busy during replacement"
                    );
                    if attempt + 1 < attempts {
                        std::thread::sleep(policy.base_delay * (attempt + 1));
                    }
                }
                Err(e) => return Err(ReplaceError::Io(e)),
            }
        }

        Err(ReplaceError::Busy {
            path: target.display().to_string(),
            attempts,
        })
    }
}

fn staging_prefix(target: &Path, label: &str) -> String {
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.{}.", stem, label)
}

fn extension_suffix(target: &Path) -> String {
    target
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Staging name shown by simulated runs, which never create the file
pub fn simulated_staging_path(target: &Path, label: &str) -> std::path::PathBuf {
    target.with_file_name(format!(
        "{}{}",
        staging_prefix(target, label).trim_end_matches('.'),
        extension_suffix(target)
    ))
}
