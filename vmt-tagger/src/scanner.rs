//! Media file selection
//!
//! Input files come from exactly one source: the failed records of an earlier
//! run's manifest, a single file, or a recursive scan of a root directory.
//! An `--only-ext` filter narrows whichever source was used.

use crate::artifacts::{load_failed_paths, manifest_path_for_rerun, ManifestError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vmt_common::config::ScanConfig;
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Extension of {path} is not configured (allowed: {allowed})")]
    UnsupportedExtension { path: PathBuf, allowed: String },

    #[error("No file extensions configured")]
    NoExtensions,

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Where the input list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Failed records of a manifest (or a run directory holding one)
    RerunFailed(PathBuf),
    SingleFile(PathBuf),
    Root(PathBuf),
}

/// Lowercased extension with its leading dot, or empty
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Recursive directory scanner
pub struct FileScanner {
    extensions: Vec<String>,
    ignore_substrings: Vec<String>,
    max_files: usize,
}

impl FileScanner {
    /// `extensions` must already be normalized (lowercase, dot-prefixed)
    pub fn new(extensions: Vec<String>, scan: &ScanConfig) -> Self {
        Self {
            extensions,
            ignore_substrings: scan
                .ignore_substrings
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            max_files: scan.max_files,
        }
    }

    /// Matching files under `root`, sorted by path and capped at `max_files` when non-zero
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut symlink_visited = HashSet::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| not_a_symlink_loop(entry, &mut symlink_visited));

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.accepts(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        files.sort();
        if self.max_files > 0 {
            files.truncate(self.max_files);
        }
        tracing::debug!(root = %root.display(), count = files.len(), "Scan complete");
        Ok(files)
    }

    fn accepts(&self, path: &Path) -> bool {
        if !self.extensions.contains(&dotted_extension(path)) {
            return false;
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        !self.ignore_substrings.iter().any(|s| name.contains(s.as_str()))
    }

    /// Resolve the input list for a run or an inspection
    pub fn select(&self, source: &FileSource, only_exts: &[String]) -> Result<Vec<PathBuf>, ScanError> {
        if self.extensions.is_empty() {
            return Err(ScanError::NoExtensions);
        }

        let files = match source {
            FileSource::RerunFailed(target) => {
                let manifest = manifest_path_for_rerun(target);
                let files = load_failed_paths(&manifest)?;
                if files.is_empty() {
                    tracing::info!(manifest = %manifest.display(), "No failed files found in manifest");
                }
                files
            }
            FileSource::SingleFile(path) => {
                if !path.is_file() {
                    return Err(ScanError::NotAFile(path.clone()));
                }
                if !self.extensions.contains(&dotted_extension(path)) {
                    return Err(ScanError::UnsupportedExtension {
                        path: path.clone(),
                        allowed: self.extensions.join(", "),
                    });
                }
                vec![path.clone()]
            }
            FileSource::Root(root) => self.scan(root)?,
        };

        if only_exts.is_empty() {
            return Ok(files);
        }
        Ok(files
            .into_iter()
            .filter(|path| only_exts.contains(&dotted_extension(path)))
            .collect())
    }
}

fn not_a_symlink_loop(entry: &DirEntry, visited: &mut HashSet<PathBuf>) -> bool {
    if entry.file_type().is_symlink() {
        if let Ok(canonical) = entry.path().canonicalize() {
            if !visited.insert(canonical) {
                tracing::warn!("Symlink loop detected: {}", entry.path().display());
                return false;
            }
        }
    }
    true
}
