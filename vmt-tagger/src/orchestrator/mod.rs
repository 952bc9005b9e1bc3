//! Tagging run orchestrator
//!
//! Drives every selected file through the tagging pipeline, one file at a
//! time, and appends one manifest line per attempt.
//!
//! # Per-file pipeline
//! stat → (restore) | extras short-circuit | DRM probe → resolve → details →
//! mapping (atom pass, container pass) → existing-tag filter → backups → write
//!
//! Each step lives in a `phase_*` module:
//! - **phase_resolve**: filename guess and catalog match
//! - **phase_mapping**: details fetch, plan evaluation, pass reconciliation
//! - **phase_write**: existing-tag filter, backups, writer calls
//! - **phase_restore**: snapshot restore (replaces the whole pipeline)
//!
//! # Deferred retry
//! A writer that finds the file locked returns `Busy`. The file is queued and
//! retried once after every other file; a second `Busy` fails it with
//! `resource_busy`. Every attempt gets a manifest line: the deferred one is
//! recorded as `skipped`/`deferred_busy`, which rerun selection ignores, and
//! the retry appends the file's final record. Only final records count
//! towards the run totals.
//!
//! Errors never cross the per-file boundary: anything a file raises becomes a
//! FAILED outcome and the run continues.
//!
//! Inspector, writer and snapshot calls run external tools; they go through
//! `spawn_blocking` so the runtime thread only awaits them.

mod phase_mapping;
mod phase_resolve;
mod phase_restore;
mod phase_write;

pub mod outcome;
pub mod progress;

use crate::artifacts::{ManifestWriter, RunDirs, RunLog};
use crate::catalog::{CatalogApi, ImageConfig};
use crate::inspect::{query_blocking, MediaInspector};
use crate::mapping::{MappingEngine, Plan, PlanError, TransformRegistry};
use crate::provider::CatalogProvider;
use crate::resolver::{is_extras_title, CandidateResolver, ResolverThresholds};
use crate::writers::{MetadataSnapshotter, TagWriter};
use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vmt_common::config::{TaggerConfig, TestMode};

pub use outcome::{reason, Attempt, FileError, FileOutcome, MatchInfo, RunSummary};
pub use phase_mapping::{filter_existing, reconcile_passes};
pub use progress::{ConsoleProgress, ProgressReporter};

/// Containers the atom writer can tag
const ATOM_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

/// Run-wide behavior switches, resolved from configuration and command line
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub write_enabled: bool,
    pub override_existing: bool,
    pub dry_run: bool,
    pub test_mode: Option<TestMode>,
    pub backup_original: bool,
    pub backup_suffix: String,
    pub check_backup_space: bool,
    pub skip_drm: bool,
    pub cover_art_enabled: bool,
    pub cover_art_size: String,
    pub strip_tokens: Vec<String>,
    pub prefer_year_from_filename: bool,
    pub allow_tv_fallback: bool,
    /// Backup names are relative to this directory
    pub root: Option<PathBuf>,
    /// Restore metadata from this snapshot directory instead of tagging
    pub restore_from: Option<PathBuf>,
}

impl RunSettings {
    pub fn from_config(config: &TaggerConfig) -> Self {
        let write = &config.write;
        Self {
            write_enabled: write.enabled,
            override_existing: write.override_existing,
            dry_run: write.dry_run,
            test_mode: write.test_mode,
            backup_original: write.backup_original,
            backup_suffix: write.backup_suffix.clone(),
            check_backup_space: write.check_backup_space,
            skip_drm: write.skip_drm,
            cover_art_enabled: write.cover_art_enabled,
            cover_art_size: write.cover_art_size.clone(),
            strip_tokens: config.matching.strip_tokens.clone(),
            prefer_year_from_filename: config.matching.prefer_year_from_filename,
            allow_tv_fallback: config.tmdb.allow_tv_fallback,
            root: None,
            restore_from: None,
        }
    }

    pub fn verbose(&self) -> bool {
        self.test_mode == Some(TestMode::Verbose)
    }

    /// Test mode and dry run leave media files untouched
    pub fn is_simulated(&self) -> bool {
        self.test_mode.is_some() || self.dry_run
    }
}

/// Built-in or configured plans, validated at startup
#[derive(Debug, Clone)]
pub struct Plans {
    pub movie: Plan,
    pub tv: Plan,
}

impl Plans {
    /// Load configured overrides or the built-in plans, then fill configured limits
    pub fn load(config: &TaggerConfig, registry: &TransformRegistry) -> Result<Self, PlanError> {
        let serialization = &config.serialization;
        let mut movie = match &serialization.movie_plan {
            Some(path) => Plan::load(path, registry)?,
            None => Plan::builtin_movie(registry)?,
        };
        let mut tv = match &serialization.tv_plan {
            Some(path) => Plan::load(path, registry)?,
            None => Plan::builtin_tv(registry)?,
        };
        for plan in [&mut movie, &mut tv] {
            plan.apply_defaults(serialization.max_overview_length, serialization.max_genres);
        }
        Ok(Self { movie, tv })
    }
}

/// Run directory, manifest and run log of one run
#[derive(Debug, Default)]
pub struct RunArtifacts {
    pub dirs: RunDirs,
    pub manifest: ManifestWriter,
    pub run_log: RunLog,
}

impl RunArtifacts {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_dirs(dirs: RunDirs) -> Self {
        Self {
            manifest: ManifestWriter::new(dirs.manifest_path.clone()),
            run_log: dirs.log_path.clone().map(RunLog::at).unwrap_or_default(),
            dirs,
        }
    }

    /// Test-mode and restore runs keep no artifacts; every other run gets a fresh run directory
    pub fn prepare(settings: &RunSettings, backup_dir: &Path, now: DateTime<Local>) -> std::io::Result<Self> {
        if settings.restore_from.is_some() || settings.test_mode.is_some() {
            return Ok(Self::none());
        }
        Ok(Self::from_dirs(RunDirs::create(backup_dir, now)?))
    }
}

/// External collaborators of a run
pub struct Collaborators {
    /// Absent for restore runs, which never consult the catalog
    pub catalog: Option<Arc<dyn CatalogApi>>,
    pub provider: Arc<dyn CatalogProvider>,
    pub inspector: Arc<dyn MediaInspector>,
    pub container_writer: Arc<dyn TagWriter>,
    /// Absent when the atom pass is disabled
    pub atom_writer: Option<Arc<dyn TagWriter>>,
    pub snapshotter: Arc<dyn MetadataSnapshotter>,
    pub progress: Arc<dyn ProgressReporter>,
}

struct CatalogLookup {
    catalog: Arc<dyn CatalogApi>,
    resolver: CandidateResolver,
}

pub struct RunOrchestrator {
    settings: RunSettings,
    plans: Plans,
    engine: MappingEngine,
    lookup: Option<CatalogLookup>,
    inspector: Arc<dyn MediaInspector>,
    container_writer: Arc<dyn TagWriter>,
    atom_writer: Option<Arc<dyn TagWriter>>,
    snapshotter: Arc<dyn MetadataSnapshotter>,
    progress: Arc<dyn ProgressReporter>,
    artifacts: RunArtifacts,
    image_config: ImageConfig,
    cover_art_enabled: bool,
}

impl RunOrchestrator {
    pub fn new(
        settings: RunSettings,
        thresholds: ResolverThresholds,
        plans: Plans,
        registry: Arc<TransformRegistry>,
        collaborators: Collaborators,
        artifacts: RunArtifacts,
    ) -> Self {
        let Collaborators {
            catalog,
            provider,
            inspector,
            container_writer,
            atom_writer,
            snapshotter,
            progress,
        } = collaborators;

        let lookup = catalog.map(|catalog| CatalogLookup {
            resolver: CandidateResolver::new(catalog.clone(), thresholds),
            catalog,
        });

        Self {
            cover_art_enabled: settings.cover_art_enabled,
            settings,
            plans,
            engine: MappingEngine::new(registry, provider),
            lookup,
            inspector,
            container_writer,
            atom_writer,
            snapshotter,
            progress,
            artifacts,
            image_config: ImageConfig::default(),
        }
    }

    pub fn artifacts(&self) -> &RunArtifacts {
        &self.artifacts
    }

    /// Process every file, then retry the deferred ones once
    pub async fn run(&mut self, files: &[PathBuf]) -> RunSummary {
        if let Some(mode) = self.settings.test_mode {
            let label = if mode == TestMode::Verbose { "verbose" } else { "basic" };
            self.progress
                .note(&format!("TEST MODE enabled ({}): no files will be modified.", label));
        }
        if !self.settings.write_enabled {
            self.progress
                .note("NOTE: write.enabled is false; will only fetch & print metadata.");
        }
        tracing::info!(
            files = files.len(),
            restore = self.settings.restore_from.is_some(),
            "Starting tagging run"
        );

        self.prepare_images().await;

        let mut summary = RunSummary::default();
        let mut deferred: Vec<&PathBuf> = Vec::new();
        let total = files.len();

        for (index, path) in files.iter().enumerate() {
            let (attempt, metadata) = self.process_file(path, index + 1, total).await;
            match attempt {
                Attempt::Done(outcome) => self.finish(path, metadata.as_ref(), &outcome, &mut summary),
                Attempt::Deferred { matched, message } => {
                    let pending = FileOutcome::skipped(reason::DEFERRED_BUSY).with_match(matched.as_ref());
                    self.append_record(path, metadata.as_ref(), &pending);
                    self.progress.file_deferred(path, &message);
                    self.artifacts.run_log.append(&format!(
                        "[deferred] {}\nreason: {}",
                        path.display(),
                        message
                    ));
                    deferred.push(path);
                }
            }
        }

        if !deferred.is_empty() {
            self.progress
                .note(&format!("\nRetrying {} deferred file(s)", deferred.len()));
            let retry_total = deferred.len();
            for (index, path) in deferred.into_iter().enumerate() {
                summary.retried += 1;
                let (attempt, metadata) = self.process_file(path, index + 1, retry_total).await;
                let outcome = match attempt {
                    Attempt::Done(outcome) => outcome,
                    Attempt::Deferred { matched, message } => {
                        tracing::warn!(path = %path.display(), %message, "Still busy after retry");
                        self.artifacts.run_log.append(&format!(
                            "[busy] {}\nerror: {}",
                            path.display(),
                            message
                        ));
                        FileOutcome::failed(reason::RESOURCE_BUSY).with_match(matched.as_ref())
                    }
                };
                self.finish(path, metadata.as_ref(), &outcome, &mut summary);
            }
        }

        tracing::info!(
            ok = summary.ok,
            skipped = summary.skipped,
            failed = summary.failed,
            retried = summary.retried,
            "Tagging run complete"
        );
        self.progress.run_finished(&summary);
        summary
    }

    /// Fetch the image configuration; cover art is turned off when it is unusable
    async fn prepare_images(&mut self) {
        if self.settings.restore_from.is_some() || !self.cover_art_enabled {
            return;
        }
        if !self.settings.write_enabled && !self.settings.verbose() {
            return;
        }
        let Some(lookup) = &self.lookup else {
            self.cover_art_enabled = false;
            return;
        };

        match lookup.catalog.configuration().await {
            Ok(payload) => {
                self.image_config = ImageConfig::from_configuration(&payload);
                if !self.image_config.is_usable() {
                    self.progress
                        .note("Cover art disabled: TMDb image configuration missing.");
                    self.cover_art_enabled = false;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot fetch image configuration; cover art disabled");
                self.cover_art_enabled = false;
            }
        }
    }

    /// One attempt at one file; the metadata is `None` when the file could not be stat'ed
    async fn process_file(&self, path: &Path, index: usize, total: usize) -> (Attempt, Option<Metadata>) {
        self.progress.file_started(index, total, path);

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                tracing::warn!(path = %path.display(), "File missing");
                return (Attempt::Done(FileOutcome::failed(reason::MISSING_FILE)), None);
            }
        };

        let attempt = match &self.settings.restore_from {
            Some(snapshot_dir) => self.phase_restore(path, snapshot_dir).await,
            None => match self.tag_file(path, &metadata).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Tagging failed");
                    self.artifacts
                        .run_log
                        .append(&format!("[error] {}\nerror: {}", path.display(), e));
                    Attempt::Done(FileOutcome::failed(e.reason()))
                }
            },
        };
        (attempt, Some(metadata))
    }

    async fn tag_file(&self, path: &Path, metadata: &Metadata) -> Result<Attempt, FileError> {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        if is_extras_title(&stem) {
            let mapped = self.extras_tags(path, &stem);
            return self.phase_write(path, metadata, mapped).await;
        }

        if self.settings.skip_drm {
            match query_blocking(&self.inspector, path, |inspector, p| inspector.has_drm(p)).await {
                Ok(true) => {
                    tracing::info!(path = %path.display(), "Protected content, skipping");
                    return Ok(Attempt::Done(FileOutcome::skipped(reason::DRM)));
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "DRM probe failed"),
            }
        }

        let Some(resolved) = self.phase_resolve(path, &stem).await? else {
            self.progress.note("  TMDb: no confident match found (skipping).");
            return Ok(Attempt::Done(FileOutcome::skipped(reason::NO_MATCH)));
        };

        let mapped = self.phase_mapping(path, &resolved).await?;
        self.phase_write(path, metadata, mapped).await
    }

    /// Record a finished file: manifest line, progress line, tally
    fn finish(&self, path: &Path, metadata: Option<&Metadata>, outcome: &FileOutcome, summary: &mut RunSummary) {
        self.append_record(path, metadata, outcome);
        self.progress.file_finished(path, outcome);
        summary.record(outcome);
    }

    fn append_record(&self, path: &Path, metadata: Option<&Metadata>, outcome: &FileOutcome) {
        if let Err(e) = self.artifacts.manifest.append(&outcome.to_record(path, metadata)) {
            tracing::warn!(path = %path.display(), error = %e, "Cannot append manifest record");
        }
    }

    fn atom_pass_enabled(&self, path: &Path) -> bool {
        self.atom_writer.is_some()
            && path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| ATOM_EXTENSIONS.contains(&ext.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = TaggerConfig::default();
        config.write.dry_run = true;
        config.tmdb.allow_tv_fallback = false;
        let settings = RunSettings::from_config(&config);
        assert!(settings.is_simulated());
        assert!(!settings.verbose());
        assert!(!settings.allow_tv_fallback);
        assert_eq!(settings.backup_suffix, ".bak");
    }

    #[test]
    fn test_plans_apply_configured_limits() {
        let mut config = TaggerConfig::default();
        config.serialization.max_overview_length = 120;
        let registry = TransformRegistry::builtin();
        let plans = Plans::load(&config, &registry).unwrap();
        let description = plans
            .movie
            .rules
            .iter()
            .find(|rule| rule.output_key == "description")
            .unwrap();
        assert_eq!(description.params["max_chars"], serde_json::json!(120));
    }

    #[test]
    fn test_artifacts_skip_run_dir_in_test_mode() {
        let base = tempfile::tempdir().unwrap();
        let mut settings = RunSettings::from_config(&TaggerConfig::default());
        settings.test_mode = Some(TestMode::Basic);
        let artifacts = RunArtifacts::prepare(&settings, base.path(), Local::now()).unwrap();
        assert!(artifacts.dirs.run_dir.is_none());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);

        settings.test_mode = None;
        let artifacts = RunArtifacts::prepare(&settings, base.path(), Local::now()).unwrap();
        assert!(artifacts.dirs.run_dir.is_some());
        assert!(artifacts.manifest.path().is_some());
        assert!(artifacts.run_log.path().is_some());
    }
}
