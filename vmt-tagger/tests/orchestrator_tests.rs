//! Run Orchestrator Tests
//!
//! Drives whole runs over fake collaborators: outcome per file, deferred
//! retry of busy files, manifest contents and restore mode.

#[allow(dead_code)]
mod helpers;

use chrono::Local;
use helpers::{build_orchestrator, FakeCatalog, FakeInspector, RecordingProgress, ScriptedSnapshotter, ScriptedWriter};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use vmt_common::config::{ScanConfig, TaggerConfig};
use vmt_tagger::artifacts::{RecordStatus, RunDirs};
use vmt_tagger::orchestrator::{reason, RunArtifacts, RunSettings, RunSummary};
use vmt_tagger::scanner::{FileScanner, FileSource};
use vmt_tagger::writers::WriteOutcome;

struct Harness {
    library: TempDir,
    runs: TempDir,
    catalog: Arc<FakeCatalog>,
    writer: Arc<ScriptedWriter>,
    snapshotter: Arc<ScriptedSnapshotter>,
    progress: Arc<RecordingProgress>,
}

impl Harness {
    fn new(writer: ScriptedWriter) -> Self {
        Self {
            library: TempDir::new().unwrap(),
            runs: TempDir::new().unwrap(),
            catalog: Arc::new(FakeCatalog::default()),
            writer: Arc::new(writer),
            snapshotter: Arc::new(ScriptedSnapshotter::default()),
            progress: Arc::new(RecordingProgress::default()),
        }
    }

    fn media(&self, name: &str) -> PathBuf {
        let path = self.library.path().join(name);
        std::fs::write(&path, b"not really a movie").unwrap();
        path
    }

    fn settings(&self) -> RunSettings {
        let mut settings = RunSettings::from_config(&TaggerConfig::default());
        settings.cover_art_enabled = false;
        settings.root = Some(self.library.path().to_path_buf());
        settings
    }

    async fn run(
        &self,
        settings: RunSettings,
        inspector: FakeInspector,
        files: &[PathBuf],
    ) -> (RunSummary, Option<PathBuf>) {
        let dirs = RunDirs::create(self.runs.path(), Local::now()).unwrap();
        let manifest = dirs.manifest_path.clone();
        let mut orchestrator = build_orchestrator(
            settings,
            self.catalog.clone(),
            Arc::new(inspector),
            self.writer.clone(),
            self.snapshotter.clone(),
            self.progress.clone(),
            RunArtifacts::from_dirs(dirs),
        );
        (orchestrator.run(files).await, manifest)
    }
}

fn manifest_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// TC-RUN-001: Busy on the first attempt, OK on the end-of-run retry
#[tokio::test]
async fn tc_run_001_busy_then_ok_is_updated() {
    // Given: a writer that reports the file locked exactly once
    let harness = Harness::new(ScriptedWriter::with_script(vec![WriteOutcome::Busy(
        "resource busy after 3 attempts".to_string(),
    )]));
    let heat = harness.media("Heat.1995.mp4");

    // When: the run processes the file
    let (summary, manifest) = harness
        .run(harness.settings(), FakeInspector::default(), &[heat.clone()])
        .await;

    // Then: one OK outcome after exactly two writer invocations
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.retried, 1);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(harness.writer.calls(), 2);
    assert_eq!(harness.progress.deferred.lock().unwrap().len(), 1);

    // And: one record per attempt, the deferred one non-failed
    let records = manifest_records(&manifest.unwrap());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["status"], "skipped");
    assert_eq!(records[0]["reason"], reason::DEFERRED_BUSY);
    assert_eq!(records[0]["tmdb_id"], 949);
    assert_eq!(records[1]["status"], "ok");
    assert_eq!(records[1]["reason"], reason::UPDATED);
    assert_eq!(records[1]["tmdb_id"], 949);
    assert_eq!(records[1]["title"], "Heat");
    assert_eq!(records[1]["size"], 18);
}

/// TC-RUN-002: Busy on both attempts is terminal
#[tokio::test]
async fn tc_run_002_busy_twice_fails_resource_busy() {
    let harness = Harness::new(ScriptedWriter::with_script(vec![
        WriteOutcome::Busy("locked".to_string()),
        WriteOutcome::Busy("locked".to_string()),
    ]));
    let heat = harness.media("Heat.1995.mp4");

    let (summary, manifest) = harness
        .run(harness.settings(), FakeInspector::default(), &[heat.clone()])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(harness.writer.calls(), 2);

    let manifest = manifest.unwrap();
    let records = manifest_records(&manifest);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["reason"], reason::DEFERRED_BUSY);
    assert_eq!(records[1]["status"], "failed");
    assert_eq!(records[1]["reason"], reason::RESOURCE_BUSY);
    assert_eq!(records[1]["tmdb_id"], 949);

    // And: a rerun picks the file up exactly once
    let scanner = FileScanner::new(vec![".mp4".to_string()], &ScanConfig::default());
    let rerun = scanner.select(&FileSource::RerunFailed(manifest), &[]).unwrap();
    assert_eq!(rerun, vec![heat]);
}

/// TC-RUN-003: Deferred files are retried after every other file, in order
#[tokio::test]
async fn tc_run_003_retry_pass_runs_after_first_pass() {
    let harness = Harness::new(ScriptedWriter::with_script(vec![WriteOutcome::Busy("locked".to_string())]));
    let first = harness.media("Heat.1995.mp4");
    let missing = harness.library.path().join("Gone.mp4");

    let (summary, manifest) = harness
        .run(harness.settings(), FakeInspector::default(), &[first.clone(), missing.clone()])
        .await;

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.failed, 1);
    let finished: Vec<PathBuf> = harness.progress.finished().into_iter().map(|(path, _)| path).collect();
    assert_eq!(finished, vec![missing, first]);

    let records = manifest_records(&manifest.unwrap());
    let reasons: Vec<&str> = records.iter().map(|r| r["reason"].as_str().unwrap()).collect();
    assert_eq!(reasons, vec![reason::DEFERRED_BUSY, reason::MISSING_FILE, reason::UPDATED]);
    assert_eq!(records[1]["size"], Value::Null);
}

/// TC-RUN-004: Skips are not failures
#[tokio::test]
async fn tc_run_004_no_match_and_drm_are_skipped() {
    let harness = Harness::new(ScriptedWriter::default());
    let unknown = harness.media("Completely Unknown Picture.mp4");

    let (summary, _) = harness
        .run(harness.settings(), FakeInspector::default(), &[unknown])
        .await;
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(harness.progress.finished()[0].1.reason, reason::NO_MATCH);

    let protected = harness.media("Heat.1995.m4v");
    let inspector = FakeInspector {
        drm: true,
        ..FakeInspector::default()
    };
    let (summary, _) = harness.run(harness.settings(), inspector, &[protected]).await;
    assert_eq!(summary.skipped, 1);
    assert_eq!(harness.progress.finished()[1].1.reason, reason::DRM);
    assert_eq!(harness.writer.calls(), 0);
}

/// TC-RUN-005: Extras get a title-only write without any catalog lookup
#[tokio::test]
async fn tc_run_005_extras_are_tagged_title_only() {
    let harness = Harness::new(ScriptedWriter::default());
    let extras = harness.media("Heat - Behind the Scenes.mp4");

    let (summary, _) = harness
        .run(harness.settings(), FakeInspector::default(), &[extras])
        .await;

    assert_eq!(summary.ok, 1);
    assert_eq!(harness.catalog.request_count(), 0);
    assert_eq!(harness.writer.written_keys(), vec![vec!["title".to_string()]]);
}

/// TC-RUN-006: Disabled writes still match, but touch nothing
#[tokio::test]
async fn tc_run_006_write_disabled() {
    let harness = Harness::new(ScriptedWriter::default());
    let heat = harness.media("Heat.1995.mp4");
    let mut settings = harness.settings();
    settings.write_enabled = false;

    let (summary, _) = harness.run(settings, FakeInspector::default(), &[heat]).await;

    assert_eq!(summary.ok, 1);
    let (_, outcome) = &harness.progress.finished()[0];
    assert_eq!(outcome.reason, reason::WRITE_DISABLED);
    assert_eq!(outcome.tmdb_id, Some(949));
    assert_eq!(harness.writer.calls(), 0);
    assert!(harness.snapshotter.snapshots.lock().unwrap().is_empty());
}

/// TC-RUN-007: Planned tags already present are dropped before writing
#[tokio::test]
async fn tc_run_007_existing_tags_filtered() {
    let harness = Harness::new(ScriptedWriter::default());
    let heat = harness.media("Heat.1995.mp4");
    let inspector = FakeInspector {
        existing: [("title".to_string(), "Heat".to_string())].into_iter().collect(),
        ..FakeInspector::default()
    };

    let (summary, _) = harness.run(harness.settings(), inspector, &[heat]).await;

    assert_eq!(summary.ok, 1);
    let written = harness.writer.written_keys();
    assert_eq!(written.len(), 1);
    assert!(!written[0].contains(&"title".to_string()));
    assert!(written[0].contains(&"description".to_string()));
}

/// TC-RUN-008: A metadata snapshot is taken into the run directory before writing
#[tokio::test]
async fn tc_run_008_snapshot_before_write() {
    let harness = Harness::new(ScriptedWriter::default());
    std::fs::create_dir_all(harness.library.path().join("Crime")).unwrap();
    let heat = harness.media("Crime/Heat.1995.mp4");

    let (summary, manifest) = harness
        .run(harness.settings(), FakeInspector::default(), &[heat])
        .await;

    assert_eq!(summary.ok, 1);
    let snapshots = harness.snapshotter.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.len(), 1);
    let run_dir = manifest.unwrap().parent().unwrap().to_path_buf();
    assert_eq!(snapshots[0], run_dir.join("Crime__Heat.1995.mp4.ffmeta"));
}

/// TC-RUN-009: A failing writer fails the file without aborting the run
#[tokio::test]
async fn tc_run_009_writer_error_is_per_file() {
    let harness = Harness::new(ScriptedWriter::with_script(vec![WriteOutcome::Error(
        "ffmpeg exited with 1".to_string(),
    )]));
    let first = harness.media("Heat.1995.mp4");
    let second = harness.media("Heat.1995.m4v");

    let (summary, _) = harness
        .run(harness.settings(), FakeInspector::default(), &[first, second])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.ok, 1);
    let outcomes = harness.progress.finished();
    assert_eq!(outcomes[0].1.status, RecordStatus::Failed);
    assert_eq!(outcomes[0].1.reason, reason::WRITER_FAILED);
    assert_eq!(outcomes[1].1.status, RecordStatus::Ok);
}

/// TC-RUN-010: Restore mode bypasses the catalog and retries busy restores
#[tokio::test]
async fn tc_run_010_restore_mode() {
    let mut harness = Harness::new(ScriptedWriter::default());
    harness.snapshotter = Arc::new(ScriptedSnapshotter::with_restores(vec![
        WriteOutcome::Busy("locked".to_string()),
        WriteOutcome::Ok,
    ]));
    let heat = harness.media("Heat.1995.mp4");
    let mut settings = harness.settings();
    settings.restore_from = Some(harness.runs.path().to_path_buf());

    let (summary, _) = harness.run(settings, FakeInspector::default(), &[heat]).await;

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.retried, 1);
    assert_eq!(harness.progress.finished()[0].1.reason, reason::RESTORED);
    assert_eq!(harness.catalog.request_count(), 0);
    assert_eq!(harness.writer.calls(), 0);
}

/// TC-RUN-011: A catalog HTTP error fails only that file
#[tokio::test]
async fn tc_run_011_catalog_http_error_is_per_file() {
    // Given: Ronin resolves but its details endpoint answers 404
    let harness = Harness::new(ScriptedWriter::default());
    let ronin = harness.media("Ronin.1998.mp4");
    let heat = harness.media("Heat.1995.mp4");

    // When: both files are processed
    let (summary, manifest) = harness
        .run(harness.settings(), FakeInspector::default(), &[ronin, heat])
        .await;

    // Then: Ronin fails with the HTTP status, Heat is still tagged
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(harness.writer.calls(), 1);

    let records = manifest_records(&manifest.unwrap());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["status"], "failed");
    assert_eq!(records[0]["reason"], "tmdb_http_error: 404");
    assert_eq!(records[1]["status"], "ok");
    assert_eq!(records[1]["reason"], reason::UPDATED);
}

/// TC-RUN-012: A network error during search fails only that file
#[tokio::test]
async fn tc_run_012_network_error_is_per_file() {
    let harness = Harness::new(ScriptedWriter::default());
    let offline = harness.media("Offline Picture.mp4");
    let heat = harness.media("Heat.1995.mp4");

    let (summary, manifest) = harness
        .run(harness.settings(), FakeInspector::default(), &[offline, heat])
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.exit_code(), 1);

    let records = manifest_records(&manifest.unwrap());
    assert_eq!(records[0]["status"], "failed");
    assert_eq!(records[0]["reason"], "error: Network error: connection reset by peer");
    assert_eq!(records[1]["reason"], reason::UPDATED);
}

/// TC-RUN-013: A file larger than the free space is skipped before any backup
#[cfg(unix)]
#[tokio::test]
async fn tc_run_013_insufficient_backup_space() {
    // Given: a sparse 8 TiB file and original backups enabled
    let harness = Harness::new(ScriptedWriter::default());
    let heat = harness.library.path().join("Heat.1995.mp4");
    std::fs::File::create(&heat).unwrap().set_len(1 << 43).unwrap();
    let mut settings = harness.settings();
    settings.backup_original = true;
    settings.check_backup_space = true;

    // When: the file is processed
    let (summary, manifest) = harness.run(settings, FakeInspector::default(), &[heat]).await;

    // Then: skipped, nothing snapshotted, copied or written
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(harness.writer.calls(), 0);
    assert!(harness.snapshotter.snapshots.lock().unwrap().is_empty());

    let manifest = manifest.unwrap();
    let records = manifest_records(&manifest);
    assert_eq!(records[0]["reason"], reason::INSUFFICIENT_BACKUP_SPACE);
    let run_dir = manifest.parent().unwrap();
    assert!(!run_dir.join("Heat.1995.mp4.bak").exists());
}
