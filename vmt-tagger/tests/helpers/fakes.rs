//! In-memory collaborators

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vmt_common::config::TaggerConfig;
use vmt_tagger::catalog::{CatalogApi, CatalogError};
use vmt_tagger::inspect::{InspectError, MediaInspector};
use vmt_tagger::mapping::TransformRegistry;
use vmt_tagger::orchestrator::progress::status_line;
use vmt_tagger::orchestrator::{
    Collaborators, FileOutcome, Plans, ProgressReporter, RunArtifacts, RunOrchestrator,
    RunSettings, RunSummary,
};
use vmt_tagger::provider::NoopProvider;
use vmt_tagger::resolver::ResolverThresholds;
use vmt_tagger::writers::{MetadataSnapshotter, TagWriter, WriteOutcome, WriteRequest, WriterError};

/// Catalog knowing Heat (1995), id 949
///
/// Ronin (id 8195) is found by search but its details fail with 404, and any
/// search for "offline" fails with a network error.
#[derive(Default)]
pub struct FakeCatalog {
    pub requests: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, CatalogError> {
        self.requests.lock().unwrap().push(endpoint.to_string());
        let query = params
            .iter()
            .find(|(key, _)| *key == "query")
            .map(|(_, value)| value.to_lowercase())
            .unwrap_or_default();

        match endpoint {
            "/search/movie" | "/search/tv" if query.contains("offline") => {
                Err(CatalogError::NetworkError("connection reset by peer".to_string()))
            }
            "/search/movie" if query.contains("ronin") => Ok(json!({
                "results": [{
                    "id": 8195,
                    "title": "Ronin",
                    "release_date": "1998-09-25",
                    "vote_count": 2500,
                    "popularity": 20.1
                }]
            })),
            "/search/movie" if query.contains("heat") => Ok(json!({
                "results": [{
                    "id": 949,
                    "title": "Heat",
                    "release_date": "1995-12-15",
                    "vote_count": 6000,
                    "popularity": 40.5
                }]
            })),
            "/search/movie" | "/search/tv" => Ok(json!({ "results": [] })),
            "/movie/949" => Ok(json!({
                "id": 949,
                "title": "Heat",
                "release_date": "1995-12-15",
                "overview": "Obsessive master thief Neil McCauley leads a top-notch crew.",
                "genres": [{ "name": "Crime" }, { "name": "Drama" }],
                "tagline": "A Los Angeles crime saga",
                "imdb_id": "tt0113277"
            })),
            other => Err(CatalogError::ApiError(404, format!("unknown endpoint {}", other))),
        }
    }
}

/// Inspector reporting a file with no tags, no artwork and no DRM
#[derive(Default)]
pub struct FakeInspector {
    pub existing: HashMap<String, String>,
    pub drm: bool,
}

impl MediaInspector for FakeInspector {
    fn read_existing_tags(&self, _path: &Path) -> Result<HashMap<String, String>, InspectError> {
        Ok(self.existing.clone())
    }

    fn has_embedded_artwork(&self, _path: &Path) -> Result<bool, InspectError> {
        Ok(false)
    }

    fn has_drm(&self, _path: &Path) -> Result<bool, InspectError> {
        Ok(self.drm)
    }

    fn video_dimensions(&self, _path: &Path) -> Result<Option<(u32, u32)>, InspectError> {
        Ok(Some((1920, 1080)))
    }
}

/// Writer replaying scripted outcomes, then `Ok`
#[derive(Default)]
pub struct ScriptedWriter {
    script: Mutex<VecDeque<WriteOutcome>>,
    calls: AtomicUsize,
    written_keys: Mutex<Vec<Vec<String>>>,
}

impl ScriptedWriter {
    pub fn with_script(outcomes: Vec<WriteOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tag keys of every request, in call order
    pub fn written_keys(&self) -> Vec<Vec<String>> {
        self.written_keys.lock().unwrap().clone()
    }
}

impl TagWriter for ScriptedWriter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn write(&self, request: &WriteRequest<'_>) -> WriteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.written_keys
            .lock()
            .unwrap()
            .push(request.tags.keys().map(str::to_string).collect());
        self.script.lock().unwrap().pop_front().unwrap_or(WriteOutcome::Ok)
    }
}

/// Snapshotter recording snapshot targets and replaying restore outcomes
#[derive(Default)]
pub struct ScriptedSnapshotter {
    pub snapshots: Mutex<Vec<PathBuf>>,
    restores: Mutex<VecDeque<WriteOutcome>>,
}

impl ScriptedSnapshotter {
    pub fn with_restores(outcomes: Vec<WriteOutcome>) -> Self {
        Self {
            restores: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }
}

impl MetadataSnapshotter for ScriptedSnapshotter {
    fn snapshot(&self, _path: &Path, dest: &Path) -> Result<(), WriterError> {
        self.snapshots.lock().unwrap().push(dest.to_path_buf());
        Ok(())
    }

    fn restore(&self, _path: &Path, _snapshot: &Path) -> WriteOutcome {
        self.restores.lock().unwrap().pop_front().unwrap_or(WriteOutcome::Ok)
    }
}

/// Progress reporter capturing every line
#[derive(Default)]
pub struct RecordingProgress {
    pub lines: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<(PathBuf, FileOutcome)>>,
    pub deferred: Mutex<Vec<PathBuf>>,
}

impl RecordingProgress {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<(PathBuf, FileOutcome)> {
        self.finished.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn note(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn file_started(&self, index: usize, total: usize, path: &Path) {
        self.note(&format!("[{}/{}] {}", index, total, path.display()));
    }

    fn file_matched(&self, title: &str, _year: Option<&str>, tmdb_id: Option<u64>) {
        self.note(&format!("matched {} {:?}", title, tmdb_id));
    }

    fn file_finished(&self, path: &Path, outcome: &FileOutcome) {
        self.note(&status_line(outcome));
        self.finished.lock().unwrap().push((path.to_path_buf(), outcome.clone()));
    }

    fn file_deferred(&self, path: &Path, message: &str) {
        self.note(&format!("deferred {}", message));
        self.deferred.lock().unwrap().push(path.to_path_buf());
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.note(&format!(
            "done ok={} skipped={} failed={}",
            summary.ok, summary.skipped, summary.failed
        ));
    }
}

/// Orchestrator over the fakes with cover art off and no atom pass
pub fn build_orchestrator(
    settings: RunSettings,
    catalog: Arc<FakeCatalog>,
    inspector: Arc<FakeInspector>,
    writer: Arc<ScriptedWriter>,
    snapshotter: Arc<ScriptedSnapshotter>,
    progress: Arc<RecordingProgress>,
    artifacts: RunArtifacts,
) -> RunOrchestrator {
    let config = TaggerConfig::default();
    let registry = Arc::new(TransformRegistry::builtin());
    let plans = Plans::load(&config, &registry).unwrap();
    let collaborators = Collaborators {
        catalog: Some(catalog),
        provider: Arc::new(NoopProvider),
        inspector,
        container_writer: writer,
        atom_writer: None,
        snapshotter,
        progress,
    };
    RunOrchestrator::new(
        settings,
        ResolverThresholds::from(&config.tmdb),
        plans,
        registry,
        collaborators,
        artifacts,
    )
}
