//! Media inspection via ffprobe
//!
//! One ffprobe call per file per run: the parsed report is cached and every
//! query (existing tags, attached picture, DRM, frame size) reads from it.
//! The cache entry is dropped after the file is rewritten.
//!
//! Also hosts the `inspect` command: a report of files missing required tags.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Codec tags of protected (FairPlay) or encrypted (CENC) tracks
const PROTECTED_CODEC_TAGS: &[&str] = &["drms", "drmi", "drma", "drmv", "encv", "enca", "p608"];

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Failed to execute ffprobe: {0}")]
    ExecutionError(String),

    #[error("ffprobe failed for {path}: {stderr}")]
    ProbeFailed { path: String, stderr: String },

    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),
}

/// Read-only view of a media file's container properties
///
/// Implementations cache per path for the duration of a run.
pub trait MediaInspector: Send + Sync {
    /// Container tags with lowercased keys
    fn read_existing_tags(&self, path: &Path) -> Result<HashMap<String, String>, InspectError>;

    fn has_embedded_artwork(&self, path: &Path) -> Result<bool, InspectError>;

    fn has_drm(&self, path: &Path) -> Result<bool, InspectError>;

    /// Width and height of the first real video stream
    fn video_dimensions(&self, path: &Path) -> Result<Option<(u32, u32)>, InspectError>;

    /// Forget cached results for a file that has just been rewritten
    fn invalidate(&self, _path: &Path) {}
}

/// Run one inspector query on the blocking pool
///
/// An uncached query waits on an ffprobe subprocess.
pub async fn query_blocking<T, F>(inspector: &Arc<dyn MediaInspector>, path: &Path, query: F) -> Result<T, InspectError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MediaInspector, &Path) -> Result<T, InspectError> + Send + 'static,
{
    let inspector = inspector.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || query(inspector.as_ref(), &path))
        .await
        .map_err(|e| InspectError::ExecutionError(format!("Task join error: {}", e)))?
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
}

/// Facts extracted from one ffprobe run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub tags: HashMap<String, String>,
    pub has_attached_picture: bool,
    pub has_drm: bool,
    pub dimensions: Option<(u32, u32)>,
}

impl ProbeReport {
    /// Build a report from ffprobe's `-show_format -show_streams` JSON
    pub fn from_json(text: &str) -> Result<Self, InspectError> {
        let output: ProbeOutput =
            serde_json::from_str(text).map_err(|e| InspectError::ParseError(e.to_string()))?;

        let tags = output
            .format
            .tags
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key.to_lowercase(), text)
            })
            .collect();

        let is_attached_pic =
            |stream: &ProbeStream| stream.disposition.get("attached_pic").copied().unwrap_or(0) == 1;

        let has_attached_picture = output.streams.iter().any(is_attached_pic);
        let has_drm = output.streams.iter().any(|stream| {
            stream
                .codec_tag_string
                .as_deref()
                .is_some_and(|tag| PROTECTED_CODEC_TAGS.contains(&tag.to_ascii_lowercase().as_str()))
        });
        let dimensions = output
            .streams
            .iter()
            .filter(|stream| stream.codec_type.as_deref() == Some("video") && !is_attached_pic(stream))
            .find_map(|stream| match (stream.width, stream.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
                _ => None,
            });

        Ok(Self {
            tags,
            has_attached_picture,
            has_drm,
            dimensions,
        })
    }
}

/// ffprobe next to the configured ffmpeg binary, else `ffprobe` from PATH
pub fn resolve_ffprobe_path(ffmpeg_path: &str) -> String {
    let candidate = Path::new(ffmpeg_path);
    if candidate.file_name().is_some_and(|name| name == "ffmpeg") {
        return candidate.with_file_name("ffprobe").display().to_string();
    }
    "ffprobe".to_string()
}

/// Cached ffprobe-backed inspector
pub struct FfprobeInspector {
    ffprobe_path: String,
    cache: Mutex<HashMap<PathBuf, Arc<ProbeReport>>>,
}

impl FfprobeInspector {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn report(&self, path: &Path) -> Result<Arc<ProbeReport>, InspectError> {
        if let Some(report) = self.cache_lock().get(path) {
            return Ok(report.clone());
        }

        tracing::debug!(path = %path.display(), "Probing media file");
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| InspectError::ExecutionError(e.to_string()))?;

        if !output.status.success() {
            return Err(InspectError::ProbeFailed {
                path: path.display().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = if stdout.trim().is_empty() { "{}" } else { stdout.as_ref() };
        let report = Arc::new(ProbeReport::from_json(text)?);
        self.cache_lock().insert(path.to_path_buf(), report.clone());
        Ok(report)
    }

    fn cache_lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<ProbeReport>>> {
        // A poisoned cache only ever holds complete entries
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediaInspector for FfprobeInspector {
    fn read_existing_tags(&self, path: &Path) -> Result<HashMap<String, String>, InspectError> {
        Ok(self.report(path)?.tags.clone())
    }

    fn has_embedded_artwork(&self, path: &Path) -> Result<bool, InspectError> {
        Ok(self.report(path)?.has_attached_picture)
    }

    fn has_drm(&self, path: &Path) -> Result<bool, InspectError> {
        Ok(self.report(path)?.has_drm)
    }

    fn video_dimensions(&self, path: &Path) -> Result<Option<(u32, u32)>, InspectError> {
        Ok(self.report(path)?.dimensions)
    }

    fn invalidate(&self, path: &Path) {
        self.cache_lock().remove(path);
    }
}

/// Required keys (lowercased) that are absent or blank in `tags`
pub fn find_missing_tags(tags: &HashMap<String, String>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|key| key.trim().to_lowercase())
        .filter(|key| !key.is_empty())
        .filter(|key| tags.get(key).map_or(true, |value| value.trim().is_empty()))
        .collect()
}

/// Totals of an inspection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InspectReport {
    pub total_files: usize,
    pub files_with_missing: usize,
    pub total_missing_fields: usize,
    pub errors: usize,
}

/// Check every file for missing required tags (and artwork), writing one line per file
pub fn run_inspection<W: Write>(
    files: &[PathBuf],
    inspector: &dyn MediaInspector,
    required: &[String],
    check_artwork: bool,
    out: &mut W,
) -> std::io::Result<InspectReport> {
    let mut report = InspectReport {
        total_files: files.len(),
        ..InspectReport::default()
    };

    for path in files {
        let missing = inspector.read_existing_tags(path).and_then(|tags| {
            let mut missing = find_missing_tags(&tags, required);
            if check_artwork && !inspector.has_embedded_artwork(path)? && !missing.iter().any(|k| k == "artwork") {
                missing.push("artwork".to_string());
            }
            Ok(missing)
        });

        match missing {
            Err(e) => {
                report.errors += 1;
                tracing::warn!(path = %path.display(), error = %e, "Cannot read metadata");
                writeln!(out, "ERROR reading metadata: {} ({})", path.display(), e)?;
            }
            Ok(missing) if missing.is_empty() => {
                writeln!(out, "OK: {}", path.display())?;
            }
            Ok(missing) => {
                report.files_with_missing += 1;
                report.total_missing_fields += missing.len();
                writeln!(out, "Missing tags: {} - {}", missing.join(", "), path.display())?;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_tag_string": "avc1", "width": 1920, "height": 800,
             "disposition": {"default": 1, "attached_pic": 0}},
            {"codec_type": "audio", "codec_tag_string": "mp4a", "disposition": {"default": 1}},
            {"codec_type": "video", "codec_tag_string": "[0][0][0][0]", "width": 500, "height": 750,
             "disposition": {"attached_pic": 1}}
        ],
        "format": {"tags": {"TITLE": "The Matrix", "date": "1999", "track": 1}}
    }"#;

    struct MapInspector {
        tags: HashMap<String, String>,
        artwork: bool,
    }

    impl MediaInspector for MapInspector {
        fn read_existing_tags(&self, _path: &Path) -> Result<HashMap<String, String>, InspectError> {
            Ok(self.tags.clone())
        }
        fn has_embedded_artwork(&self, _path: &Path) -> Result<bool, InspectError> {
            Ok(self.artwork)
        }
        fn has_drm(&self, _path: &Path) -> Result<bool, InspectError> {
            Ok(false)
        }
        fn video_dimensions(&self, _path: &Path) -> Result<Option<(u32, u32)>, InspectError> {
            Ok(None)
        }
    }

    #[test]
    fn test_probe_report_parsing() {
        let report = ProbeReport::from_json(PROBE_JSON).unwrap();
        assert_eq!(report.tags.get("title").map(String::as_str), Some("The Matrix"));
        assert_eq!(report.tags.get("track").map(String::as_str), Some("1"));
        assert!(report.has_attached_picture);
        assert!(!report.has_drm);
        assert_eq!(report.dimensions, Some((1920, 800)));
    }

    #[test]
    fn test_probe_report_detects_protected_tracks() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_tag_string": "drmi", "width": 640, "height": 480}]}"#;
        let report = ProbeReport::from_json(json).unwrap();
        assert!(report.has_drm);
        assert!(report.tags.is_empty());
        assert!(!report.has_attached_picture);
    }

    #[test]
    fn test_probe_report_rejects_garbage() {
        assert!(matches!(ProbeReport::from_json("not json"), Err(InspectError::ParseError(_))));
    }

    #[test]
    fn test_resolve_ffprobe_path() {
        assert_eq!(resolve_ffprobe_path("/opt/ff/bin/ffmpeg"), "/opt/ff/bin/ffprobe");
        assert_eq!(resolve_ffprobe_path("ffmpeg"), "ffprobe");
        assert_eq!(resolve_ffprobe_path("/usr/local/bin/ffmpeg-6"), "ffprobe");
    }

    #[test]
    fn test_missing_binary_is_execution_error() {
        let inspector = FfprobeInspector::new("/nonexistent/ffprobe-binary");
        assert!(matches!(
            inspector.read_existing_tags(Path::new("/tmp/x.mp4")),
            Err(InspectError::ExecutionError(_))
        ));
    }

    #[tokio::test]
    async fn test_query_blocking_reads_through_inspector() {
        let inspector: Arc<dyn MediaInspector> = Arc::new(MapInspector {
            tags: [("title".to_string(), "Heat".to_string())].into_iter().collect(),
            artwork: true,
        });
        let path = Path::new("/m/Heat.mp4");
        let tags = query_blocking(&inspector, path, |i, p| i.read_existing_tags(p)).await.unwrap();
        assert_eq!(tags.get("title").map(String::as_str), Some("Heat"));
        assert!(query_blocking(&inspector, path, |i, p| i.has_embedded_artwork(p)).await.unwrap());

        let missing: Arc<dyn MediaInspector> = Arc::new(FfprobeInspector::new("/nonexistent/ffprobe-binary"));
        assert!(matches!(
            query_blocking(&missing, path, |i, p| i.has_drm(p)).await,
            Err(InspectError::ExecutionError(_))
        ));
    }

    #[test]
    fn test_find_missing_tags() {
        let tags: HashMap<String, String> = [("title", "X"), ("genre", "  ")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let required: Vec<String> = ["Title", "genre", "date", " "].iter().map(|s| s.to_string()).collect();
        assert_eq!(find_missing_tags(&tags, &required), vec!["genre", "date"]);
    }

    #[test]
    fn test_run_inspection_report() {
        let inspector = MapInspector {
            tags: [("title".to_string(), "X".to_string())].into_iter().collect(),
            artwork: false,
        };
        let files = vec![PathBuf::from("/m/a.mp4"), PathBuf::from("/m/b.mp4")];
        let required = vec!["title".to_string(), "date".to_string()];
        let mut out = Vec::new();
        let report = run_inspection(&files, &inspector, &required, true, &mut out).unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.files_with_missing, 2);
        assert_eq!(report.total_missing_fields, 4);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Missing tags: date, artwork - /m/a.mp4"));
    }
}
