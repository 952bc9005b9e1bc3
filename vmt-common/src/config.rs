//! Layered configuration
//!
//! Configuration is resolved from explicit layers, lowest priority first:
//! 1. Compiled defaults (`TaggerConfig::default()`)
//! 2. TOML files (`/etc/vmt/config.toml`, then the user config dir, or one explicit file)
//! 3. Command-line overrides
//!
//! Every layer above the defaults is a [`ConfigLayer`]: a partial document whose
//! fields are all optional. Layers are folded onto the defaults with the pure
//! function [`merge_layer`], so precedence never depends on runtime dictionary
//! overlays.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Test mode: inspect and report without touching any file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// Progress lines only
    Basic,
    /// Progress lines plus guesses, payload summaries and tag previews
    Verbose,
}

impl std::str::FromStr for TestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(TestMode::Basic),
            "verbose" => Ok(TestMode::Verbose),
            other => Err(Error::InvalidInput(format!(
                "unknown test mode '{}' (expected basic or verbose)",
                other
            ))),
        }
    }
}

/// Tool used for the iTunes-style atom pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataTool {
    /// Run the atom pass through AtomicParsley
    #[serde(alias = "mp4tags")]
    Atomicparsley,
    /// Only the container (ffmpeg) pass is written
    Ffmpeg,
}

/// Catalog service settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TmdbConfig {
    pub api_key_env: String,
    pub api_key: String,
    pub language: String,
    pub include_adult: bool,
    pub min_score: f64,
    pub fallback_min_score: f64,
    pub fallback_min_votes: u64,
    /// Minimum score difference before text score alone decides movie vs. series
    pub preference_score_gap: f64,
    /// Repeat a year-filtered search without the year when it finds nothing
    pub retry_search_without_year: bool,
    pub request_delay_seconds: f64,
    pub allow_tv_fallback: bool,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key_env: "TMDB_API_KEY".to_string(),
            api_key: String::new(),
            language: "en-US".to_string(),
            include_adult: false,
            min_score: 2.0,
            fallback_min_score: 1.5,
            fallback_min_votes: 10,
            preference_score_gap: 0.5,
            retry_search_without_year: false,
            request_delay_seconds: 0.25,
            allow_tv_fallback: true,
            base_url: "https://api.themoviedb.org/3".to_string(),
            timeout_seconds: 20,
        }
    }
}

impl TmdbConfig {
    /// Resolve the API key: explicit config value first, then the named env var
    ///
    /// Returns `None` when neither source holds a non-blank key.
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.trim().to_string());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

/// Directory scanning settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    pub ignore_substrings: Vec<String>,
    /// 0 means unlimited
    pub max_files: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec![
                ".mp4".to_string(),
                ".m4v".to_string(),
                ".mov".to_string(),
                ".mkv".to_string(),
            ],
            ignore_substrings: vec!["sample".to_string(), "trailer".to_string()],
            max_files: 0,
        }
    }
}

/// Filename matching settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatchingConfig {
    pub strip_tokens: Vec<String>,
    pub prefer_year_from_filename: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let strip_tokens = [
            "1080p", "720p", "2160p", "480p", "x264", "x265", "h264", "hevc", "bluray", "brrip",
            "bdrip", "webrip", "web-dl", "hdrip", "dvdrip", "dts", "aac", "ac3", "yify", "rarbg",
        ];
        Self {
            strip_tokens: strip_tokens.iter().map(|t| t.to_string()).collect(),
            prefer_year_from_filename: true,
        }
    }
}

/// Tag writing settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WriteConfig {
    pub enabled: bool,
    pub dry_run: bool,
    pub override_existing: bool,
    pub backup_original: bool,
    pub backup_dir: PathBuf,
    pub backup_suffix: String,
    pub cover_art_enabled: bool,
    pub cover_art_size: String,
    pub ffmpeg_path: String,
    pub atomicparsley_path: String,
    pub metadata_tool: MetadataTool,
    pub rdns_namespace: String,
    pub atomic_replace: bool,
    pub skip_drm: bool,
    pub check_backup_space: bool,
    pub test_mode: Option<TestMode>,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_run: false,
            override_existing: false,
            backup_original: false,
            backup_dir: PathBuf::from("runs"),
            backup_suffix: ".bak".to_string(),
            cover_art_enabled: true,
            cover_art_size: "w500".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            atomicparsley_path: "AtomicParsley".to_string(),
            metadata_tool: MetadataTool::Atomicparsley,
            rdns_namespace: "local.tmdb".to_string(),
            atomic_replace: true,
            skip_drm: true,
            check_backup_space: true,
            test_mode: None,
        }
    }
}

/// Plan and value serialization settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SerializationConfig {
    pub max_overview_length: usize,
    pub max_genres: usize,
    /// Override for the built-in movie plan
    pub movie_plan: Option<PathBuf>,
    /// Override for the built-in TV plan
    pub tv_plan: Option<PathBuf>,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            max_overview_length: 500,
            max_genres: 2,
            movie_plan: None,
            tv_plan: None,
        }
    }
}

/// Missing-tag inspection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InspectConfig {
    pub required_tags: Vec<String>,
    pub check_artwork: bool,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            required_tags: ["title", "date", "genre", "description", "synopsis", "director"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            check_artwork: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TaggerConfig {
    pub tmdb: TmdbConfig,
    pub scan: ScanConfig,
    pub matching: MatchingConfig,
    pub write: WriteConfig,
    pub serialization: SerializationConfig,
    pub inspect: InspectConfig,
    pub logging: LoggingConfig,
}

impl TaggerConfig {
    /// Configured extensions, lowercased with a leading dot
    pub fn normalized_extensions(&self) -> Vec<String> {
        normalize_extensions(&self.scan.extensions)
    }

    /// Reject configurations no run can start with
    pub fn validate(&self) -> Result<()> {
        if self.normalized_extensions().is_empty() {
            return Err(Error::Config(
                "No file extensions configured. Add scan.extensions in config.".to_string(),
            ));
        }
        if self.tmdb.min_score < 0.0 || self.tmdb.fallback_min_score < 0.0 {
            return Err(Error::Config("tmdb score thresholds must be >= 0".to_string()));
        }
        if self.tmdb.request_delay_seconds < 0.0 {
            return Err(Error::Config(
                "tmdb.request_delay_seconds must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lowercase extensions and ensure a leading dot, dropping blanks and duplicates
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in extensions {
        let trimmed = ext.trim().to_ascii_lowercase();
        if trimmed.is_empty() || trimmed == "." {
            continue;
        }
        let normalized = if trimmed.starts_with('.') {
            trimmed
        } else {
            format!(".{}", trimmed)
        };
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

// ============================================================================
// Partial layers
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbLayer {
    pub api_key_env: Option<String>,
    pub api_key: Option<String>,
    pub language: Option<String>,
    pub include_adult: Option<bool>,
    pub min_score: Option<f64>,
    pub fallback_min_score: Option<f64>,
    pub fallback_min_votes: Option<u64>,
    pub preference_score_gap: Option<f64>,
    pub retry_search_without_year: Option<bool>,
    pub request_delay_seconds: Option<f64>,
    pub allow_tv_fallback: Option<bool>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanLayer {
    pub extensions: Option<Vec<String>>,
    pub ignore_substrings: Option<Vec<String>>,
    pub max_files: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MatchingLayer {
    pub strip_tokens: Option<Vec<String>>,
    pub prefer_year_from_filename: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WriteLayer {
    pub enabled: Option<bool>,
    pub dry_run: Option<bool>,
    pub override_existing: Option<bool>,
    pub backup_original: Option<bool>,
    pub backup_dir: Option<PathBuf>,
    pub backup_suffix: Option<String>,
    pub cover_art_enabled: Option<bool>,
    pub cover_art_size: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub atomicparsley_path: Option<String>,
    pub metadata_tool: Option<MetadataTool>,
    pub rdns_namespace: Option<String>,
    pub atomic_replace: Option<bool>,
    pub skip_drm: Option<bool>,
    pub check_backup_space: Option<bool>,
    pub test_mode: Option<TestMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SerializationLayer {
    pub max_overview_length: Option<usize>,
    pub max_genres: Option<usize>,
    pub movie_plan: Option<PathBuf>,
    pub tv_plan: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InspectLayer {
    pub required_tags: Option<Vec<String>>,
    pub check_artwork: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingLayer {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

/// One partial configuration layer (a TOML file or a set of CLI flags)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub tmdb: TmdbLayer,
    pub scan: ScanLayer,
    pub matching: MatchingLayer,
    pub write: WriteLayer,
    pub serialization: SerializationLayer,
    pub inspect: InspectLayer,
    pub logging: LoggingLayer,
}

macro_rules! overlay {
    ($base:expr, $layer:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $layer.$field {
                $base.$field = value;
            }
        )*
    };
}

macro_rules! overlay_optional {
    ($base:expr, $layer:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $layer.$field {
                $base.$field = Some(value);
            }
        )*
    };
}

/// Fold one layer onto a resolved configuration
///
/// Only fields the layer sets are replaced; everything else is carried over
/// from `base` unchanged.
pub fn merge_layer(base: TaggerConfig, layer: ConfigLayer) -> TaggerConfig {
    let mut merged = base;

    let tmdb = layer.tmdb;
    overlay!(merged.tmdb, tmdb, [
        api_key_env,
        api_key,
        language,
        include_adult,
        min_score,
        fallback_min_score,
        fallback_min_votes,
        preference_score_gap,
        retry_search_without_year,
        request_delay_seconds,
        allow_tv_fallback,
        base_url,
        timeout_seconds,
    ]);

    let scan = layer.scan;
    overlay!(merged.scan, scan, [extensions, ignore_substrings, max_files]);

    let matching = layer.matching;
    overlay!(merged.matching, matching, [strip_tokens, prefer_year_from_filename]);

    let write = layer.write;
    overlay!(merged.write, write, [
        enabled,
        dry_run,
        override_existing,
        backup_original,
        backup_dir,
        backup_suffix,
        cover_art_enabled,
        cover_art_size,
        ffmpeg_path,
        atomicparsley_path,
        metadata_tool,
        rdns_namespace,
        atomic_replace,
        skip_drm,
        check_backup_space,
    ]);
    overlay_optional!(merged.write, write, [test_mode]);

    let serialization = layer.serialization;
    overlay!(merged.serialization, serialization, [max_overview_length, max_genres]);
    overlay_optional!(merged.serialization, serialization, [movie_plan, tv_plan]);

    let inspect = layer.inspect;
    overlay!(merged.inspect, inspect, [required_tags, check_artwork]);

    let logging = layer.logging;
    overlay!(merged.logging, logging, [level]);
    overlay_optional!(merged.logging, logging, [file]);

    merged
}

/// Parse one TOML layer from disk
pub fn load_layer(path: &Path) -> Result<ConfigLayer> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    parse_layer(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Parse a TOML layer from a string
pub fn parse_layer(content: &str) -> std::result::Result<ConfigLayer, toml::de::Error> {
    toml::from_str(content)
}

/// Default configuration files, lowest priority first
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if cfg!(unix) {
        paths.push(PathBuf::from("/etc/vmt/config.toml"));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("vmt").join("config.toml"));
    }
    paths
}

/// Resolve defaults plus file layers
///
/// With an explicit path, only that file is read and it must exist. Otherwise
/// each default path that exists is applied in order; missing defaults are
/// not an error.
pub fn load_config(explicit: Option<&Path>) -> Result<TaggerConfig> {
    let mut config = TaggerConfig::default();

    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "Loading config layer");
        return Ok(merge_layer(config, load_layer(path)?));
    }

    for path in default_config_paths() {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "Config layer absent, skipping");
            continue;
        }
        tracing::debug!(path = %path.display(), "Loading config layer");
        config = merge_layer(config, load_layer(&path)?);
    }

    Ok(config)
}
