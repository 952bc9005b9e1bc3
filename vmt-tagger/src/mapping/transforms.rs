//! Transform registry
//!
//! Every transform a plan may name is registered here once, at startup. Plans
//! are validated against the registry when loaded, so an unknown name is a
//! plan error rather than a silent gap at evaluation time.
//!
//! Pure transforms are plain functions of the extracted source values and the
//! rule parameters. A single-source rule passes its value as `inputs[0]`; a
//! multi-source rule passes one input per source, in order. Three transforms
//! need context and are dispatched by the engine instead:
//! - `infer_hd_from_probe` reads frame dimensions from the media inspector
//! - `download_tmdb_image_to_file` and `choose_and_download_artwork` delegate to the provider

use super::genres::normalize_genres;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Rule parameters as written in the plan
pub type TransformParams = Map<String, Value>;

/// Signature of a pure transform
pub type PureTransform = fn(&[Value], &TransformParams) -> Result<Value, TransformError>;

/// Transform failures; the engine logs them and treats the rule as empty
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("missing parameter '{0}'")]
    MissingParam(&'static str),

    #[error("invalid parameter '{0}': {1}")]
    InvalidParam(&'static str, String),
}

/// How a registered transform is executed
#[derive(Clone, Copy)]
pub enum TransformHandler {
    Pure(PureTransform),
    /// HD flag from probed frame dimensions
    ProbeHd,
    /// Download the single image path in `inputs[0]`
    DownloadImage,
    /// Pick the first usable image path among all inputs, then download it
    ChooseAndDownloadArtwork,
}

impl std::fmt::Debug for TransformHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformHandler::Pure(_) => f.write_str("Pure"),
            TransformHandler::ProbeHd => f.write_str("ProbeHd"),
            TransformHandler::DownloadImage => f.write_str("DownloadImage"),
            TransformHandler::ChooseAndDownloadArtwork => f.write_str("ChooseAndDownloadArtwork"),
        }
    }
}

/// Name → handler table
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    handlers: HashMap<String, TransformHandler>,
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in transform
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let pure: &[(&str, PureTransform)] = &[
            ("year_from_date", year_from_date),
            ("truncate", truncate),
            ("first_nonempty_then_truncate", first_nonempty_then_truncate),
            ("limit_list", limit_list),
            ("dedupe", dedupe),
            ("pick_crew_names_by_job", pick_crew_names_by_job),
            ("pick_crew_names_by_jobs", pick_crew_names_by_jobs),
            ("pick_cast_names_by_order", pick_cast_names_by_order),
            ("first", first),
            ("compose_comment", compose_comment),
            ("tmdb_genres_to_apple_genres", tmdb_genres_to_apple_genres),
            ("to_string", to_string),
            ("to_int", to_int),
            ("compose_grouping", compose_grouping),
            ("compose_copyright", compose_copyright),
        ];
        for (name, func) in pure {
            registry.register(name, TransformHandler::Pure(*func));
        }
        registry.register("infer_hd_from_probe", TransformHandler::ProbeHd);
        registry.register("download_tmdb_image_to_file", TransformHandler::DownloadImage);
        registry.register(
            "choose_and_download_artwork",
            TransformHandler::ChooseAndDownloadArtwork,
        );
        registry
    }

    pub fn register(&mut self, name: &str, handler: TransformHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<TransformHandler> {
        self.handlers.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

// ============================================================================
// Value helpers
// ============================================================================

static LEADING_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{4})").expect("static regex"));
static YEAR_OR_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(?:-\d{2}(?:-\d{2})?)?$").expect("static regex"));

/// Collapse whitespace runs and trim
pub fn norm_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of a scalar value; `None` for null, arrays and objects
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Non-blank, whitespace-normalized text of a scalar
fn nonblank_text(value: &Value) -> Option<String> {
    scalar_text(value)
        .map(|t| norm_space(&t))
        .filter(|t| !t.is_empty())
}

/// Non-blank strings of a list input (a lone scalar counts as a one-item list)
fn text_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(nonblank_text).collect(),
        other => nonblank_text(other).into_iter().collect(),
    }
}

fn input(inputs: &[Value], index: usize) -> &Value {
    inputs.get(index).unwrap_or(&Value::Null)
}

fn dedupe_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn cap(items: Vec<String>, max_items: usize) -> Vec<String> {
    if max_items > 0 {
        items.into_iter().take(max_items).collect()
    } else {
        items
    }
}

fn list_value(items: Vec<String>) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        Value::Array(items.into_iter().map(Value::String).collect())
    }
}

fn text_value(text: Option<String>) -> Value {
    text.map(Value::String).unwrap_or(Value::Null)
}

fn param_usize(params: &TransformParams, name: &'static str) -> Result<Option<usize>, TransformError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| Some(v as usize))
            .ok_or_else(|| TransformError::InvalidParam(name, n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| TransformError::InvalidParam(name, s.clone())),
        Some(other) => Err(TransformError::InvalidParam(name, other.to_string())),
    }
}

fn param_usize_or(params: &TransformParams, name: &'static str, default: usize) -> Result<usize, TransformError> {
    Ok(param_usize(params, name)?.unwrap_or(default))
}

fn param_str<'a>(params: &'a TransformParams, name: &'static str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

fn param_bool_or(params: &TransformParams, name: &'static str, default: bool) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// Truncate to `max_chars` characters, ending in an ellipsis when shortened
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let head: String = trimmed.chars().take(max_chars - 1).collect();
    format!("{}…", head.trim_end())
}

// ============================================================================
// Pure transforms
// ============================================================================

/// `2008-08-15` → `2008`, from the first non-blank input
fn year_from_date(inputs: &[Value], _params: &TransformParams) -> Result<Value, TransformError> {
    let year = inputs
        .iter()
        .find_map(nonblank_text)
        .and_then(|date| LEADING_YEAR.captures(&date).map(|caps| caps[1].to_string()));
    Ok(text_value(year))
}

fn required_max_chars(params: &TransformParams) -> Result<usize, TransformError> {
    let max_chars = param_usize(params, "max_chars")?.ok_or(TransformError::MissingParam("max_chars"))?;
    if max_chars == 0 {
        return Err(TransformError::InvalidParam("max_chars", "0".to_string()));
    }
    Ok(max_chars)
}

fn truncate(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let max_chars = required_max_chars(params)?;
    let text = scalar_text(input(inputs, 0)).filter(|t| !t.trim().is_empty());
    Ok(text_value(text.map(|t| truncate_text(&t, max_chars))))
}

fn first_nonempty_then_truncate(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let max_chars = required_max_chars(params)?;
    let text = inputs.iter().find_map(nonblank_text);
    Ok(text_value(text.map(|t| truncate_text(&t, max_chars))))
}

fn limit_list(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let max_items = param_usize_or(params, "max_items", 0)?;
    Ok(list_value(cap(text_items(input(inputs, 0)), max_items)))
}

fn dedupe(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let max_items = param_usize_or(params, "max_items", 0)?;
    Ok(list_value(cap(dedupe_preserve_order(text_items(input(inputs, 0))), max_items)))
}

fn crew_names_for_job(crew: &[Value], job: &str) -> Vec<String> {
    crew.iter()
        .filter(|person| person.get("job").and_then(Value::as_str) == Some(job))
        .filter_map(|person| person.get("name").and_then(nonblank_text))
        .collect()
}

fn pick_crew_names_by_job(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let job = param_str(params, "job").ok_or(TransformError::MissingParam("job"))?;
    let max_items = param_usize_or(params, "max_items", 3)?;
    let Some(crew) = input(inputs, 0).as_array() else {
        return Ok(Value::Null);
    };
    let names = dedupe_preserve_order(crew_names_for_job(crew, job));
    Ok(list_value(cap(names, max_items)))
}

fn pick_crew_names_by_jobs(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let jobs: Vec<String> = match params.get("jobs") {
        Some(value) => text_items(value),
        None => return Err(TransformError::MissingParam("jobs")),
    };
    let max_items = param_usize_or(params, "max_items", 3)?;
    let Some(crew) = input(inputs, 0).as_array() else {
        return Ok(Value::Null);
    };
    let names: Vec<String> = jobs
        .iter()
        .flat_map(|job| crew_names_for_job(crew, job))
        .collect();
    Ok(list_value(cap(dedupe_preserve_order(names), max_items)))
}

/// Top-billed cast by ascending `order`; entries without a numeric order are skipped
fn pick_cast_names_by_order(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let max_items = param_usize_or(params, "max_items", 10)?;
    let Some(cast) = input(inputs, 0).as_array() else {
        return Ok(Value::Null);
    };
    let mut ordered: Vec<(i64, String)> = cast
        .iter()
        .filter_map(|person| {
            let order = match person.get("order")? {
                Value::Number(n) => n.as_i64()?,
                Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            let name = person.get("name").and_then(nonblank_text)?;
            Some((order, name))
        })
        .collect();
    ordered.sort_by_key(|(order, _)| *order);
    let names = dedupe_preserve_order(ordered.into_iter().map(|(_, name)| name).collect());
    Ok(list_value(cap(names, max_items)))
}

fn first(inputs: &[Value], _params: &TransformParams) -> Result<Value, TransformError> {
    Ok(text_value(text_items(input(inputs, 0)).into_iter().next()))
}

/// `tagline | TMDb:<id> | IMDb:<imdb id>` from (tagline, imdb_id, catalog id)
fn compose_comment(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let include_ids = param_bool_or(params, "include_ids", true);
    let mut parts: Vec<String> = Vec::new();
    if let Some(tagline) = nonblank_text(input(inputs, 0)) {
        parts.push(tagline);
    }
    if include_ids {
        if let Some(id) = nonblank_text(input(inputs, 2)).filter(|id| id != "0") {
            parts.push(format!("TMDb:{}", id));
        }
        if let Some(imdb) = nonblank_text(input(inputs, 1)) {
            parts.push(format!("IMDb:{}", imdb));
        }
    }
    Ok(text_value((!parts.is_empty()).then(|| parts.join(" | "))))
}

fn tmdb_genres_to_apple_genres(inputs: &[Value], params: &TransformParams) -> Result<Value, TransformError> {
    let max_genres = param_usize_or(params, "max_genres", 2)?;
    let genres = text_items(input(inputs, 0));
    Ok(list_value(normalize_genres(&genres, max_genres)))
}

fn to_string(inputs: &[Value], _params: &TransformParams) -> Result<Value, TransformError> {
    Ok(text_value(scalar_text(input(inputs, 0))))
}

fn to_int(inputs: &[Value], _params: &TransformParams) -> Result<Value, TransformError> {
    let value = match input(inputs, 0) {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    Ok(value.map(Value::from).unwrap_or(Value::Null))
}

/// `<collection> | lang=<language>` from (collection name, original language)
fn compose_grouping(inputs: &[Value], _params: &TransformParams) -> Result<Value, TransformError> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(collection) = nonblank_text(input(inputs, 0)) {
        parts.push(collection);
    }
    if let Some(language) = nonblank_text(input(inputs, 1)) {
        parts.push(format!("lang={}", language));
    }
    Ok(text_value((!parts.is_empty()).then(|| parts.join(" | "))))
}

/// `© <year> <first company>` from (company names, release year or date)
///
/// The second input is an exact four-digit year or an ISO date (`YYYY-MM-DD`,
/// `YYYY-MM`) whose year is used, so plans can pass `release_date` directly.
/// Anything else yields no copyright.
fn compose_copyright(inputs: &[Value], _params: &TransformParams) -> Result<Value, TransformError> {
    let Some(company) = text_items(input(inputs, 0)).into_iter().next() else {
        return Ok(Value::Null);
    };
    let year = nonblank_text(input(inputs, 1))
        .and_then(|text| YEAR_OR_DATE.captures(&text).map(|caps| caps[1].to_string()));
    Ok(text_value(year.map(|year| format!("© {} {}", year, company))))
}

/// HD flag from dimensions: 1 when the larger side is at least 1280 pixels
pub fn infer_hd_from_dimensions(dimensions: Option<(u32, u32)>) -> u8 {
    match dimensions {
        Some((width, height)) if width > 0 && height > 0 => u8::from(width.max(height) >= 1280),
        _ => 0,
    }
}

/// Candidate image paths across inputs, flattening lists
pub fn image_candidates(inputs: &[Value]) -> Vec<String> {
    inputs.iter().flat_map(text_items).collect()
}
