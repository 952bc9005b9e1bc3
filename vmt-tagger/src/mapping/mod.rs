//! Mapping engine
//!
//! Evaluates a [`Plan`] against catalog payloads for one file and one writer
//! pass. Payloads are fetched once per file through the provider; the plan is
//! then evaluated once per pass over the same payloads.
//!
//! # Rule evaluation
//! 1. Extract one value per source (missing payloads extract as null)
//! 2. Apply the transform, or take the first non-empty value when none is named
//! 3. Substitute the literal fallback if the result is empty
//! 4. Normalize: lists become trimmed non-empty strings, booleans `"1"`/`"0"`
//! 5. Within a pass the first rule producing a key wins
//!
//! A failing or unknown transform makes that rule empty; it never fails the file.

pub mod genres;
pub mod itunmovi;
pub mod jsonpath;
pub mod plan;
pub mod transforms;

use crate::catalog::{ImageConfig, MediaKind};
use crate::inspect::{query_blocking, MediaInspector};
use crate::provider::{CatalogProvider, PayloadMap};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub use genres::normalize_genres;
pub use itunmovi::{build_itunmovi_xml, merge_people, ITUNMOVI_KEY, PEOPLE_KEYS};
pub use plan::{Plan, PlanError, Rule, Source, WriterPass, WriterTarget};
pub use transforms::{TransformHandler, TransformRegistry};

/// Output key that carries the cover art file instead of a tag value
pub const ARTWORK_KEY: &str = "artwork";

/// A resolved tag value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Text(String),
    List(Vec<String>),
}

impl TagValue {
    /// Value as written by single-valued tag writers
    pub fn joined(&self, separator: &str) -> String {
        match self {
            TagValue::Text(text) => text.clone(),
            TagValue::List(items) => items.join(separator),
        }
    }

    pub fn items(&self) -> Vec<String> {
        match self {
            TagValue::Text(text) => vec![text.clone()],
            TagValue::List(items) => items.clone(),
        }
    }
}

/// Insertion-ordered tag map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, TagValue)>,
}

impl TagSet {
    /// Insert unless the key is already present; returns whether it was inserted
    pub fn insert_if_absent(&mut self, key: &str, value: TagValue) -> bool {
        if self.contains(key) {
            return false;
        }
        self.entries.push((key.to_string(), value));
        true
    }

    /// Insert, replacing any existing value in place
    pub fn set(&mut self, key: &str, value: TagValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn retain<F: FnMut(&str, &TagValue) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tags and optional cover art produced by one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanResult {
    pub tags: TagSet,
    pub artwork: Option<PathBuf>,
}

impl PlanResult {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.artwork.is_none()
    }
}

/// Everything a plan evaluation may consult for one file
///
/// Language, adult-content filtering and request pacing belong to the catalog
/// client, so they are not repeated here.
#[derive(Clone)]
pub struct MappingContext {
    pub content_id: u64,
    pub media_kind: MediaKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub image_config: ImageConfig,
    pub artwork_size: String,
    pub run_dir: Option<PathBuf>,
    pub inspector: Option<Arc<dyn MediaInspector>>,
    pub input_path: PathBuf,
    pub dry_run: bool,
    pub test_mode: bool,
    pub allow_artwork_download: bool,
}

impl std::fmt::Debug for MappingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingContext")
            .field("content_id", &self.content_id)
            .field("media_kind", &self.media_kind)
            .field("season", &self.season)
            .field("episode", &self.episode)
            .field("input_path", &self.input_path)
            .field("run_dir", &self.run_dir)
            .finish_non_exhaustive()
    }
}

enum RuleOutput {
    Value(Value),
    File(PathBuf),
}

/// Empty means null, blank text, an empty list or an empty object
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Convert a rule result into a tag value
pub fn normalize_value(value: &Value) -> Option<TagValue> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::Array(items) => {
            let cleaned: Vec<String> = items
                .iter()
                .filter_map(transforms::scalar_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (!cleaned.is_empty()).then_some(TagValue::List(cleaned))
        }
        Value::Bool(b) => Some(TagValue::Text(if *b { "1" } else { "0" }.to_string())),
        other => transforms::scalar_text(other)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(TagValue::Text),
    }
}

pub struct MappingEngine {
    registry: Arc<TransformRegistry>,
    provider: Arc<dyn CatalogProvider>,
}

impl MappingEngine {
    pub fn new(registry: Arc<TransformRegistry>, provider: Arc<dyn CatalogProvider>) -> Self {
        Self { registry, provider }
    }

    /// Fetch every endpoint the plan references, once
    pub async fn fetch_payloads(
        &self,
        plan: &Plan,
        ctx: &MappingContext,
        base_payload: &Value,
        base_endpoint: &str,
    ) -> PayloadMap {
        self.provider
            .fetch_payloads(plan, ctx, base_payload, base_endpoint)
            .await
    }

    /// Fetch payloads and evaluate a single pass
    pub async fn build_tags(
        &self,
        plan: &Plan,
        ctx: &MappingContext,
        base_payload: &Value,
        base_endpoint: &str,
        pass: WriterPass,
    ) -> PlanResult {
        let payloads = self.fetch_payloads(plan, ctx, base_payload, base_endpoint).await;
        self.evaluate(plan, ctx, &payloads, pass).await
    }

    /// Evaluate the rules allowed in `pass` against already-fetched payloads
    pub async fn evaluate(
        &self,
        plan: &Plan,
        ctx: &MappingContext,
        payloads: &PayloadMap,
        pass: WriterPass,
    ) -> PlanResult {
        let mut result = PlanResult::default();

        for rule in plan.rules.iter().filter(|rule| pass.allows(rule.writer)) {
            let key = rule.output_key.trim();
            let inputs: Vec<Value> = rule
                .sources
                .iter()
                .map(|source| {
                    payloads
                        .get(&source.endpoint)
                        .and_then(|payload| jsonpath::extract(payload, &source.path))
                        .unwrap_or(Value::Null)
                })
                .collect();

            let output = match self.apply_transform(rule, &inputs, ctx).await {
                RuleOutput::Value(value) if is_empty_value(&value) => rule
                    .fallback
                    .clone()
                    .filter(|fallback| !is_empty_value(fallback))
                    .map(RuleOutput::Value),
                other => Some(other),
            };

            let Some(output) = output else {
                if key == "director" {
                    tracing::warn!(
                        path = %ctx.input_path.display(),
                        "Director not found in credits payload"
                    );
                }
                continue;
            };

            match output {
                RuleOutput::File(path) if key == ARTWORK_KEY => {
                    if result.artwork.is_none() {
                        result.artwork = Some(path);
                    }
                }
                RuleOutput::Value(_) if key == ARTWORK_KEY => {
                    tracing::debug!(path = %ctx.input_path.display(), "Artwork rule produced no file");
                }
                RuleOutput::File(path) => {
                    result
                        .tags
                        .insert_if_absent(key, TagValue::Text(path.display().to_string()));
                }
                RuleOutput::Value(value) => {
                    if let Some(normalized) = normalize_value(&value) {
                        result.tags.insert_if_absent(key, normalized);
                    }
                }
            }
        }

        result
    }

    async fn apply_transform(&self, rule: &Rule, inputs: &[Value], ctx: &MappingContext) -> RuleOutput {
        let Some(name) = rule.transform.as_deref() else {
            let first = inputs
                .iter()
                .find(|value| !is_empty_value(value))
                .cloned()
                .unwrap_or(Value::Null);
            return RuleOutput::Value(first);
        };

        let Some(handler) = self.registry.get(name) else {
            tracing::warn!(transform = name, key = %rule.output_key, "Unknown transform");
            return RuleOutput::Value(Value::Null);
        };

        match handler {
            TransformHandler::Pure(func) => match func(inputs, &rule.params) {
                Ok(value) => RuleOutput::Value(value),
                Err(e) => {
                    tracing::warn!(
                        transform = name,
                        key = %rule.output_key,
                        error = %e,
                        "Transform failed"
                    );
                    RuleOutput::Value(Value::Null)
                }
            },
            TransformHandler::ProbeHd => {
                let dimensions = match &ctx.inspector {
                    Some(inspector) => match query_blocking(inspector, &ctx.input_path, |inspector, p| {
                        inspector.video_dimensions(p)
                    })
                    .await
                    {
                        Ok(dimensions) => dimensions,
                        Err(e) => {
                            tracing::debug!(error = %e, "Probe for dimensions failed");
                            None
                        }
                    },
                    None => None,
                };
                RuleOutput::Value(Value::from(transforms::infer_hd_from_dimensions(dimensions)))
            }
            TransformHandler::DownloadImage => {
                let Some(remote) = inputs.first().and_then(transforms::scalar_text) else {
                    return RuleOutput::Value(Value::Null);
                };
                if remote.trim().is_empty() {
                    return RuleOutput::Value(Value::Null);
                }
                match self.provider.download_artwork(ctx, &remote).await {
                    Some(path) => RuleOutput::File(path),
                    None => RuleOutput::Value(Value::Null),
                }
            }
            TransformHandler::ChooseAndDownloadArtwork => {
                match self.provider.choose_and_download_artwork(ctx, inputs).await {
                    Some(path) => RuleOutput::File(path),
                    None => RuleOutput::Value(Value::Null),
                }
            }
        }
    }
}
