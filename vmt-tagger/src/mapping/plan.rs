//! Plan documents
//!
//! A plan is JSON data: an ordered list of rules, each naming an output tag,
//! the writer allowed to receive it, the catalog sources to extract from and
//! an optional transform. Plans are loaded once and validated against the
//! transform registry before any file is processed.

use super::transforms::{TransformParams, TransformRegistry};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

const BUILTIN_MOVIE_PLAN: &str = include_str!("../../plans/movie.json");
const BUILTIN_TV_PLAN: &str = include_str!("../../plans/tv.json");

/// Plan loading errors (fatal at startup)
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Cannot read plan {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid plan JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rule {index} ({key}): unknown transform '{name}'")]
    UnknownTransform {
        index: usize,
        key: String,
        name: String,
    },

    #[error("Rule {index}: {reason}")]
    InvalidRule { index: usize, reason: String },
}

/// Which write path may receive a rule's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterTarget {
    /// Container-level tags written by ffmpeg
    Ffmpeg,
    /// iTunes-style atoms written by AtomicParsley
    #[serde(alias = "mp4tags")]
    Atomicparsley,
    #[default]
    Either,
}

/// One evaluation pass over a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterPass {
    Container,
    Atom,
}

impl WriterPass {
    pub fn allows(&self, target: WriterTarget) -> bool {
        matches!(
            (self, target),
            (_, WriterTarget::Either)
                | (WriterPass::Container, WriterTarget::Ffmpeg)
                | (WriterPass::Atom, WriterTarget::Atomicparsley)
        )
    }
}

/// Catalog sub-resource plus extraction path
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Source {
    pub endpoint: String,
    #[serde(alias = "jsonpath")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rule {
    #[serde(alias = "itunes_key")]
    pub output_key: String,
    #[serde(default)]
    pub writer: WriterTarget,
    #[serde(default, alias = "tmdb_sources")]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub params: TransformParams,
    #[serde(default)]
    pub fallback: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub name: Option<String>,
    pub rules: Vec<Rule>,
}

impl Plan {
    /// Parse and validate a plan document
    pub fn from_json(text: &str, registry: &TransformRegistry) -> Result<Self, PlanError> {
        let plan: Plan = serde_json::from_str(text)?;
        plan.validate(registry)?;
        Ok(plan)
    }

    pub fn load(path: &Path, registry: &TransformRegistry) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, registry)
    }

    pub fn builtin_movie(registry: &TransformRegistry) -> Result<Self, PlanError> {
        Self::from_json(BUILTIN_MOVIE_PLAN, registry)
    }

    pub fn builtin_tv(registry: &TransformRegistry) -> Result<Self, PlanError> {
        Self::from_json(BUILTIN_TV_PLAN, registry)
    }

    /// Reject blank keys, malformed sources and unregistered transforms
    pub fn validate(&self, registry: &TransformRegistry) -> Result<(), PlanError> {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.output_key.trim().is_empty() {
                return Err(PlanError::InvalidRule {
                    index,
                    reason: "empty output_key".to_string(),
                });
            }
            for source in &rule.sources {
                if source.endpoint.trim().is_empty() {
                    return Err(PlanError::InvalidRule {
                        index,
                        reason: format!("{}: source without endpoint", rule.output_key),
                    });
                }
                if !source.path.starts_with("$.") {
                    return Err(PlanError::InvalidRule {
                        index,
                        reason: format!("{}: path '{}' must start with '$.'", rule.output_key, source.path),
                    });
                }
            }
            if let Some(name) = &rule.transform {
                if !registry.contains(name) {
                    return Err(PlanError::UnknownTransform {
                        index,
                        key: rule.output_key.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fill configured limits into rules that leave them unset
    ///
    /// `max_chars` for the truncating transforms, `max_genres` for genre mapping.
    pub fn apply_defaults(&mut self, max_overview_length: usize, max_genres: usize) {
        for rule in &mut self.rules {
            let (param, value) = match rule.transform.as_deref() {
                Some("truncate" | "first_nonempty_then_truncate") => ("max_chars", max_overview_length),
                Some("tmdb_genres_to_apple_genres") => ("max_genres", max_genres),
                _ => continue,
            };
            rule.params
                .entry(param.to_string())
                .or_insert_with(|| Value::from(value));
        }
    }

    /// Distinct endpoints referenced by any rule, sorted
    pub fn endpoints(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(|rule| rule.sources.iter().map(|s| s.endpoint.clone()))
            .collect()
    }
}
