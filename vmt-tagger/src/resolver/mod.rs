//! Candidate resolution
//!
//! Turns a filename-derived title guess into the best catalog entry, and picks
//! between a movie and a series interpretation when both match.
//!
//! # Acceptance
//! A search result scores `similarity(query, result_title) * 10`. The best
//! result across every candidate query is accepted when its score reaches
//! `min_score`, or when it reaches `fallback_min_score` and carries at least
//! `fallback_min_votes` votes.

pub mod filename;
pub mod title;

use crate::catalog::{CatalogApi, CatalogError, MediaKind};
use serde_json::Value;
use std::sync::Arc;
use vmt_common::config::TmdbConfig;

pub use filename::{clean_filename, is_extras_title, parse_tv_from_filename, FilenameGuess, ParsedTv};
pub use title::{build_search_candidates, fold_diacritics, normalize_title, similarity};

/// A scored catalog search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub id: u64,
    pub title: String,
    pub media_kind: MediaKind,
    /// Similarity to the query, 0 to 10
    pub score: f64,
    pub votes: u64,
    pub popularity: f64,
    /// Query that produced this result
    pub query: String,
    pub payload: Value,
}

impl SearchCandidate {
    /// Build a candidate from a raw search result; `None` without a numeric id
    pub fn from_result(result: &Value, kind: MediaKind, query: &str) -> Option<Self> {
        let id = result.get("id").and_then(Value::as_u64)?;
        let title = result_title(result, kind);
        Some(Self {
            id,
            score: similarity(query, &title) * 10.0,
            title,
            media_kind: kind,
            votes: result.get("vote_count").and_then(Value::as_u64).unwrap_or(0),
            popularity: result.get("popularity").and_then(Value::as_f64).unwrap_or(0.0),
            query: query.to_string(),
            payload: result.clone(),
        })
    }
}

/// First non-empty title field of a search result
pub fn result_title(result: &Value, kind: MediaKind) -> String {
    kind.title_keys()
        .iter()
        .filter_map(|key| result.get(*key).and_then(Value::as_str))
        .find(|title| !title.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Empirically tuned acceptance and preference thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverThresholds {
    pub min_score: f64,
    pub fallback_min_score: f64,
    pub fallback_min_votes: u64,
    /// Score difference at or above which text score alone decides movie vs. series
    pub preference_score_gap: f64,
    /// Search again without the year hint when the filtered search is empty
    pub retry_without_year: bool,
}

impl Default for ResolverThresholds {
    fn default() -> Self {
        Self::from(&TmdbConfig::default())
    }
}

impl From<&TmdbConfig> for ResolverThresholds {
    fn from(config: &TmdbConfig) -> Self {
        Self {
            min_score: config.min_score,
            fallback_min_score: config.fallback_min_score,
            fallback_min_votes: config.fallback_min_votes,
            preference_score_gap: config.preference_score_gap,
            retry_without_year: config.retry_search_without_year,
        }
    }
}

impl ResolverThresholds {
    /// Two-tier acceptance: high score, or moderate score backed by votes
    pub fn accepts(&self, candidate: &SearchCandidate) -> bool {
        candidate.score >= self.min_score
            || (candidate.score >= self.fallback_min_score
                && candidate.votes >= self.fallback_min_votes)
    }
}

/// Catalog search + scoring
pub struct CandidateResolver {
    catalog: Arc<dyn CatalogApi>,
    thresholds: ResolverThresholds,
}

impl CandidateResolver {
    pub fn new(catalog: Arc<dyn CatalogApi>, thresholds: ResolverThresholds) -> Self {
        Self {
            catalog,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &ResolverThresholds {
        &self.thresholds
    }

    /// Best accepted match for any of the candidate titles
    ///
    /// **Algorithm:**
    /// 1. Search each candidate title with the year hint (and, when
    ///    `retry_without_year` is set, once more without it if that yields nothing)
    /// 2. Score every result, keeping the single highest score across all queries
    ///    (earlier queries win ties)
    /// 3. Accept or reject the winner with [`ResolverThresholds::accepts`]
    ///
    /// # Errors
    /// Catalog errors propagate; "no results" is `Ok(None)`.
    pub async fn resolve(
        &self,
        candidate_titles: &[String],
        year_hint: Option<i32>,
        kind: MediaKind,
    ) -> Result<Option<SearchCandidate>, CatalogError> {
        let mut best: Option<SearchCandidate> = None;

        for query in candidate_titles.iter().filter(|q| !q.trim().is_empty()) {
            let mut results = self.catalog.search(kind, query, year_hint).await?;
            if results.is_empty() && year_hint.is_some() && self.thresholds.retry_without_year {
                results = self.catalog.search(kind, query, None).await?;
            }

            for result in &results {
                let Some(candidate) = SearchCandidate::from_result(result, kind, query) else {
                    continue;
                };
                let better = best
                    .as_ref()
                    .map_or(true, |current| candidate.score > current.score);
                if better {
                    best = Some(candidate);
                }
            }
        }

        let Some(best) = best else {
            tracing::debug!(kind = kind.as_str(), "No catalog results for any candidate title");
            return Ok(None);
        };

        if self.thresholds.accepts(&best) {
            tracing::debug!(
                kind = kind.as_str(),
                id = best.id,
                title = %best.title,
                score = best.score,
                votes = best.votes,
                "Accepted catalog match"
            );
            Ok(Some(best))
        } else {
            tracing::debug!(
                kind = kind.as_str(),
                title = %best.title,
                score = best.score,
                votes = best.votes,
                "Best catalog match below thresholds"
            );
            Ok(None)
        }
    }

    /// Movie vs. series preference using this resolver's score gap
    pub fn choose_preferred(
        &self,
        movie: Option<SearchCandidate>,
        series: Option<SearchCandidate>,
    ) -> Option<SearchCandidate> {
        choose_preferred(movie, series, self.thresholds.preference_score_gap)
    }
}

/// Pick between a movie and a series match
///
/// With both present: a score difference of at least `score_gap` decides;
/// otherwise higher popularity, then higher vote count, then the movie.
pub fn choose_preferred(
    movie: Option<SearchCandidate>,
    series: Option<SearchCandidate>,
    score_gap: f64,
) -> Option<SearchCandidate> {
    let (movie, series) = match (movie, series) {
        (None, None) => return None,
        (Some(movie), None) => return Some(movie),
        (None, Some(series)) => return Some(series),
        (Some(movie), Some(series)) => (movie, series),
    };

    if (movie.score - series.score).abs() >= score_gap {
        return Some(if series.score > movie.score { series } else { movie });
    }
    if series.popularity != movie.popularity {
        return Some(if series.popularity > movie.popularity { series } else { movie });
    }
    if series.votes != movie.votes {
        return Some(if series.votes > movie.votes { series } else { movie });
    }
    Some(movie)
}
