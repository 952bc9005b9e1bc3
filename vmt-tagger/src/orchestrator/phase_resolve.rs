//! Filename guess and catalog match

use super::RunOrchestrator;
use crate::catalog::{CatalogError, MediaKind};
use crate::resolver::{build_search_candidates, clean_filename, parse_tv_from_filename, ParsedTv, SearchCandidate};
use std::path::Path;

/// Accepted catalog match for one file
#[derive(Debug, Clone)]
pub(super) struct ResolvedTitle {
    pub candidate: SearchCandidate,
    /// Present when the filename followed a TV episode pattern and a series matched
    pub tv: Option<ParsedTv>,
}

impl RunOrchestrator {
    /// TV-pattern filenames search series first; everything else searches
    /// movies, plus series when the TV fallback is enabled.
    pub(super) async fn phase_resolve(&self, path: &Path, stem: &str) -> Result<Option<ResolvedTitle>, CatalogError> {
        let Some(lookup) = &self.lookup else {
            tracing::debug!(path = %path.display(), "No catalog configured");
            return Ok(None);
        };
        let resolver = &lookup.resolver;

        if let Some(tv) = parse_tv_from_filename(path) {
            if self.settings.verbose() {
                self.progress.note(&format!(
                    "  Guess: show='{}' season={} episode={}",
                    tv.show, tv.season, tv.episode
                ));
            }
            let candidates = build_search_candidates(&tv.show);
            if let Some(candidate) = resolver.resolve(&candidates, None, MediaKind::Series).await? {
                return Ok(Some(ResolvedTitle {
                    candidate,
                    tv: Some(tv),
                }));
            }
            tracing::debug!(show = %tv.show, "No series match for episode filename, trying title search");
        }

        let guess = clean_filename(stem, &self.settings.strip_tokens);
        let year = guess.year.filter(|_| self.settings.prefer_year_from_filename);
        if self.settings.verbose() {
            let year_text = year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
            self.progress
                .note(&format!("  Guess: title='{}' year={}", guess.title, year_text));
        }
        if guess.title.trim().is_empty() {
            return Ok(None);
        }

        let candidates = build_search_candidates(&guess.title);
        let movie = resolver.resolve(&candidates, year, MediaKind::Movie).await?;
        let series = if self.settings.allow_tv_fallback {
            resolver.resolve(&candidates, year, MediaKind::Series).await?
        } else {
            None
        };

        Ok(resolver
            .choose_preferred(movie, series)
            .map(|candidate| ResolvedTitle { candidate, tv: None }))
    }
}
