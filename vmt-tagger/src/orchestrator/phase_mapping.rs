//! Details fetch, plan evaluation and pass reconciliation

use super::phase_resolve::ResolvedTitle;
use super::{MatchInfo, RunOrchestrator};
use crate::catalog::{CatalogError, MediaKind};
use crate::mapping::{
    build_itunmovi_xml, merge_people, MappingContext, PlanResult, TagValue, WriterPass, ITUNMOVI_KEY, PEOPLE_KEYS,
};
use crate::resolver::result_title;
use crate::writers::container_key;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Preview values longer than this are cut
const PREVIEW_CHARS: usize = 120;

/// Tags planned for one file, split by writer
#[derive(Debug, Clone, Default)]
pub(super) struct MappedTags {
    pub container: PlanResult,
    pub atom: PlanResult,
    pub atom_enabled: bool,
    pub matched: Option<MatchInfo>,
}

impl RunOrchestrator {
    pub(super) async fn phase_mapping(&self, path: &Path, resolved: &ResolvedTitle) -> Result<MappedTags, CatalogError> {
        let candidate = &resolved.candidate;
        let kind = candidate.media_kind;
        let details = match &self.lookup {
            Some(lookup) => lookup.catalog.details(kind, candidate.id).await?,
            None => candidate.payload.clone(),
        };

        let mut title = result_title(&details, kind);
        if title.is_empty() {
            title = candidate.title.clone();
        }
        let year = details
            .get(kind.date_key())
            .and_then(Value::as_str)
            .filter(|date| date.len() >= 4)
            .map(|date| &date[..4]);
        self.progress.file_matched(&title, year, Some(candidate.id));
        if self.settings.verbose() {
            self.progress.note(&details_summary(&details, kind, candidate.id));
        }

        let ctx = MappingContext {
            content_id: candidate.id,
            media_kind: kind,
            season: resolved.tv.as_ref().map(|tv| tv.season),
            episode: resolved.tv.as_ref().map(|tv| tv.episode),
            image_config: self.image_config.clone(),
            artwork_size: self.settings.cover_art_size.clone(),
            run_dir: self.artifacts.dirs.run_dir.clone(),
            inspector: Some(self.inspector.clone()),
            input_path: path.to_path_buf(),
            dry_run: self.settings.dry_run,
            test_mode: self.settings.test_mode.is_some(),
            allow_artwork_download: self.cover_art_enabled
                && self.settings.write_enabled
                && self.image_config.is_usable(),
        };

        let plan = match kind {
            MediaKind::Movie => &self.plans.movie,
            MediaKind::Series => &self.plans.tv,
        };
        let payloads = self
            .engine
            .fetch_payloads(plan, &ctx, &details, kind.base_endpoint())
            .await;

        let atom_enabled = self.atom_pass_enabled(path);
        let mut atom = if atom_enabled {
            self.engine.evaluate(plan, &ctx, &payloads, WriterPass::Atom).await
        } else {
            PlanResult::default()
        };
        let mut container = self
            .engine
            .evaluate(plan, &ctx, &payloads, WriterPass::Container)
            .await;

        if let Some(hint) = resolved.tv.as_ref().and_then(|tv| tv.episode_title_hint.as_ref()) {
            let disc_title = TagValue::Text(format!("{} - {}", title, hint));
            container.tags.set("title", disc_title.clone());
            if atom_enabled {
                atom.tags.set("title", disc_title);
            }
        }

        reconcile_passes(&mut container, &mut atom, atom_enabled);

        Ok(MappedTags {
            container,
            atom,
            atom_enabled,
            matched: Some(MatchInfo {
                tmdb_id: Some(candidate.id),
                title,
            }),
        })
    }

    /// Extras get their cleaned filename as title and nothing else
    pub(super) fn extras_tags(&self, path: &Path, stem: &str) -> MappedTags {
        let guess = crate::resolver::clean_filename(stem, &self.settings.strip_tokens);
        let title = if guess.title.trim().is_empty() {
            stem.to_string()
        } else {
            guess.title
        };
        self.progress.file_matched(&title, None, None);

        let atom_enabled = self.atom_pass_enabled(path);
        let mut container = PlanResult::default();
        container.tags.set("title", TagValue::Text(title.clone()));
        let mut atom = PlanResult::default();
        if atom_enabled {
            atom.tags.set("title", TagValue::Text(title.clone()));
        }
        reconcile_passes(&mut container, &mut atom, atom_enabled);

        MappedTags {
            container,
            atom,
            atom_enabled,
            matched: Some(MatchInfo { tmdb_id: None, title }),
        }
    }
}

/// Settle what each writer gets once both passes ran
///
/// 1. People tags from both passes (atom values first) become the iTunMOVI
///    composite in the atom tags, and the plain people keys leave the atom tags
/// 2. The container pass drops every key the atom pass will write
/// 3. Cover art goes to the atom writer when that pass produced one
pub fn reconcile_passes(container: &mut PlanResult, atom: &mut PlanResult, atom_enabled: bool) {
    if !atom_enabled {
        return;
    }

    let people = merge_people(&atom.tags, &container.tags);
    if let Some(xml) = build_itunmovi_xml(&people) {
        atom.tags.set(ITUNMOVI_KEY, TagValue::Text(xml));
    }
    for key in PEOPLE_KEYS {
        atom.tags.remove(key);
    }

    container.tags.retain(|key, _| !atom.tags.contains(key));
    if atom.artwork.is_some() {
        container.artwork = None;
    }
}

/// Drop tags the file already carries with a non-blank value
///
/// Keys are compared under their container names, case-insensitively. Cover
/// art is dropped when the file already has an attached picture.
pub fn filter_existing(result: &mut PlanResult, existing: &HashMap<String, String>, has_artwork: bool) {
    result.tags.retain(|key, _| {
        existing
            .get(&container_key(key).to_lowercase())
            .map_or(true, |value| value.trim().is_empty())
    });
    if has_artwork {
        result.artwork = None;
    }
}

fn details_summary(details: &Value, kind: MediaKind, id: u64) -> String {
    let overview_chars = details
        .get("overview")
        .and_then(Value::as_str)
        .map_or(0, |text| text.chars().count());
    let genres: Vec<&str> = details
        .get("genres")
        .and_then(Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .filter_map(|genre| genre.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    format!(
        "  TMDb {}: id={} overview={} chars genres=[{}]",
        kind.as_str(),
        id,
        overview_chars,
        genres.join(", ")
    )
}

/// `key: value` preview lines, long values cut
pub(super) fn preview_lines(label: &str, result: &PlanResult) -> Vec<String> {
    let mut lines = Vec::new();
    if result.is_empty() {
        return lines;
    }
    lines.push(format!("  {} tags:", label));
    for (key, value) in result.tags.iter() {
        let text = value.joined(", ").replace('\n', " ");
        let shown = if text.chars().count() > PREVIEW_CHARS {
            let cut: String = text.chars().take(PREVIEW_CHARS - 3).collect();
            format!("{}...", cut)
        } else {
            text
        };
        lines.push(format!("    {}: {}", key, shown));
    }
    if let Some(artwork) = &result.artwork {
        lines.push(format!("    artwork: {}", artwork.display()));
    }
    lines
}
