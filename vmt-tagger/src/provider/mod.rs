//! Catalog providers
//!
//! A provider supplies the payloads a plan extracts from and downloads cover
//! art on the engine's behalf. [`TmdbProvider`] talks to the catalog;
//! [`NoopProvider`] serves only the base payload and never downloads.

pub mod noop;
pub mod tmdb;

use crate::mapping::{MappingContext, Plan};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use noop::NoopProvider;
pub use tmdb::TmdbProvider;

/// Endpoint template → fetched payload
pub type PayloadMap = HashMap<String, Value>;

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Payloads for every endpoint the plan references, keyed by endpoint template
    ///
    /// The base payload is stored under `base_endpoint`. An endpoint that cannot
    /// be resolved or fetched maps to an empty object.
    async fn fetch_payloads(
        &self,
        plan: &Plan,
        ctx: &MappingContext,
        base_payload: &Value,
        base_endpoint: &str,
    ) -> PayloadMap;

    /// Download one remote image path; `None` when downloads are not possible
    async fn download_artwork(&self, ctx: &MappingContext, remote_path: &str) -> Option<PathBuf>;

    /// Pick the first usable image path among `candidates`, then download it
    async fn choose_and_download_artwork(
        &self,
        ctx: &MappingContext,
        candidates: &[Value],
    ) -> Option<PathBuf>;
}

/// Substitute `{id}`, `{season}` and `{episode}` (or the short `{s}`/`{e}`)
///
/// `None` when the template needs a season or episode the context lacks.
pub fn resolve_endpoint(template: &str, ctx: &MappingContext) -> Option<String> {
    let mut resolved = template.replace("{id}", &ctx.content_id.to_string());
    for (placeholders, value) in [
        (["{season}", "{s}"], ctx.season),
        (["{episode}", "{e}"], ctx.episode),
    ] {
        if placeholders.iter().any(|p| resolved.contains(p)) {
            let value = value?.to_string();
            for placeholder in placeholders {
                resolved = resolved.replace(placeholder, &value);
            }
        }
    }
    Some(resolved)
}

/// Local destination for downloaded artwork: `<run_dir>/artwork/<id>-<remote file name>`
///
/// Season posters of one series share the content id, so the remote file name
/// is part of the local name. `None` in test or dry-run mode, when downloads
/// are disallowed, or without a run directory.
pub fn artwork_destination(ctx: &MappingContext, remote_path: &str) -> Option<PathBuf> {
    if ctx.test_mode || ctx.dry_run || !ctx.allow_artwork_download {
        return None;
    }
    let run_dir = ctx.run_dir.as_ref()?;
    let remote = Path::new(remote_path.trim());
    let stem: String = remote
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let extension = remote
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".jpg".to_string());
    let name = if stem.is_empty() {
        format!("{}{}", ctx.content_id, extension)
    } else {
        format!("{}-{}{}", ctx.content_id, stem, extension)
    };
    Some(run_dir.join("artwork").join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ImageConfig, MediaKind};

    fn context(season: Option<u32>, episode: Option<u32>) -> MappingContext {
        MappingContext {
            content_id: 1399,
            media_kind: MediaKind::Series,
            season,
            episode,
            image_config: ImageConfig::default(),
            artwork_size: "w500".to_string(),
            run_dir: Some(PathBuf::from("/backups/20240101-000000")),
            inspector: None,
            input_path: PathBuf::from("/tv/Show S01E02.mkv"),
            dry_run: false,
            test_mode: false,
            allow_artwork_download: true,
        }
    }

    #[test]
    fn test_resolve_endpoint_placeholders() {
        let ctx = context(Some(1), Some(2));
        assert_eq!(
            resolve_endpoint("/tv/{id}/season/{season}/episode/{episode}", &ctx).as_deref(),
            Some("/tv/1399/season/1/episode/2")
        );
        assert_eq!(
            resolve_endpoint("/tv/{id}/season/{s}/episode/{e}", &ctx).as_deref(),
            Some("/tv/1399/season/1/episode/2")
        );
    }

    #[test]
    fn test_resolve_endpoint_missing_episode() {
        let ctx = context(Some(1), None);
        assert_eq!(resolve_endpoint("/tv/{id}/season/{season}", &ctx).as_deref(), Some("/tv/1399/season/1"));
        assert!(resolve_endpoint("/tv/{id}/season/{season}/episode/{episode}", &ctx).is_none());
    }

    #[test]
    fn test_artwork_destination_rules() {
        let ctx = context(None, None);
        assert_eq!(
            artwork_destination(&ctx, "/abc.png"),
            Some(PathBuf::from("/backups/20240101-000000/artwork/1399-abc.png"))
        );
        assert_eq!(
            artwork_destination(&ctx, "/noext"),
            Some(PathBuf::from("/backups/20240101-000000/artwork/1399-noext.jpg"))
        );
        assert_ne!(
            artwork_destination(&ctx, "/season1.jpg"),
            artwork_destination(&ctx, "/season2.jpg")
        );

        let test_mode = MappingContext { test_mode: true, ..context(None, None) };
        assert!(artwork_destination(&test_mode, "/abc.jpg").is_none());
        let no_run_dir = MappingContext { run_dir: None, ..context(None, None) };
        assert!(artwork_destination(&no_run_dir, "/abc.jpg").is_none());
        let disallowed = MappingContext { allow_artwork_download: false, ..context(None, None) };
        assert!(artwork_destination(&disallowed, "/abc.jpg").is_none());
    }
}
