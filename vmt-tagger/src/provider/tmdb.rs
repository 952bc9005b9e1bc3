//! Catalog-backed provider

use super::{artwork_destination, resolve_endpoint, CatalogProvider, PayloadMap};
use crate::catalog::{build_image_url, select_image_size, CatalogApi};
use crate::mapping::transforms::image_candidates;
use crate::mapping::{MappingContext, Plan};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct TmdbProvider {
    catalog: Arc<dyn CatalogApi>,
    http_client: reqwest::Client,
}

impl TmdbProvider {
    pub fn new(catalog: Arc<dyn CatalogApi>, http_client: reqwest::Client) -> Self {
        Self {
            catalog,
            http_client,
        }
    }

    async fn download_to(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let response = self.http_client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        tokio::fs::write(destination, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn fetch_payloads(
        &self,
        plan: &Plan,
        ctx: &MappingContext,
        base_payload: &Value,
        base_endpoint: &str,
    ) -> PayloadMap {
        let mut payloads = PayloadMap::new();
        payloads.insert(base_endpoint.to_string(), base_payload.clone());

        for endpoint in plan.endpoints() {
            if endpoint == base_endpoint {
                continue;
            }
            let Some(resolved) = resolve_endpoint(&endpoint, ctx) else {
                tracing::info!(
                    endpoint = %endpoint,
                    path = %ctx.input_path.display(),
                    "Season or episode unknown, skipping endpoint"
                );
                payloads.insert(endpoint, json!({}));
                continue;
            };
            match self.catalog.get(&resolved, &[]).await {
                Ok(payload) => {
                    payloads.insert(endpoint, payload);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %resolved, error = %e, "Catalog fetch failed");
                    payloads.insert(endpoint, json!({}));
                }
            }
        }

        payloads
    }

    async fn download_artwork(&self, ctx: &MappingContext, remote_path: &str) -> Option<PathBuf> {
        let destination = artwork_destination(ctx, remote_path)?;

        // Both writer passes may ask for the same image
        if tokio::fs::metadata(&destination)
            .await
            .is_ok_and(|meta| meta.len() > 0)
        {
            return Some(destination);
        }

        if ctx.image_config.base_url.is_empty() {
            tracing::warn!("Image base URL unknown, cannot download artwork");
            return None;
        }
        let size = select_image_size(&ctx.image_config.poster_sizes, &ctx.artwork_size);
        let url = build_image_url(&ctx.image_config.base_url, &size, remote_path.trim());

        match self.download_to(&url, &destination).await {
            Ok(()) => {
                tracing::debug!(url = %url, destination = %destination.display(), "Downloaded artwork");
                Some(destination)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Cover art download failed");
                None
            }
        }
    }

    async fn choose_and_download_artwork(
        &self,
        ctx: &MappingContext,
        candidates: &[Value],
    ) -> Option<PathBuf> {
        let remote = image_candidates(candidates).into_iter().next()?;
        self.download_artwork(ctx, &remote).await
    }
}
