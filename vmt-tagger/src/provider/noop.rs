//! Offline provider: the base payload only, no downloads

use super::{CatalogProvider, PayloadMap};
use crate::mapping::{MappingContext, Plan};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvider;

#[async_trait]
impl CatalogProvider for NoopProvider {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn fetch_payloads(
        &self,
        plan: &Plan,
        _ctx: &MappingContext,
        base_payload: &Value,
        base_endpoint: &str,
    ) -> PayloadMap {
        let mut payloads: PayloadMap = plan
            .endpoints()
            .into_iter()
            .map(|endpoint| (endpoint, json!({})))
            .collect();
        payloads.insert(base_endpoint.to_string(), base_payload.clone());
        payloads
    }

    async fn download_artwork(&self, _ctx: &MappingContext, _remote_path: &str) -> Option<PathBuf> {
        None
    }

    async fn choose_and_download_artwork(
        &self,
        _ctx: &MappingContext,
        _candidates: &[Value],
    ) -> Option<PathBuf> {
        None
    }
}
