//! TMDb HTTP client
//!
//! Requests are paced by a fixed courtesy delay. The delay never grows on
//! error; it only spaces consecutive requests.

use super::{CatalogApi, CatalogError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use vmt_common::config::TmdbConfig;

const USER_AGENT: &str = concat!("vmt-tagger/", env!("CARGO_PKG_VERSION"));

/// Fixed-interval pacing between consecutive requests
struct RequestPacer {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RequestPacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if the previous request was less than `min_interval` ago
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::trace!("Catalog pacing: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// TMDb API client
pub struct TmdbClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
    include_adult: bool,
    pacer: RequestPacer,
}

impl TmdbClient {
    /// Build a client from the resolved `[tmdb]` settings
    ///
    /// # Errors
    /// `MissingCredential` when no API key resolves, `NetworkError` when the
    /// HTTP client cannot be built.
    pub fn new(config: &TmdbConfig) -> Result<Self, CatalogError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| CatalogError::MissingCredential(config.api_key_env.clone()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let delay = Duration::from_secs_f64(config.request_delay_seconds.max(0.0));

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            language: config.language.clone(),
            include_adult: config.include_adult,
            pacer: RequestPacer::new(delay),
        })
    }

    /// Shared HTTP client, reused for image downloads
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[async_trait]
impl CatalogApi for TmdbClient {
    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, CatalogError> {
        self.pacer.wait().await;

        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(url = %url, "Querying TMDb API");

        let mut query: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("language", self.language.clone()),
            ("include_adult", self.include_adult.to_string()),
        ];
        query.extend(params.iter().cloned());

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError(status.as_u16(), error_text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }
}
