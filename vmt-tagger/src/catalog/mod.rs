//! Remote catalog access
//!
//! Only the endpoints tagging needs are covered: title search, details,
//! sub-resources referenced by plans, and the image configuration.

pub mod images;
pub mod tmdb;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use images::{build_image_url, select_image_size, ImageConfig};
pub use tmdb::TmdbClient;

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("API key missing: set env var {0} or tmdb.api_key in config")]
    MissingCredential(String),
}

/// Movie vs. series interpretation of a title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "tv",
        }
    }

    pub fn search_endpoint(&self) -> &'static str {
        match self {
            MediaKind::Movie => "/search/movie",
            MediaKind::Series => "/search/tv",
        }
    }

    /// Result fields holding the display title, most preferred first
    pub fn title_keys(&self) -> [&'static str; 2] {
        match self {
            MediaKind::Movie => ["title", "original_title"],
            MediaKind::Series => ["name", "original_name"],
        }
    }

    /// Query parameter narrowing a search by year
    pub fn year_param(&self) -> &'static str {
        match self {
            MediaKind::Movie => "year",
            MediaKind::Series => "first_air_date_year",
        }
    }

    /// Details endpoint template; doubles as the base endpoint of a plan
    pub fn base_endpoint(&self) -> &'static str {
        match self {
            MediaKind::Movie => "/movie/{id}",
            MediaKind::Series => "/tv/{id}",
        }
    }

    /// Field holding the release or first-air date in a details payload
    pub fn date_key(&self) -> &'static str {
        match self {
            MediaKind::Movie => "release_date",
            MediaKind::Series => "first_air_date",
        }
    }
}

/// Read-only catalog access
///
/// Implementations apply the fixed courtesy delay between requests themselves.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// GET an endpoint (path relative to the API root) with query parameters
    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, CatalogError>;

    /// Search by title, returning the raw `results` array
    async fn search(
        &self,
        kind: MediaKind,
        query: &str,
        year: Option<i32>,
    ) -> Result<Vec<Value>, CatalogError> {
        let mut params = vec![("query", query.to_string())];
        if let Some(year) = year {
            params.push((kind.year_param(), year.to_string()));
        }
        let payload = self.get(kind.search_endpoint(), &params).await?;
        Ok(payload
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Fetch the full details payload for a catalog id
    async fn details(&self, kind: MediaKind, id: u64) -> Result<Value, CatalogError> {
        let endpoint = kind.base_endpoint().replace("{id}", &id.to_string());
        self.get(&endpoint, &[]).await
    }

    /// Fetch the image configuration
    async fn configuration(&self) -> Result<Value, CatalogError> {
        self.get("/configuration", &[]).await
    }
}
