//! Image configuration and URL construction

use serde_json::Value;

/// Image host settings from the catalog `/configuration` endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageConfig {
    pub base_url: String,
    pub poster_sizes: Vec<String>,
}

impl ImageConfig {
    /// Read `images.secure_base_url` (falling back to `images.base_url`) and `images.poster_sizes`
    pub fn from_configuration(payload: &Value) -> Self {
        let images = payload.get("images");
        let base_url = images
            .and_then(|i| i.get("secure_base_url").and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .or_else(|| images.and_then(|i| i.get("base_url").and_then(Value::as_str)))
            .unwrap_or_default()
            .to_string();
        let poster_sizes = images
            .and_then(|i| i.get("poster_sizes"))
            .and_then(Value::as_array)
            .map(|sizes| {
                sizes
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            base_url,
            poster_sizes,
        }
    }

    /// Both a base URL and at least one size are required to build image URLs
    pub fn is_usable(&self) -> bool {
        !self.base_url.is_empty() && !self.poster_sizes.is_empty()
    }
}

/// Pick an image size: the preferred one if offered, else `original`, else the largest listed
pub fn select_image_size(sizes: &[String], preferred: &str) -> String {
    if sizes.iter().any(|s| s == preferred) {
        return preferred.to_string();
    }
    if sizes.iter().any(|s| s == "original") {
        return "original".to_string();
    }
    sizes
        .last()
        .cloned()
        .unwrap_or_else(|| "original".to_string())
}

/// Join base URL, size and image path with single slashes
pub fn build_image_url(base_url: &str, size: &str, path: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        size.trim_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sizes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_image_size_prefers_requested() {
        assert_eq!(select_image_size(&sizes(&["w185", "w500", "original"]), "w500"), "w500");
    }

    #[test]
    fn test_select_image_size_falls_back_to_original_then_last() {
        assert_eq!(select_image_size(&sizes(&["w185", "original"]), "w500"), "original");
        assert_eq!(select_image_size(&sizes(&["w92", "w185"]), "w500"), "w185");
        assert_eq!(select_image_size(&[], "w500"), "original");
    }

    #[test]
    fn test_build_image_url_normalizes_slashes() {
        assert_eq!(
            build_image_url("https://image.tmdb.org/t/p/", "w500", "/abc.jpg"),
            "https://image.tmdb.org/t/p/w500/abc.jpg"
        );
    }

    #[test]
    fn test_from_configuration() {
        let payload = json!({
            "images": {
                "base_url": "http://image.tmdb.org/t/p/",
                "secure_base_url": "https://image.tmdb.org/t/p/",
                "poster_sizes": ["w92", "w500", "original"]
            }
        });
        let config = ImageConfig::from_configuration(&payload);
        assert_eq!(config.base_url, "https://image.tmdb.org/t/p/");
        assert_eq!(config.poster_sizes.len(), 3);
        assert!(config.is_usable());
        assert!(!ImageConfig::from_configuration(&json!({})).is_usable());
    }
}
