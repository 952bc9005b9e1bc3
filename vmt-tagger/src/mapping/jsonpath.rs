//! Minimal JSONPath subset used by plan sources
//!
//! Supported forms:
//! - `$.a.b` dotted field access (a plain key applied to a list maps over its objects)
//! - `key[N]` index
//! - `key[*]` the whole list
//! - `key[?(@.field=='value')]` equality filter
//!
//! Any inapplicable segment (unknown key, a list operator on a scalar, an
//! out-of-range index, a path not rooted at `$.`) yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static SELECTOR_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<key>[^\[]+)\[(?P<select>.*)\]$").expect("static regex"));
static EQUALITY_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\?\(@\.(?P<field>[^=]+)==['"](?P<target>.+?)['"]\)$"#).expect("static regex")
});

/// Evaluate `path` against `payload`
pub fn extract(payload: &Value, path: &str) -> Option<Value> {
    let rest = path.strip_prefix("$.")?;
    let mut current = payload.clone();
    for part in split_segments(rest) {
        current = apply_segment(&current, &part)?;
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

/// Split on dots that are not inside brackets
fn split_segments(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buffer = String::new();
    let mut depth = 0usize;
    for ch in path.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(std::mem::take(&mut buffer));
                continue;
            }
            _ => {}
        }
        buffer.push(ch);
    }
    if !buffer.is_empty() {
        parts.push(buffer);
    }
    parts
}

fn apply_segment(value: &Value, part: &str) -> Option<Value> {
    if !part.contains('[') {
        return match value {
            Value::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| item.as_object().and_then(|obj| obj.get(part)).cloned())
                    .collect(),
            )),
            Value::Object(obj) => obj.get(part).cloned(),
            _ => None,
        };
    }

    let caps = SELECTOR_PART.captures(part)?;
    let key = &caps["key"];
    let selector = &caps["select"];

    let items = value.as_object()?.get(key)?.as_array()?;

    if selector == "*" {
        return Some(Value::Array(items.clone()));
    }
    if !selector.is_empty() && selector.chars().all(|c| c.is_ascii_digit()) {
        let index: usize = selector.parse().ok()?;
        return items.get(index).cloned();
    }
    if let Some(filter) = EQUALITY_FILTER.captures(selector) {
        let field = &filter["field"];
        let target = &filter["target"];
        return Some(Value::Array(
            items
                .iter()
                .filter(|item| {
                    item.get(field)
                        .and_then(scalar_text)
                        .is_some_and(|text| text == target)
                })
                .cloned()
                .collect(),
        ));
    }
    None
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wildcard_then_field() {
        let payload = json!({"genres": [{"name": "Action"}, {"name": "Drama"}]});
        assert_eq!(extract(&payload, "$.genres[*].name"), Some(json!(["Action", "Drama"])));
    }

    #[test]
    fn test_filter_selects_matching_crew() {
        let payload = json!({"crew": [
            {"job": "Director", "name": "Lana Wachowski"},
            {"job": "Producer", "name": "Joel Silver"},
            {"job": "Director", "name": "Lilly Wachowski"}
        ]});
        assert_eq!(
            extract(&payload, "$.crew[?(@.job=='Director')].name"),
            Some(json!(["Lana Wachowski", "Lilly Wachowski"]))
        );
    }

    #[test]
    fn test_filter_on_numbers_and_double_quotes() {
        let payload = json!({"cast": [{"order": 0, "name": "A"}, {"order": 1, "name": "B"}]});
        assert_eq!(extract(&payload, r#"$.cast[?(@.order=="1")].name"#), Some(json!(["B"])));
    }

    #[test]
    fn test_index_and_nested_fields() {
        let payload = json!({"results": [{"iso_3166_1": "US", "release_dates": [{"certification": "R"}]}]});
        assert_eq!(
            extract(&payload, "$.results[0].release_dates[0].certification"),
            Some(json!("R"))
        );
        assert_eq!(extract(&payload, "$.results[5]"), None);
    }

    #[test]
    fn test_plain_field_access() {
        let payload = json!({"belongs_to_collection": {"name": "The Matrix Collection"}});
        assert_eq!(
            extract(&payload, "$.belongs_to_collection.name"),
            Some(json!("The Matrix Collection"))
        );
    }

    #[test]
    fn test_inapplicable_segments_yield_none() {
        let payload = json!({"title": "Heat", "collection": null});
        assert_eq!(extract(&payload, "$.title[*]"), None);
        assert_eq!(extract(&payload, "$.missing"), None);
        assert_eq!(extract(&payload, "$.collection.name"), None);
        assert_eq!(extract(&payload, "$.title.length"), None);
        assert_eq!(extract(&payload, "title"), None);
        assert_eq!(extract(&payload, "$.title[?(@.x>1)]"), None);
    }
}
