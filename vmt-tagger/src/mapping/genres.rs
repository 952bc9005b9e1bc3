//! Genre canonicalization
//!
//! Maps catalog genre names onto the Apple/iTunes canonical genre list.
//!
//! # Rules
//! - Unknown genres are dropped, duplicates removed
//! - Survivors are ordered by a fixed priority (unlisted canonical genres last, stable)
//! - A compound catalog genre (`Action & Adventure`) anywhere in the input
//!   means the result collapses to a single slot
//! - Otherwise at most `max_genres` are kept

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Canonical genre names
pub const CANONICAL_GENRES: &[&str] = &[
    "Action",
    "Adventure",
    "Animation",
    "Biography",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Family",
    "Fantasy",
    "History",
    "Horror",
    "Kids",
    "Music",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Sport",
    "Thriller",
    "War",
    "Western",
];

/// Catalog genre name → canonical genre
const CATALOG_ALIASES: &[(&str, &str)] = &[
    ("Action", "Action"),
    ("Adventure", "Adventure"),
    ("Action & Adventure", "Action"),
    ("Animation", "Animation"),
    ("Comedy", "Comedy"),
    ("Crime", "Crime"),
    ("Documentary", "Documentary"),
    ("Drama", "Drama"),
    ("Family", "Family"),
    ("Fantasy", "Fantasy"),
    ("History", "History"),
    ("Horror", "Horror"),
    ("Music", "Music"),
    ("Musical", "Musical"),
    ("Mystery", "Mystery"),
    ("Romance", "Romance"),
    ("Science Fiction", "Sci-Fi"),
    ("Sci-Fi & Fantasy", "Sci-Fi"),
    ("Thriller", "Thriller"),
    ("War", "War"),
    ("War & Politics", "War"),
    ("Western", "Western"),
    ("Kids", "Kids"),
    ("Sport", "Sport"),
    ("TV Movie", "Drama"),
    ("Reality", "Documentary"),
    ("News", "Documentary"),
    ("Talk", "Documentary"),
    ("Soap", "Drama"),
];

const PRIORITY_ORDER: &[&str] = &[
    "Documentary",
    "Animation",
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Thriller",
    "Sci-Fi",
    "Horror",
    "Romance",
    "Crime",
    "Fantasy",
    "Family",
    "War",
    "Western",
];

static CANONICAL_LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    CANONICAL_GENRES
        .iter()
        .map(|name| (normalize_key(name), *name))
        .collect()
});

static CATALOG_LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    CATALOG_ALIASES
        .iter()
        .map(|(alias, canonical)| (normalize_key(alias), *canonical))
        .collect()
});

/// Lookup key: lowercase, `&`→`and`, `-`/`/`/`_`→space, collapsed whitespace
fn normalize_key(value: &str) -> String {
    let lowered = value
        .trim()
        .to_lowercase()
        .replace('&', "and")
        .replace(['-', '/', '_'], " ");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn priority(name: &str) -> usize {
    PRIORITY_ORDER
        .iter()
        .position(|p| *p == name)
        .unwrap_or(PRIORITY_ORDER.len())
}

/// Canonicalize, de-duplicate, order by priority and limit
pub fn normalize_genres<S: AsRef<str>>(genres: &[S], max_genres: usize) -> Vec<String> {
    let max_genres = max_genres.max(1);
    let mut compound_present = false;
    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut normalized: Vec<&'static str> = Vec::new();

    for raw in genres {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            continue;
        }
        if raw.contains('&') {
            compound_present = true;
        }
        let key = normalize_key(raw);
        let Some(mapped) = CATALOG_LOOKUP
            .get(&key)
            .or_else(|| CANONICAL_LOOKUP.get(&key))
            .copied()
        else {
            continue;
        };
        if seen.insert(mapped) {
            normalized.push(mapped);
        }
    }

    // sort_by_key is stable, so equal priorities keep input order
    normalized.sort_by_key(|name| priority(name));

    let limit = if compound_present || max_genres == 1 {
        1
    } else {
        max_genres
    };
    normalized
        .into_iter()
        .take(limit)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_scifi_and_dedupes() {
        let raw = ["Science Fiction", "Sci-Fi & Fantasy", "Drama", "Drama", "Kids", ""];
        assert_eq!(normalize_genres(&raw, 2), vec!["Drama"]);
    }

    #[test]
    fn test_handles_common_catalog_names() {
        let raw = [
            "Action", "Adventure", "Action & Adventure", "Animation", "Biography", "Comedy",
            "Crime", "Documentary", "Drama", "Family", "Fantasy", "History", "Horror", "Music",
            "Mystery", "Romance", "Science Fiction", "Sci-Fi & Fantasy", "Thriller", "War",
            "Western", "Kids", "Sport", "TV Movie", "Reality", "News", "Talk", "Soap",
        ];
        assert_eq!(normalize_genres(&raw, 2), vec!["Documentary"]);
    }

    #[test]
    fn test_filters_unknown_names() {
        let raw = ["Unlisted", "Unknown Genre", "Adventure Reality", ""];
        assert!(normalize_genres(&raw, 2).is_empty());
    }

    #[test]
    fn test_compounds_collapse_to_one() {
        let raw = ["Action & Adventure", "Sci-Fi & Fantasy", "War & Politics"];
        assert_eq!(normalize_genres(&raw, 2), vec!["Action"]);
    }

    #[test]
    fn test_applies_priority_order() {
        assert_eq!(
            normalize_genres(&["Horror", "Romance", "Documentary", "Comedy"], 2),
            vec!["Documentary", "Comedy"]
        );
        assert_eq!(
            normalize_genres(&["Action", "Drama", "Comedy", "Thriller"], 2),
            vec!["Action", "Comedy"]
        );
    }

    #[test]
    fn test_prefers_two_when_no_compound() {
        assert_eq!(
            normalize_genres(&["TV Movie", "Drama", "Comedy"], 2),
            vec!["Comedy", "Drama"]
        );
    }

    #[test]
    fn test_canonical_spellings_accepted() {
        assert_eq!(normalize_genres(&["sci fi", "MUSICAL"], 3), vec!["Sci-Fi", "Musical"]);
    }
}
