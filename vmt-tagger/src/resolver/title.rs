//! Title normalization, similarity and search-candidate generation

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
static PHRASE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?::|\s-\s|\s–\s|\s—\s|–|—)\s*").expect("static regex"));

/// Remove diacritics, keeping case and everything else
///
/// Decomposes to NFKD and drops combining marks, so `Amélie` becomes `Amelie`.
pub fn fold_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Canonical form used for fuzzy comparison
///
/// Case-folds, strips diacritics, turns `&` into `and`, collapses every
/// non-alphanumeric run into a single space and trims. Idempotent.
pub fn normalize_title(text: &str) -> String {
    let folded = fold_diacritics(text).to_lowercase().replace('&', " and ");
    NON_ALNUM.replace_all(&folded, " ").trim().to_string()
}

/// Fuzzy similarity of two titles in `[0, 1]`
///
/// Normalized Levenshtein over the normalized forms, so accents, case and
/// punctuation never count as differences. Either side empty yields 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = normalize_title(a);
    let right = normalize_title(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&left, &right)
}

/// Search queries to try for a title, best first
///
/// **Algorithm:**
/// 1. The title itself
/// 2. Colon and dash delimited sub-phrases
/// 3. Trailing windows of the last 3 and last 2 tokens
/// 4. Diacritic-stripped variants of everything above
///
/// Duplicates are removed in first-seen order. Derived queries with a single
/// token are never produced; a lone word matches far too broadly.
pub fn build_search_candidates(title: &str) -> Vec<String> {
    let title = collapse_spaces(title);
    if title.is_empty() {
        return Vec::new();
    }

    let mut derived: Vec<String> = vec![title.clone()];

    for phrase in PHRASE_SPLIT.split(&title) {
        let phrase = collapse_spaces(phrase);
        if token_count(&phrase) >= 2 {
            derived.push(phrase);
        }
    }

    let tokens: Vec<&str> = title.split_whitespace().collect();
    for window in [3usize, 2] {
        if tokens.len() > window {
            derived.push(tokens[tokens.len() - window..].join(" "));
        }
    }

    let folded: Vec<String> = derived.iter().map(|c| fold_diacritics(c)).collect();
    derived.extend(folded);

    let mut out: Vec<String> = Vec::new();
    for candidate in derived {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_basic() {
        assert_eq!(normalize_title("  The Lord & the Rings:  Part II! "), "the lord and the rings part ii");
        assert_eq!(normalize_title("Amélie"), "amelie");
        assert_eq!(normalize_title("WALL·E"), "wall e");
        assert_eq!(normalize_title("---"), "");
    }

    #[test]
    fn test_normalize_title_is_idempotent() {
        for input in [
            "Amélie",
            "Crouching Tiger, Hidden Dragon",
            "Mission: Impossible – Fallout",
            "Tom & Jerry",
            "Ｆｕｌｌ Ｗｉｄｔｈ",
            "Æon Flux",
            "",
        ] {
            let once = normalize_title(input);
            assert_eq!(normalize_title(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_similarity_accent_insensitive() {
        assert!(similarity("Amélie", "Amelie") > 0.7);
    }

    #[test]
    fn test_similarity_tolerates_misspelling() {
        assert!(similarity("Napaleon Dynamite", "Napoleon Dynamite") > 0.7);
    }

    #[test]
    fn test_similarity_rejects_unrelated_title() {
        assert!(similarity("Wall-E", "Eton Wall Game") <= 0.6);
    }

    #[test]
    fn test_similarity_empty_side_is_zero() {
        assert_eq!(similarity("", "Heat"), 0.0);
        assert_eq!(similarity("Heat", "!!!"), 0.0);
    }

    #[test]
    fn test_build_search_candidates_contains_title() {
        let candidates = build_search_candidates("Eddie Murphy Boomerang");
        assert_eq!(candidates[0], "Eddie Murphy Boomerang");
        assert!(candidates.contains(&"Murphy Boomerang".to_string()));
        assert!(build_search_candidates("Napaleon Dynamite").contains(&"Napaleon Dynamite".to_string()));
    }

    #[test]
    fn test_build_search_candidates_strips_diacritics() {
        let candidates = build_search_candidates("Amélie");
        assert_eq!(candidates, vec!["Amélie".to_string(), "Amelie".to_string()]);
    }

    #[test]
    fn test_build_search_candidates_splits_subtitles() {
        let candidates = build_search_candidates("Mission Impossible: Dead Reckoning Part One");
        assert!(candidates.contains(&"Mission Impossible".to_string()));
        assert!(candidates.contains(&"Dead Reckoning Part One".to_string()));
    }

    #[test]
    fn test_build_search_candidates_avoids_single_token_fallback() {
        let candidates = build_search_candidates("Chappelle Show S1 D2");
        assert!(!candidates.contains(&"Show".to_string()));
        assert!(candidates.iter().all(|c| c.split_whitespace().count() >= 2));
    }

    #[test]
    fn test_build_search_candidates_dedupes_in_order() {
        let candidates = build_search_candidates("Alien: Alien");
        assert_eq!(candidates, vec!["Alien: Alien".to_string()]);
    }
}
