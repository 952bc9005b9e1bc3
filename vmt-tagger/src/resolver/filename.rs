//! Filename parsing: title/year guesses, TV episode markers, extras detection

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("static regex"));
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[(].*?[\])]").expect("static regex"));
static SEASON_VOLUME_BUNDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bs\d+v\d+\b").expect("static regex"));
static DISC_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:disc|cd)\s*\d+\b").expect("static regex"));
static VOLUME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^v(\d{1,2})$").expect("static regex"));
static SEASON_OR_DISC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[sd]\d{1,2}$").expect("static regex"));
static EXTRAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(appendix|appendices|bonus|extras|featurettes?|behind the scenes|making of|deleted scenes?|gag reel|bloopers|interviews)\b",
    )
    .expect("static regex")
});

static TV_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?P<show>.+?)\s+[Ss](?P<season>\d{1,2})\s*[Ee](?P<episode>\d{1,3}).*$",
        r"^(?P<show>.+?)\s+[Ss](?P<season>\d{1,2})\s+[Dd](?P<episode>\d{1,2}).*$",
        r"^(?P<show>.+?)\s+[Ss](?P<season>\d{1,2})\s*[Vv](?P<episode>\d{1,3}).*$",
        r"^(?P<show>.+?)\s+[Ss]eason\s+(?P<season>\d{1,2})\s+[Ee]pisode\s+(?P<episode>\d{1,3}).*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});
static DISC_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[dD]\d+\b").expect("static regex"));
static VOLUME_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[vV]\d+\b").expect("static regex"));

/// Edition and packaging words that never belong in a search title
const EDITION_TOKENS: &[&str] = &[
    "ext",
    "extended",
    "unrated",
    "ws",
    "se",
    "dc",
    "special",
    "edition",
    "remastered",
    "ultimate",
    "cut",
];

const ACRONYMS: &[(&str, &str)] = &[("lotr", "Lord of the Rings")];

/// Title and optional year guessed from a filename stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameGuess {
    pub title: String,
    pub year: Option<i32>,
}

/// Show, season and episode parsed from a TV-style filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTv {
    pub show: String,
    pub season: u32,
    pub episode: u32,
    /// `Disc N` or `Volume N` when the episode number is really a disc/volume index
    pub episode_title_hint: Option<String>,
}

/// Extract a search title and year guess from a filename stem
///
/// **Algorithm:**
/// 1. `_` and `.` become spaces; hyphens survive only between word characters
/// 2. Year: first `19xx`/`20xx` token outside brackets, else inside brackets
/// 3. Drop bracketed notes, `S1V2` bundles, `Disc N`/`CD N` markers and all year tokens
/// 4. Expand known acronyms, drop strip/edition tokens and `S<n>`/`D<n>` tokens,
///    rewrite `V<n>` as `Vol <n>`
pub fn clean_filename(stem: &str, strip_tokens: &[String]) -> FilenameGuess {
    let spaced = stem.replace(|c: char| c == '_' || c == '.', " ");
    let s = replace_loose_hyphens(&spaced);

    let without_brackets = BRACKETED.replace_all(&s, " ").to_string();
    let year = first_year(&without_brackets).or_else(|| first_year(&s));

    let mut cleaned = SEASON_VOLUME_BUNDLE.replace_all(&without_brackets, " ").to_string();
    cleaned = DISC_MARKER.replace_all(&cleaned, " ").to_string();
    cleaned = YEAR.replace_all(&cleaned, " ").to_string();

    let strip: HashSet<String> = strip_tokens.iter().map(|t| t.to_lowercase()).collect();

    let mut parts: Vec<String> = Vec::new();
    for raw in cleaned.split_whitespace() {
        let lowered = raw.to_lowercase();
        if let Some((_, expansion)) = ACRONYMS.iter().find(|(acronym, _)| *acronym == lowered) {
            parts.extend(expansion.split_whitespace().map(str::to_string));
            continue;
        }
        if strip.contains(&lowered) || EDITION_TOKENS.contains(&lowered.as_str()) {
            continue;
        }
        if let Some(caps) = VOLUME_TOKEN.captures(raw) {
            parts.push("Vol".to_string());
            parts.push(caps[1].to_string());
            continue;
        }
        if SEASON_OR_DISC_TOKEN.is_match(raw) {
            continue;
        }
        parts.push(raw.to_string());
    }

    FilenameGuess {
        title: parts.join(" "),
        year,
    }
}

/// True when a filename stem names bonus material rather than the feature
pub fn is_extras_title(stem: &str) -> bool {
    let spaced = stem.replace(|c: char| c == '_' || c == '.' || c == '-', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    EXTRAS.is_match(&collapsed)
}

/// Parse show/season/episode from a filename
pub fn parse_tv_from_filename(path: &Path) -> Option<ParsedTv> {
    let stem = path.file_stem()?.to_string_lossy();
    let spaced = stem.replace(|c: char| c == '_' || c == '.', " ");
    let s = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    for (index, pattern) in TV_PATTERNS.iter().enumerate() {
        let Some(caps) = pattern.captures(&s) else {
            continue;
        };
        let show = caps["show"].split_whitespace().collect::<Vec<_>>().join(" ");
        let (Ok(season), Ok(episode)) = (caps["season"].parse::<u32>(), caps["episode"].parse::<u32>())
        else {
            continue;
        };

        let episode_title_hint = if index == 1 || DISC_HINT.is_match(&s) {
            Some(format!("Disc {}", episode))
        } else if index == 2 || VOLUME_HINT.is_match(&s) {
            Some(format!("Volume {}", episode))
        } else {
            None
        };

        return Some(ParsedTv {
            show,
            season,
            episode,
            episode_title_hint,
        });
    }

    None
}

fn first_year(text: &str) -> Option<i32> {
    YEAR.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Hyphens between two word characters are kept, every other hyphen becomes a space
fn replace_loose_hyphens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c != '-' {
                return c;
            }
            let before = i > 0 && is_word(chars[i - 1]);
            let after = i + 1 < chars.len() && is_word(chars[i + 1]);
            if before && after {
                '-'
            } else {
                ' '
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tokens() -> Vec<String> {
        ["1080p", "x264", "bluray", "webrip", "hdrip", "dts", "yify", "rarbg"]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    fn guess(title: &str, year: Option<i32>) -> FilenameGuess {
        FilenameGuess {
            title: title.to_string(),
            year,
        }
    }

    #[test]
    fn test_clean_filename_examples() {
        let cases = [
            ("The.Matrix.1999.1080p.BluRay.x264", guess("The Matrix", Some(1999))),
            ("Ace Ventura_ Pet Detective", guess("Ace Ventura Pet Detective", None)),
            ("The Godfather Part II D1 1974", guess("The Godfather Part II", Some(1974))),
            ("LOTR Fellowship Ext D1", guess("Lord of the Rings Fellowship", None)),
            ("Top Gun (1986) 1080p BluRay x264", guess("Top Gun", Some(1986))),
            ("Top Gun [1986]", guess("Top Gun", Some(1986))),
            ("Top Gun (1986)", guess("Top Gun", Some(1986))),
            ("Kill Bill V2", guess("Kill Bill Vol 2", None)),
            ("Sex and the City s1v2", guess("Sex and the City", None)),
            ("Lions For Lambs [WS]", guess("Lions For Lambs", None)),
            ("300", guess("300", None)),
        ];
        for (stem, expected) in cases {
            assert_eq!(clean_filename(stem, &tokens()), expected, "stem: {}", stem);
        }
    }

    #[test]
    fn test_clean_filename_keeps_intra_word_hyphens() {
        let result = clean_filename("Spider-Man - Homecoming", &tokens());
        assert_eq!(result.title, "Spider-Man Homecoming");
    }

    #[test]
    fn test_clean_filename_drops_disc_markers() {
        let result = clean_filename("Heat Disc 2", &tokens());
        assert_eq!(result.title, "Heat");
        let result = clean_filename("Heat CD1", &tokens());
        assert_eq!(result.title, "Heat");
    }

    #[test]
    fn test_extras_title_detection() {
        assert!(is_extras_title("LOTR - Appendices Part One â€“ From Book to Vision"));
        assert!(is_extras_title("Alien.Behind.the.Scenes"));
        assert!(is_extras_title("Heat - Deleted Scenes"));
        assert!(!is_extras_title("The Matrix 1999"));
        assert!(!is_extras_title("Extraction"));
    }

    #[test]
    fn test_parse_tv_episode_marker() {
        let parsed = parse_tv_from_filename(&PathBuf::from("/tv/The.Office.S02E05.720p.mkv")).unwrap();
        assert_eq!(parsed.show, "The Office");
        assert_eq!(parsed.season, 2);
        assert_eq!(parsed.episode, 5);
        assert_eq!(parsed.episode_title_hint, None);
    }

    #[test]
    fn test_parse_tv_disc_and_volume_hints() {
        let parsed = parse_tv_from_filename(&PathBuf::from("Chappelle Show S1 D2.mp4")).unwrap();
        assert_eq!(parsed.show, "Chappelle Show");
        assert_eq!((parsed.season, parsed.episode), (1, 2));
        assert_eq!(parsed.episode_title_hint.as_deref(), Some("Disc 2"));

        let parsed = parse_tv_from_filename(&PathBuf::from("Sex and the City S1V2.m4v")).unwrap();
        assert_eq!(parsed.show, "Sex and the City");
        assert_eq!(parsed.episode_title_hint.as_deref(), Some("Volume 2"));
    }

    #[test]
    fn test_parse_tv_long_form() {
        let parsed =
            parse_tv_from_filename(&PathBuf::from("Doctor Who Season 4 Episode 10.mkv")).unwrap();
        assert_eq!(parsed.show, "Doctor Who");
        assert_eq!((parsed.season, parsed.episode), (4, 10));
    }

    #[test]
    fn test_parse_tv_rejects_movies() {
        assert!(parse_tv_from_filename(&PathBuf::from("The Matrix 1999.mp4")).is_none());
    }
}
