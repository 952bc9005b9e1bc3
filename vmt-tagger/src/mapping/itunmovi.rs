//! iTunMOVI composite
//!
//! The iTunMOVI atom is an XML property list holding people credits. It is
//! synthesized from the plain `cast`/`director`/`producer`/`screenwriter`/
//! `studio` tags after both writer passes ran.

use super::{TagSet, TagValue};
use std::collections::HashSet;

/// Plain tag keys folded into the composite
pub const PEOPLE_KEYS: &[&str] = &["cast", "director", "producer", "screenwriter", "studio"];

/// Tag key of the composite itself
pub const ITUNMOVI_KEY: &str = "iTunMOVI";

/// People tags for the composite: atom-pass values win, the container pass fills gaps
pub fn merge_people(atom: &TagSet, container: &TagSet) -> TagSet {
    let mut merged = TagSet::default();
    for key in PEOPLE_KEYS {
        if let Some(value) = atom.get(key).or_else(|| container.get(key)) {
            merged.insert_if_absent(key, value.clone());
        }
    }
    merged
}

fn names(value: Option<&TagValue>) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .map(TagValue::items)
        .unwrap_or_default()
        .into_iter()
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn push_people(out: &mut String, key: &str, people: &[String]) {
    if people.is_empty() {
        return;
    }
    out.push_str(&format!("\t<key>{}</key>\n\t<array>\n", key));
    for name in people {
        out.push_str("\t\t<dict>\n\t\t\t<key>name</key>\n");
        out.push_str(&format!("\t\t\t<string>{}</string>\n", escape(name)));
        out.push_str("\t\t</dict>\n");
    }
    out.push_str("\t</array>\n");
}

/// Property list XML for the people tags; `None` when there are none
pub fn build_itunmovi_xml(tags: &TagSet) -> Option<String> {
    let cast = names(tags.get("cast"));
    let directors = names(tags.get("director"));
    let producers = names(tags.get("producer"));
    let screenwriters = names(tags.get("screenwriter"));
    let studio = names(tags.get("studio")).into_iter().next();

    if cast.is_empty()
        && directors.is_empty()
        && producers.is_empty()
        && screenwriters.is_empty()
        && studio.is_none()
    {
        return None;
    }

    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n<dict>\n",
    );
    push_people(&mut out, "cast", &cast);
    push_people(&mut out, "directors", &directors);
    push_people(&mut out, "producers", &producers);
    push_people(&mut out, "screenwriters", &screenwriters);
    if let Some(studio) = studio {
        out.push_str(&format!("\t<key>studio</key>\n\t<string>{}</string>\n", escape(&studio)));
    }
    out.push_str("</dict>\n</plist>\n");
    Some(out)
}
