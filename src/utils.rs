use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};

lazy_static! {
    static ref HASHTAG_RE: Regex = Regex::new(r"#([\p{L}\p{N}_]+)").unwrap();
}

/// Split a comma separated tag list, dropping empty entries and any leading `#`.
pub fn parse_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim().trim_start_matches('#').trim())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Hashtags written inline in a caption, in order of appearance.
pub fn caption_hashtags(caption: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for cap in HASHTAG_RE.captures_iter(caption) {
        if let Some(m) = cap.get(1) {
            let tag = m.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

// The backend stores tags either as an array or as the raw upload form string
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Joined(String),
}

pub(crate) fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTags>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTags::List(list)) => list
            .iter()
            .flat_map(|entry| parse_tags(entry))
            .collect(),
        Some(RawTags::Joined(joined)) => parse_tags(&joined),
        None => Vec::new(),
    })
}
