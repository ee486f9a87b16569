use crate::matcher::Matcher;
use serde_json::Value;

/// Longest excerpt kept for a reported JSON value, in characters.
pub const EXCERPT_CHARS: usize = 1000;

/// Parses `blob` as one JSON document, or failing that each non-blank line.
///
/// Anything that does not parse is dropped without a trace: for a text
/// corpus a parse failure is the common case, not an error.
pub fn sniff(blob: &str) -> Vec<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(blob) {
        return vec![v];
    }
    blob.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonHit {
    pub excerpt: String,
    pub value: Value,
}

/// Objects and arrays in `blob` whose compact serialization contains the query.
pub fn matching_values(blob: &str, matcher: &Matcher) -> Vec<JsonHit> {
    sniff(blob)
        .into_iter()
        .filter(|v| matches!(v, Value::Object(_) | Value::Array(_)))
        .filter_map(|value| {
            let serialized = serde_json::to_string(&value).ok()?;
            if !matcher.contained_in(&serialized) {
                return None;
            }
            Some(JsonHit { excerpt: truncate_chars(&serialized, EXCERPT_CHARS), value })
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
