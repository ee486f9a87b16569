use ahash::AHashSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

// Ends on a digit, spans at least 8 characters, never crosses a line. May open
// on a parenthesised area code.
static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(?\+?[0-9][0-9 \-()]{6,}[0-9]").unwrap()
});

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b").unwrap()
});

static RE_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@([A-Za-z0-9_.\-]{3,})").unwrap()
});

// key SEP value, with the value running to the next comma, semicolon or newline.
// A `-` separator needs whitespace on one side so `user-id: 7` keeps its key.
static RE_KEYVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<key>[\p{L}\p{M}_ \-:]{2,40}?)(?:\s*[:=]|\s+-|-\s+)\s*(?P<val>[^,;\n]+)").unwrap()
});

static RE_ID_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9A-Za-z]{6,20}\b").unwrap()
});

static RE_RTL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Arabic}\p{Hebrew}\p{Syriac}\p{Thaana}]").unwrap()
});

const PHONE_MIN_DIGITS: usize = 6;
const PHONE_MAX_DIGITS: usize = 15;

// Searched for anywhere in the key. `name` and `id` need word boundaries so
// `username` or `idea` stay plain keys.
static RE_NAME_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:full[\s_\-]*)?name\b|اسم\s*كامل|الاسم").unwrap()
});

static RE_ID_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bu?id\b|\buser[\s_\-]*id\b|آيدي|ايدي|رقم\s*المستخدم|المعرف").unwrap()
});

/// Strings deduplicated by exact equality, kept in first-seen order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct OrderedSet {
    items: Vec<String>,
    seen: AHashSet<String>,
}

impl PartialEq for OrderedSet {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for OrderedSet {}

impl OrderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `value` was already present.
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.seen.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.items.push(value);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }
}

impl From<Vec<String>> for OrderedSet {
    fn from(items: Vec<String>) -> Self {
        let mut set = Self::new();
        for item in items {
            set.insert(item);
        }
        set
    }
}

impl Serialize for OrderedSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub emails: OrderedSet,
    pub phones: OrderedSet,
    pub ids: OrderedSet,
    pub names: OrderedSet,
    pub uuids: OrderedSet,
    pub mentions: OrderedSet,
    pub key_values: Vec<(String, String)>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
            && self.phones.is_empty()
            && self.ids.is_empty()
            && self.names.is_empty()
            && self.uuids.is_empty()
            && self.mentions.is_empty()
            && self.key_values.is_empty()
    }
}

/// Runs every detector over the block. Detectors are independent, so one
/// token may land in several categories.
pub fn extract_fields<S: AsRef<str>>(block: &[S]) -> ExtractedFields {
    let text = block.iter().map(|l| l.as_ref()).collect::<Vec<&str>>().join("\n");
    let mut out = ExtractedFields::default();

    for m in RE_EMAIL.find_iter(&text) {
        out.emails.insert(m.as_str());
    }
    for m in RE_PHONE.find_iter(&text) {
        let phone = balance_parens(m.as_str().trim());
        if is_plausible_phone(phone) {
            out.phones.insert(phone);
        }
    }
    for m in RE_UUID.find_iter(&text) {
        out.uuids.insert(m.as_str());
    }
    for cap in RE_MENTION.captures_iter(&text) {
        if let Some(handle) = cap.get(1) {
            out.mentions.insert(handle.as_str());
        }
    }

    for line in block {
        for (key, val) in key_values(line.as_ref()) {
            if RE_NAME_KEY.is_match(&key) {
                out.names.insert(val.clone());
            }
            if RE_ID_KEY.is_match(&key) {
                out.ids.insert(val.clone());
            }
            out.key_values.push((key, val));
        }
    }

    if out.names.is_empty() {
        if let Some(name) = block.iter().find_map(|l| rtl_name_line(l.as_ref())) {
            out.names.insert(name);
        }
    }

    // Permissive on purpose: any 6-20 char alphanumeric token with a digit.
    for m in RE_ID_TOKEN.find_iter(&text) {
        if m.as_str().bytes().any(|b| b.is_ascii_digit()) {
            out.ids.insert(m.as_str());
        }
    }

    out
}

/// All `key SEP value` pairs in `text`, trimmed, in discovery order.
pub fn key_values(text: &str) -> Vec<(String, String)> {
    RE_KEYVAL
        .captures_iter(text)
        .filter_map(|cap| {
            let key = cap.name("key")?.as_str().trim();
            let val = cap.name("val")?.as_str().trim();
            if key.chars().count() < 2 || !key.chars().any(char::is_alphabetic) || val.is_empty() {
                return None;
            }
            Some((key.to_string(), val.to_string()))
        })
        .collect()
}

fn is_plausible_phone(raw: &str) -> bool {
    let digits = raw.bytes().filter(u8::is_ascii_digit).count();
    (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits)
}

// Drops a leading `(` that never closes, e.g. `(+20 100 123 4567`.
fn balance_parens(raw: &str) -> &str {
    let opens = raw.matches('(').count();
    let closes = raw.matches(')').count();
    match raw.strip_prefix('(') {
        Some(rest) if opens > closes => rest.trim_start(),
        _ => raw,
    }
}

fn rtl_name_line(line: &str) -> Option<String> {
    let clean = line.trim();
    let len = clean.chars().count();
    if !(3..=60).contains(&len) {
        return None;
    }
    if clean.bytes().any(|b| b.is_ascii_digit()) || !RE_RTL.is_match(clean) {
        return None;
    }
    Some(clean.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_patterns() {
        for key in ["User_ID", "user-id", "Telegram ID", "uid", "ايدي", "رقم المستخدم"] {
            assert!(RE_ID_KEY.is_match(key), "{key}");
        }
        for key in ["username", "idea", "paid"] {
            assert!(!RE_ID_KEY.is_match(key), "{key}");
        }
        for key in ["Full Name", "full_name", "First Name", "اسم كامل", "الاسم"] {
            assert!(RE_NAME_KEY.is_match(key), "{key}");
        }
        for key in ["username", "nickname", "named_by"] {
            assert!(!RE_NAME_KEY.is_match(key), "{key}");
        }
    }

    #[test]
    fn unclosed_paren_is_dropped() {
        assert_eq!(balance_parens("(+20 100 123 4567"), "+20 100 123 4567");
        assert_eq!(balance_parens("(012) 345-6789"), "(012) 345-6789");
    }

    #[test]
    fn ordered_set_dedups_and_keeps_order() {
        let mut s = OrderedSet::new();
        assert!(s.insert("b"));
        assert!(s.insert("a"));
        assert!(!s.insert("b"));
        assert_eq!(s.as_slice(), &["b".to_string(), "a".to_string()]);
        assert_eq!(serde_json::to_string(&s).unwrap(), r#"["b","a"]"#);
    }

    #[test]
    fn rtl_fallback_skips_digits_and_latin() {
        assert_eq!(rtl_name_line("  محمد علي  ").as_deref(), Some("محمد علي"));
        assert!(rtl_name_line("محمد 2").is_none());
        assert!(rtl_name_line("John Smith").is_none());
        assert!(rtl_name_line("مح").is_none());
    }
}
