use crate::error::{Result, ScanError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How a query is compared against a line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMode {
    /// Treat the query as a regular expression.
    pub regex: bool,
    /// Literal queries match anywhere instead of as a whole word.
    pub partial: bool,
    pub ignore_case: bool,
}

/// Compiled line predicate for one query.
///
/// Literal queries are escaped and, unless `partial` is set, wrapped in
/// word boundaries so `ahmed` does not fire on `ahmedx`.
#[derive(Debug, Clone)]
pub struct Matcher {
    query: String,
    mode: MatchMode,
    re: Regex,
    folded_query: String,
}

impl Matcher {
    pub fn new(query: &str, mode: MatchMode) -> Result<Self> {
        let source = if mode.regex {
            query.to_string()
        } else {
            let escaped = regex::escape(query);
            if mode.partial {
                escaped
            } else {
                format!(r"\b{escaped}\b")
            }
        };
        let re = RegexBuilder::new(&source)
            .case_insensitive(mode.ignore_case)
            .build()
            .map_err(|source| ScanError::InvalidPattern {
                pattern: query.to_string(),
                source,
            })?;
        Ok(Self {
            query: query.to_string(),
            mode,
            re,
            folded_query: query.to_lowercase(),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.re.is_match(line)
    }

    /// Substring test used for serialized JSON; regex mode defers to the pattern.
    pub fn contained_in(&self, haystack: &str) -> bool {
        if self.mode.regex {
            return self.re.is_match(haystack);
        }
        if self.mode.ignore_case {
            haystack.to_lowercase().contains(&self.folded_query)
        } else {
            haystack.contains(&self.query)
        }
    }

    /// Whole-value comparison used by the key/value fallback.
    pub fn equals_value(&self, value: &str) -> bool {
        let value = value.trim();
        if self.mode.regex {
            return self.re.is_match(value);
        }
        if self.mode.ignore_case {
            value.to_lowercase() == self.folded_query
        } else {
            value == self.query
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(regex: bool, partial: bool, ignore_case: bool) -> MatchMode {
        MatchMode { regex, partial, ignore_case }
    }

    #[test]
    fn whole_word_rejects_longer_token() {
        let m = Matcher::new("ahmed", mode(false, false, false)).unwrap();
        assert!(m.is_match("user: ahmed"));
        assert!(m.is_match("ahmed|x"));
        assert!(!m.is_match("user: ahmedx"));
    }

    #[test]
    fn partial_matches_substring() {
        let m = Matcher::new("ahmed", mode(false, true, false)).unwrap();
        assert!(m.is_match("user: ahmedx"));
        assert!(!m.is_match("user: AHMED"));
    }

    #[test]
    fn ignore_case_applies_to_literal_and_regex() {
        let lit = Matcher::new("Ahmed", mode(false, false, true)).unwrap();
        assert!(lit.is_match("AHMED was here"));
        let re = Matcher::new(r"ah+med\d", mode(true, false, true)).unwrap();
        assert!(re.is_match("AHHMED7"));
    }

    #[test]
    fn literal_queries_are_escaped() {
        let m = Matcher::new("a.b", mode(false, true, false)).unwrap();
        assert!(m.is_match("x a.b y"));
        assert!(!m.is_match("x acb y"));
    }

    #[test]
    fn bad_regex_is_invalid_pattern() {
        let err = Matcher::new("(unclosed", mode(true, false, false)).unwrap_err();
        assert!(matches!(err, ScanError::InvalidPattern { .. }));
    }

    #[test]
    fn equals_value_obeys_case_rule() {
        let m = Matcher::new("ahmed", mode(false, false, true)).unwrap();
        assert!(m.equals_value(" AHMED "));
        assert!(!m.equals_value("ahmed ali"));
        let strict = Matcher::new("ahmed", mode(false, false, false)).unwrap();
        assert!(!strict.equals_value("Ahmed"));
    }
}
