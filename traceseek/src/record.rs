use serde::{Deserialize, Serialize};

pub const RECORD_FIELDS: usize = 7;
pub const DEFAULT_DELIMITER: char = '|';

/// One row of the fixed `index|first|last|phone|number|username|timestamp` schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub index: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub number: String,
    pub username: String,
    pub timestamp_raw: String,
}

impl Record {
    /// Splits `line` on `delimiter`, trimming each field.
    ///
    /// Short rows are padded with empty fields. Fields after the seventh are
    /// dropped (schema overflow is truncated, not folded into the last field).
    pub fn parse(line: &str, delimiter: char) -> Self {
        let mut parts = line
            .trim_end_matches(['\r', '\n'])
            .split(delimiter)
            .map(|p| p.trim().to_string());
        let mut next = || parts.next().unwrap_or_default();
        Self {
            index: next(),
            first_name: next(),
            last_name: next(),
            phone: next(),
            number: next(),
            username: next(),
            timestamp_raw: next(),
        }
    }

    pub fn fields(&self) -> [&str; RECORD_FIELDS] {
        [
            &self.index,
            &self.first_name,
            &self.last_name,
            &self.phone,
            &self.number,
            &self.username,
            &self.timestamp_raw,
        ]
    }
}
