use crate::extract::ExtractedFields;
use crate::record::Record;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A matched line together with the signals pulled out of its context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContext {
    /// 0-based position of the matched line.
    pub line_index: usize,
    /// 1-based position of the matched line.
    pub line_number: usize,
    pub match_text: String,
    pub context_start: usize,
    pub context_end: usize,
    pub context_block: Vec<String>,
    pub excerpt: String,
    pub extracted: ExtractedFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OccurrenceKind {
    TextContext(TextContext),
    JsonObject { excerpt: String, full_object: Value },
    KeyvalMatch { key: String, value: String },
}

impl OccurrenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            OccurrenceKind::TextContext(_) => "text_context",
            OccurrenceKind::JsonObject { .. } => "json_object",
            OccurrenceKind::KeyvalMatch { .. } => "keyval_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOccurrence {
    #[serde(skip)]
    pub source: PathBuf,
    #[serde(flatten)]
    pub kind: OccurrenceKind,
}

impl MatchOccurrence {
    pub fn new(source: &Path, kind: OccurrenceKind) -> Self {
        Self { source: source.to_path_buf(), kind }
    }

    pub fn text_context(&self) -> Option<&TextContext> {
        match &self.kind {
            OccurrenceKind::TextContext(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOccurrences {
    pub file: String,
    pub occurrences: Vec<MatchOccurrence>,
}

/// Occurrences grouped by file, in file-processing order.
///
/// Serializes as a JSON object keyed by file path; key order follows the scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResult {
    files: Vec<FileOccurrences>,
}

impl AggregatedResult {
    pub fn files(&self) -> &[FileOccurrences] {
        &self.files
    }

    pub fn get(&self, file: &str) -> Option<&[MatchOccurrence]> {
        self.files
            .iter()
            .find(|f| f.file == file)
            .map(|f| f.occurrences.as_slice())
    }

    pub fn total(&self) -> usize {
        self.files.iter().map(|f| f.occurrences.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All occurrences in file order, then discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &MatchOccurrence> {
        self.files.iter().flat_map(|f| f.occurrences.iter())
    }
}

impl Serialize for AggregatedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.files.len()))?;
        for f in &self.files {
            map.serialize_entry(&f.file, &f.occurrences)?;
        }
        map.end()
    }
}

/// Single writer for [`AggregatedResult`]. Every occurrence is kept; two hits
/// in one file are separate evidence.
#[derive(Debug, Default)]
pub struct Aggregator {
    result: AggregatedResult,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, occurrence: MatchOccurrence) {
        let key = occurrence.source.display().to_string();
        match self.result.files.last_mut() {
            Some(last) if last.file == key => last.occurrences.push(occurrence),
            _ => match self.result.files.iter_mut().find(|f| f.file == key) {
                Some(existing) => existing.occurrences.push(occurrence),
                None => self.result.files.push(FileOccurrences { file: key, occurrences: vec![occurrence] }),
            },
        }
    }

    pub fn total(&self) -> usize {
        self.result.total()
    }

    pub fn finish(self) -> AggregatedResult {
        self.result
    }
}
