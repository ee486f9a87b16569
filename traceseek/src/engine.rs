use crate::aggregate::{AggregatedResult, Aggregator, MatchOccurrence, OccurrenceKind, TextContext};
use crate::context::Window;
use crate::error::{Result, ScanError};
use crate::extract;
use crate::json_sniff;
use crate::matcher::{MatchMode, Matcher};
use crate::record::{Record, DEFAULT_DELIMITER};
use crate::source::{FileSelection, SortOrder, SourceDocument};
use crate::timestamp::{TimestampNormalizer, TimezoneResolver, TzDatabase, DEFAULT_TIMEZONE};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Stop everything at the first matching line in sorted file order.
    FirstMatch,
    /// Keep going until input runs out or `max_results` occurrences exist (0 = no cap).
    Exhaustive { max_results: usize },
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        TerminationPolicy::Exhaustive { max_results: 0 }
    }
}

impl TerminationPolicy {
    fn cap(self) -> Option<usize> {
        match self {
            TerminationPolicy::FirstMatch => Some(1),
            TerminationPolicy::Exhaustive { max_results: 0 } => None,
            TerminationPolicy::Exhaustive { max_results } => Some(max_results),
        }
    }

    fn is_exhaustive(self) -> bool {
        matches!(self, TerminationPolicy::Exhaustive { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub query: String,
    pub mode: MatchMode,
    pub context_radius: usize,
    pub policy: TerminationPolicy,
    /// Report JSON objects containing the query (exhaustive mode only).
    pub sniff_json: bool,
    /// Look for `key: query` pairs in files with no other hit (exhaustive mode only).
    pub keyval_fallback: bool,
    /// Matched lines containing this delimiter are parsed as records.
    pub record_delimiter: Option<char>,
    pub timezone: String,
    pub sort_order: SortOrder,
    pub parallel: bool,
    pub skip_blank_lines: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            mode: MatchMode::default(),
            context_radius: DEFAULT_CONTEXT_RADIUS,
            policy: TerminationPolicy::default(),
            sniff_json: true,
            keyval_fallback: true,
            record_delimiter: Some(DEFAULT_DELIMITER),
            timezone: DEFAULT_TIMEZONE.to_string(),
            sort_order: SortOrder::default(),
            parallel: false,
            skip_blank_lines: true,
        }
    }
}

impl ScanConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_context_radius(mut self, radius: usize) -> Self {
        self.context_radius = radius;
        self
    }

    pub fn with_policy(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn first_match(self) -> Self {
        self.with_policy(TerminationPolicy::FirstMatch)
    }

    pub fn max_results(self, max_results: usize) -> Self {
        self.with_policy(TerminationPolicy::Exhaustive { max_results })
    }

    pub fn with_json_sniffing(mut self, on: bool) -> Self {
        self.sniff_json = on;
        self
    }

    pub fn with_keyval_fallback(mut self, on: bool) -> Self {
        self.keyval_fallback = on;
        self
    }

    pub fn with_record_delimiter(mut self, delimiter: Option<char>) -> Self {
        self.record_delimiter = delimiter;
        self
    }

    pub fn with_timezone(mut self, zone: impl Into<String>) -> Self {
        self.timezone = zone.into();
        self
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    pub fn parallel(mut self, on: bool) -> Self {
        self.parallel = on;
        self
    }
}

/// Cloneable cancellation handle shared by every file scan.
///
/// Holds the lowest file rank that must stop. `cancel` stops all files; a
/// first-match winner at rank `r` stops every file ranked after it while
/// earlier files keep running, so the lowest-ranked match always wins.
#[derive(Debug, Clone)]
pub struct CancelToken {
    floor: Arc<AtomicUsize>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self { floor: Arc::new(AtomicUsize::new(usize::MAX)) }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.floor.store(0, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.floor.load(Ordering::SeqCst) == 0
    }

    /// Cancels every file ranked after `rank`.
    pub fn supersede(&self, rank: usize) {
        self.floor.fetch_min(rank.saturating_add(1), Ordering::SeqCst);
    }

    pub fn stops(&self, rank: usize) -> bool {
        rank >= self.floor.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub results: AggregatedResult,
    pub files_scanned: usize,
    pub skipped: Vec<SkippedSource>,
    /// Scanned files whose invalid UTF-8 was replaced while decoding.
    pub lossy: Vec<PathBuf>,
    /// The scan was cancelled before input ran out.
    pub interrupted: bool,
}

enum FileScan {
    Scanned { hits: Vec<MatchOccurrence>, lossy: Option<PathBuf> },
    Skipped(SkippedSource),
    Abandoned,
}

/// Scans files for one query under one configuration.
pub struct ScanEngine {
    config: ScanConfig,
    matcher: Matcher,
    normalizer: TimestampNormalizer,
}

impl ScanEngine {
    /// Compiles the query. A bad regex fails here, before any file is opened.
    pub fn new(config: ScanConfig) -> Result<Self> {
        Self::with_resolver(config, &TzDatabase)
    }

    pub fn with_resolver(config: ScanConfig, resolver: &dyn TimezoneResolver) -> Result<Self> {
        if config.query.trim().is_empty() {
            return Err(ScanError::EmptyQuery);
        }
        let matcher = Matcher::new(&config.query, config.mode)?;
        let normalizer = TimestampNormalizer::new(resolver, &config.timezone);
        Ok(Self { config, matcher, normalizer })
    }

    pub fn scan(&self, selection: &FileSelection, cancel: &CancelToken) -> Result<ScanOutcome> {
        let paths = selection.resolve(self.config.sort_order)?;
        tracing::info!(files = paths.len(), source = %selection.describe(), policy = ?self.config.policy, "scan starting");
        Ok(self.scan_paths(&paths, cancel))
    }

    /// Scans `paths` in the order given.
    pub fn scan_paths(&self, paths: &[PathBuf], cancel: &CancelToken) -> ScanOutcome {
        let outcome = if self.config.parallel {
            self.scan_parallel(paths, cancel)
        } else {
            let scans = paths
                .iter()
                .enumerate()
                .map(|(rank, path)| self.scan_file(path, rank, cancel));
            self.merge(scans, cancel)
        };
        tracing::info!(
            occurrences = outcome.results.total(),
            files_scanned = outcome.files_scanned,
            skipped = outcome.skipped.len(),
            interrupted = outcome.interrupted,
            "scan finished"
        );
        outcome
    }

    fn scan_parallel(&self, paths: &[PathBuf], cancel: &CancelToken) -> ScanOutcome {
        let first_match = self.config.policy == TerminationPolicy::FirstMatch;
        let scans: Vec<FileScan> = paths
            .par_iter()
            .enumerate()
            .map(|(rank, path)| {
                let scan = self.scan_file(path, rank, cancel);
                if first_match && matches!(&scan, FileScan::Scanned { hits, .. } if !hits.is_empty()) {
                    tracing::debug!(rank, path = %path.display(), "match found, cancelling later files");
                    cancel.supersede(rank);
                }
                scan
            })
            .collect();
        // collect() keeps input order, so merging replays the sequential scan.
        self.merge(scans, cancel)
    }

    fn merge(&self, scans: impl IntoIterator<Item = FileScan>, cancel: &CancelToken) -> ScanOutcome {
        let cap = self.config.policy.cap();
        let mut agg = Aggregator::new();
        let mut outcome = ScanOutcome::default();
        'files: for scan in scans {
            match scan {
                FileScan::Abandoned => continue,
                FileScan::Skipped(skipped) => outcome.skipped.push(skipped),
                FileScan::Scanned { hits, lossy } => {
                    outcome.files_scanned += 1;
                    outcome.lossy.extend(lossy);
                    for hit in hits {
                        agg.push(hit);
                        if cap.is_some_and(|c| agg.total() >= c) {
                            break 'files;
                        }
                    }
                }
            }
        }
        outcome.results = agg.finish();
        outcome.interrupted = cancel.is_cancelled();
        outcome
    }

    fn scan_file(&self, path: &Path, rank: usize, cancel: &CancelToken) -> FileScan {
        if cancel.stops(rank) {
            return FileScan::Abandoned;
        }
        match SourceDocument::read(path) {
            Ok(doc) => FileScan::Scanned {
                hits: self.scan_document_ranked(&doc, rank, cancel),
                lossy: doc.lossy.then(|| doc.path.clone()),
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable file");
                FileScan::Skipped(SkippedSource { path: path.to_path_buf(), reason: err.to_string() })
            }
        }
    }

    /// Occurrences for one document, honouring the policy's per-file cap.
    pub fn scan_document(&self, doc: &SourceDocument) -> Vec<MatchOccurrence> {
        self.scan_document_ranked(doc, 0, &CancelToken::new())
    }

    fn scan_document_ranked(&self, doc: &SourceDocument, rank: usize, cancel: &CancelToken) -> Vec<MatchOccurrence> {
        let policy = self.config.policy;
        let cap = policy.cap();
        let full = policy.is_exhaustive();
        let mut out = Vec::new();
        let reached = |n: usize| cap.is_some_and(|c| n >= c);

        if full && self.config.sniff_json {
            for hit in json_sniff::matching_values(&doc.text(), &self.matcher) {
                out.push(MatchOccurrence::new(
                    &doc.path,
                    OccurrenceKind::JsonObject { excerpt: hit.excerpt, full_object: hit.value },
                ));
                if reached(out.len()) {
                    return out;
                }
            }
        }

        for (idx, line) in doc.lines.iter().enumerate() {
            if cancel.stops(rank) {
                return out;
            }
            if self.config.skip_blank_lines && line.trim().is_empty() {
                continue;
            }
            if !self.matcher.is_match(line) {
                continue;
            }
            out.push(MatchOccurrence::new(&doc.path, OccurrenceKind::TextContext(self.text_context(doc, idx))));
            if reached(out.len()) {
                return out;
            }
        }

        if full && self.config.keyval_fallback && out.is_empty() {
            for line in &doc.lines {
                for (key, value) in extract::key_values(line) {
                    if !self.matcher.equals_value(&value) {
                        continue;
                    }
                    out.push(MatchOccurrence::new(&doc.path, OccurrenceKind::KeyvalMatch { key, value }));
                    if reached(out.len()) {
                        return out;
                    }
                }
            }
        }
        out
    }

    fn text_context(&self, doc: &SourceDocument, idx: usize) -> TextContext {
        let line = &doc.lines[idx];
        let window = Window::around(doc.len(), idx + 1, self.config.context_radius);
        let block = window.slice(&doc.lines).to_vec();
        let extracted = extract::extract_fields(&block);
        let record = self
            .config
            .record_delimiter
            .filter(|d| line.contains(*d))
            .map(|d| Record::parse(line, d));
        let timestamp = record
            .as_ref()
            .map(|r| self.normalizer.normalize(&r.timestamp_raw))
            .filter(|t| !t.is_empty());
        TextContext {
            line_index: idx,
            line_number: idx + 1,
            match_text: line.trim().to_string(),
            context_start: window.start,
            context_end: window.end,
            excerpt: block.join("\n"),
            context_block: block,
            extracted,
            record,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(lines: &[&str]) -> SourceDocument {
        SourceDocument::from_text("mem.txt", &lines.join("\n"), false)
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(matches!(ScanEngine::new(ScanConfig::new("  ")), Err(ScanError::EmptyQuery)));
    }

    #[test]
    fn invalid_regex_fails_before_scanning() {
        let cfg = ScanConfig::new("[oops").with_mode(MatchMode { regex: true, ..Default::default() });
        assert!(matches!(ScanEngine::new(cfg), Err(ScanError::InvalidPattern { .. })));
    }

    #[test]
    fn text_context_carries_window_and_record() {
        let engine = ScanEngine::new(ScanConfig::new("mona_h").with_context_radius(1)).unwrap();
        let d = doc(&[
            "header",
            "7|Mona|Hassan|+201001234567|42|mona_h|1561135881",
            "footer",
            "tail",
        ]);
        let hits = engine.scan_document(&d);
        assert_eq!(hits.len(), 1);
        let t = hits[0].text_context().unwrap();
        assert_eq!((t.line_index, t.line_number), (1, 2));
        assert_eq!((t.context_start, t.context_end), (1, 3));
        assert_eq!(t.context_block, ["header", "7|Mona|Hassan|+201001234567|42|mona_h|1561135881", "footer"]);
        let rec = t.record.as_ref().unwrap();
        assert_eq!(rec.username, "mona_h");
        assert_eq!(t.timestamp.as_deref(), Some("2019-06-21 18:51:21 (Africa/Cairo)"));
        assert!(t.extracted.phones.contains("+201001234567"));
    }

    #[test]
    fn first_match_returns_one_line_only() {
        let engine = ScanEngine::new(ScanConfig::new("x").first_match()).unwrap();
        let hits = engine.scan_document(&doc(&["x 1", "x 2", "{\"x\":1}"]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text_context().unwrap().line_number, 1);
    }

    #[test]
    fn superseded_rank_stops_but_earlier_rank_runs() {
        let token = CancelToken::new();
        token.supersede(3);
        assert!(!token.stops(2));
        assert!(!token.stops(3));
        assert!(token.stops(4));
        token.supersede(5);
        assert!(token.stops(4));
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.stops(0));
        assert!(token.is_cancelled());
    }
}
