use crate::aggregate::{AggregatedResult, MatchOccurrence, OccurrenceKind};
use crate::error::{Result, ScanError};
use itertools::Itertools;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    /// `.csv` means CSV, anything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => OutputFormat::Csv,
            _ => OutputFormat::Json,
        }
    }
}

const CSV_HEADER: [&str; 14] = [
    "file", "type", "line_number", "match_text", "emails", "phones", "ids", "names", "uuids",
    "mentions", "key_values", "key", "value", "timestamp",
];

const STREAM: &str = "<stream>";

/// Writes `result` to `path`. The in-memory result is untouched on failure.
pub fn write_to_path(result: &AggregatedResult, path: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(path).map_err(|source| write_failed(path, source))?;
    let mut w = BufWriter::new(file);
    match format {
        OutputFormat::Json => json_into(result, &mut w, path)?,
        OutputFormat::Csv => csv_into(result, &mut w, path)?,
    }
    w.flush().map_err(|source| write_failed(path, source))
}

/// Pretty JSON, non-ASCII text kept as-is.
pub fn write_json<W: Write>(result: &AggregatedResult, w: &mut W) -> Result<()> {
    json_into(result, w, Path::new(STREAM))
}

/// One row per occurrence; list cells are joined with `; `.
pub fn write_csv<W: Write>(result: &AggregatedResult, w: W) -> Result<()> {
    csv_into(result, w, Path::new(STREAM))
}

fn json_into<W: Write>(result: &AggregatedResult, w: &mut W, path: &Path) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, result).map_err(|e| {
        if e.is_io() {
            write_failed(path, e.into())
        } else {
            ScanError::Serialize(e)
        }
    })?;
    w.write_all(b"\n").map_err(|source| write_failed(path, source))
}

fn csv_into<W: Write>(result: &AggregatedResult, w: W, path: &Path) -> Result<()> {
    let csv_err = |e: csv::Error| {
        if let csv::ErrorKind::Io(source) = e.kind() {
            return write_failed(path, io::Error::new(source.kind(), source.to_string()));
        }
        ScanError::Csv(e)
    };
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(CSV_HEADER).map_err(csv_err)?;
    for file in result.files() {
        for occ in &file.occurrences {
            wtr.write_record(csv_row(&file.file, occ)).map_err(csv_err)?;
        }
    }
    wtr.flush().map_err(|source| write_failed(path, source))
}

fn write_failed(path: &Path, source: io::Error) -> ScanError {
    ScanError::OutputWrite { path: path.to_path_buf(), source }
}

fn csv_row(file: &str, occ: &MatchOccurrence) -> Vec<String> {
    let mut row = vec![String::new(); CSV_HEADER.len()];
    row[0] = file.to_string();
    row[1] = occ.kind.label().to_string();
    match &occ.kind {
        OccurrenceKind::TextContext(t) => {
            let ex = &t.extracted;
            row[2] = t.line_number.to_string();
            row[3] = t.match_text.clone();
            row[4] = ex.emails.iter().join("; ");
            row[5] = ex.phones.iter().join("; ");
            row[6] = ex.ids.iter().join("; ");
            row[7] = ex.names.iter().join("; ");
            row[8] = ex.uuids.iter().join("; ");
            row[9] = ex.mentions.iter().join("; ");
            row[10] = ex.key_values.iter().map(|(k, v)| format!("{k}: {v}")).join("; ");
            row[13] = t.timestamp.clone().unwrap_or_default();
        }
        OccurrenceKind::JsonObject { excerpt, .. } => {
            row[3] = excerpt.clone();
        }
        OccurrenceKind::KeyvalMatch { key, value } => {
            row[11] = key.clone();
            row[12] = value.clone();
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn one_hit() -> AggregatedResult {
        let mut agg = crate::aggregate::Aggregator::new();
        agg.push(MatchOccurrence {
            source: "a.txt".into(),
            kind: OccurrenceKind::KeyvalMatch { key: "user".into(), value: "mona".into() },
        });
        agg.finish()
    }

    #[test]
    fn io_failures_inside_writers_are_output_errors() {
        let result = one_hit();
        let err = json_into(&result, &mut BrokenPipe, Path::new("res.json")).unwrap_err();
        assert!(matches!(err, ScanError::OutputWrite { ref path, .. } if path == Path::new("res.json")));
        let err = csv_into(&result, BrokenPipe, Path::new("res.csv")).unwrap_err();
        assert!(matches!(err, ScanError::OutputWrite { ref path, .. } if path == Path::new("res.csv")));
        assert!(matches!(write_json(&result, &mut BrokenPipe).unwrap_err(), ScanError::OutputWrite { .. }));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out.CSV")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("out.json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("out")), OutputFormat::Json);
    }
}
