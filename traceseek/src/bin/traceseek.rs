use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Once;
use traceseek::engine::DEFAULT_CONTEXT_RADIUS;
use traceseek::output::{self, OutputFormat};
use traceseek::timestamp::DEFAULT_TIMEZONE;
use traceseek::{CancelToken, FileSelection, MatchMode, ScanConfig, ScanEngine, ScanError, SortOrder, TerminationPolicy};
use tracing_subscriber::EnvFilter;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_logging(verbose: bool) {
    let default = if verbose { "traceseek=debug" } else { "traceseek=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(name = "traceseek", version, about = "Find a user or identifier in text dumps and extract what surrounds it")]
struct Cli {
    /// Query words (joined with spaces). Alternative to --query.
    words: Vec<String>,

    /// Username, id or text to look for
    #[arg(long = "query", short = 'q', visible_alias = "user", visible_short_alias = 'u')]
    query: Option<String>,

    /// Folder holding the text files
    #[arg(long = "folder", short = 'f')]
    folder: Option<PathBuf>,
    /// Scan these files instead of a folder. May be repeated.
    #[arg(long = "file")]
    files: Vec<PathBuf>,
    /// File name glob inside --folder, e.g. 'Wiretun_*.txt'
    #[arg(long = "pattern", short = 'p')]
    pattern: Option<String>,
    /// Numbered sequence PREFIX:START:END inside --folder, e.g. Wiretun_:1:35
    #[arg(long = "numbered")]
    numbered: Option<String>,
    /// File ordering: numeric | lexical
    #[arg(long = "sort", default_value = "numeric")]
    sort: String,

    #[arg(long = "regex", default_value_t = false)] regex: bool,
    #[arg(long = "partial", default_value_t = false)] partial: bool,
    #[arg(long = "ignore-case", short = 'i', default_value_t = false)] ignore_case: bool,
    /// Lines of context before and after each match
    #[arg(long = "context", short = 'c', default_value_t = DEFAULT_CONTEXT_RADIUS)] context: usize,
    /// Stop after this many occurrences (0 = unlimited)
    #[arg(long = "max-results", default_value_t = 0)] max_results: usize,
    /// Stop at the first matching line across all files
    #[arg(long = "first", default_value_t = false)] first: bool,
    #[arg(long = "no-json", default_value_t = false)] no_json: bool,
    #[arg(long = "no-keyval", default_value_t = false)] no_keyval: bool,
    /// Record field delimiter
    #[arg(long = "delimiter", default_value_t = '|')] delimiter: char,
    #[arg(long = "no-records", default_value_t = false)] no_records: bool,
    /// Zone used to render record timestamps
    #[arg(long = "timezone", default_value = DEFAULT_TIMEZONE)] timezone: String,
    /// Scan files on all cores
    #[arg(long = "parallel", default_value_t = false)] parallel: bool,

    /// Write results here instead of stdout
    #[arg(long = "output", short = 'o')]
    output: Option<PathBuf>,
    /// Output format: json | csv (default: from the output extension)
    #[arg(long = "format")]
    format: Option<String>,
    #[arg(long = "verbose", short = 'v', default_value_t = false)] verbose: bool,
}

impl Cli {
    fn query(&self) -> anyhow::Result<String> {
        let q = match &self.query {
            Some(q) => q.clone(),
            None => self.words.join(" "),
        };
        if q.trim().is_empty() {
            bail!("a query is required (positional or --query)");
        }
        Ok(q.trim().to_string())
    }

    fn selection(&self) -> anyhow::Result<FileSelection> {
        if !self.files.is_empty() {
            return Ok(FileSelection::Files(self.files.clone()));
        }
        let folder = self.folder.clone().unwrap_or_else(|| PathBuf::from("."));
        if let Some(seq) = &self.numbered {
            let parts: Vec<&str> = seq.rsplitn(3, ':').collect();
            let [end, start, prefix] = parts.as_slice() else {
                bail!("--numbered expects PREFIX:START:END, got {seq:?}");
            };
            return Ok(FileSelection::Numbered {
                folder,
                prefix: prefix.to_string(),
                start: start.parse().with_context(|| format!("bad start in {seq:?}"))?,
                end: end.parse().with_context(|| format!("bad end in {seq:?}"))?,
                extension: "txt".into(),
            });
        }
        Ok(match &self.pattern {
            Some(pattern) => FileSelection::Glob { folder, pattern: pattern.clone() },
            None => FileSelection::AllText { folder },
        })
    }

    fn config(&self) -> anyhow::Result<ScanConfig> {
        let sort = match self.sort.as_str() {
            "lexical" => SortOrder::Lexical,
            "numeric" => SortOrder::Numeric,
            other => bail!("unknown --sort {other:?} (numeric | lexical)"),
        };
        let policy = if self.first {
            TerminationPolicy::FirstMatch
        } else {
            TerminationPolicy::Exhaustive { max_results: self.max_results }
        };
        Ok(ScanConfig::new(self.query()?)
            .with_mode(MatchMode { regex: self.regex, partial: self.partial, ignore_case: self.ignore_case })
            .with_context_radius(self.context)
            .with_policy(policy)
            .with_json_sniffing(!self.no_json)
            .with_keyval_fallback(!self.no_keyval)
            .with_record_delimiter((!self.no_records).then_some(self.delimiter))
            .with_timezone(self.timezone.clone())
            .with_sort_order(sort)
            .parallel(self.parallel))
    }

    fn output_format(&self) -> anyhow::Result<OutputFormat> {
        match (self.format.as_deref(), &self.output) {
            (Some("json"), _) => Ok(OutputFormat::Json),
            (Some("csv"), _) => Ok(OutputFormat::Csv),
            (Some(other), _) => bail!("unknown --format {other:?} (json | csv)"),
            (None, Some(path)) => Ok(OutputFormat::from_path(path)),
            (None, None) => Ok(OutputFormat::Json),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.parallel {
        init_parallelism();
    }

    let config = cli.config()?;
    let selection = cli.selection()?;
    let format = cli.output_format()?;
    let engine = ScanEngine::new(config)?;

    let cancel = CancelToken::new();
    {
        let c = cancel.clone();
        let _ = ctrlc::set_handler(move || c.cancel());
    }

    let outcome = engine.scan(&selection, &cancel)?;
    if outcome.files_scanned == 0 && outcome.skipped.is_empty() && !outcome.interrupted {
        return Err(ScanError::NoSources { description: selection.describe() }.into());
    }
    for s in &outcome.skipped {
        eprintln!("skipped {}: {}", s.path.display(), s.reason);
    }
    for path in &outcome.lossy {
        eprintln!("invalid UTF-8 replaced in {}", path.display());
    }

    let write_failure = match &cli.output {
        Some(path) => match output::write_to_path(&outcome.results, path, format) {
            Ok(()) => {
                eprintln!("results written to {}", path.display());
                None
            }
            // The result is still in memory, so print it before failing.
            Err(err) => {
                eprintln!("{err}; printing results to stdout");
                print_results(&outcome.results, format)?;
                Some(err)
            }
        },
        None => {
            print_results(&outcome.results, format)?;
            None
        }
    };

    print_summary(&outcome);
    match write_failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn print_results(results: &traceseek::AggregatedResult, format: OutputFormat) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    match format {
        OutputFormat::Json => output::write_json(results, &mut lock)?,
        OutputFormat::Csv => output::write_csv(results, &mut lock)?,
    }
    Ok(())
}

fn print_summary(outcome: &traceseek::ScanOutcome) {
    if outcome.results.is_empty() {
        eprintln!("no matches ({} file(s) scanned)", outcome.files_scanned);
        return;
    }
    for f in outcome.results.files() {
        let first_line = f
            .occurrences
            .iter()
            .find_map(|o| o.text_context().map(|t| t.line_number));
        match first_line {
            Some(n) => eprintln!("{:<6} {}  (first match line {n})", f.occurrences.len(), f.file),
            None => eprintln!("{:<6} {}", f.occurrences.len(), f.file),
        }
    }
    if outcome.interrupted {
        eprintln!("interrupted: results are partial");
    }
}
