use crate::error::{Result, ScanError};
use globset::Glob;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// Which files make up the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelection {
    /// File names in `folder` matching a glob such as `Wiretun_*.txt`.
    /// Falls back to every `.txt` file when nothing matches.
    Glob { folder: PathBuf, pattern: String },
    /// `prefix{start..=end}.extension`, in sequence order.
    Numbered {
        folder: PathBuf,
        prefix: String,
        start: u32,
        end: u32,
        extension: String,
    },
    /// Every `.txt` file directly inside `folder`.
    AllText { folder: PathBuf },
    /// Explicit paths, scanned in the given order.
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Lexical,
    /// `part_2.txt` before `part_10.txt`.
    #[default]
    Numeric,
}

impl FileSelection {
    pub fn describe(&self) -> String {
        match self {
            FileSelection::Glob { folder, pattern } => format!("{}/{pattern}", folder.display()),
            FileSelection::Numbered { folder, prefix, start, end, extension } => {
                format!("{}/{prefix}{{{start}..{end}}}.{extension}", folder.display())
            }
            FileSelection::AllText { folder } => format!("{}/*.txt", folder.display()),
            FileSelection::Files(paths) => format!("{} explicit file(s)", paths.len()),
        }
    }

    /// Resolves the selection into a stable, ordered list of paths.
    ///
    /// The order decides which occurrence wins under the first-match policy.
    pub fn resolve(&self, order: SortOrder) -> Result<Vec<PathBuf>> {
        match self {
            FileSelection::Glob { folder, pattern } => {
                let glob = Glob::new(pattern)
                    .map_err(|source| ScanError::InvalidGlob { pattern: pattern.clone(), source })?
                    .compile_matcher();
                let mut files = list_files(folder, |name| glob.is_match(name))?;
                if files.is_empty() {
                    tracing::info!(pattern = %pattern, folder = %folder.display(), "no files matched, falling back to *.txt");
                    files = list_files(folder, is_text_file)?;
                }
                sort_paths(&mut files, order);
                Ok(files)
            }
            FileSelection::Numbered { folder, prefix, start, end, extension } => {
                let ext = extension.trim_start_matches('.');
                Ok((*start..=*end)
                    .map(|n| folder.join(format!("{prefix}{n}.{ext}")))
                    .collect())
            }
            FileSelection::AllText { folder } => {
                let mut files = list_files(folder, is_text_file)?;
                sort_paths(&mut files, order);
                Ok(files)
            }
            FileSelection::Files(paths) => Ok(paths.clone()),
        }
    }
}

fn is_text_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
}

fn list_files(folder: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let unavailable = |source: std::io::Error| ScanError::SourceUnavailable { path: folder.to_path_buf(), source };
    let mut out = Vec::new();
    for entry in fs::read_dir(folder).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if keep(&name.to_string_lossy()) {
            out.push(path);
        }
    }
    Ok(out)
}

pub fn sort_paths(paths: &mut [PathBuf], order: SortOrder) {
    match order {
        SortOrder::Lexical => paths.sort(),
        SortOrder::Numeric => paths.sort_by(|a, b| compare_numeric(a, b)),
    }
}

fn compare_numeric(a: &Path, b: &Path) -> Ordering {
    let (pa, na) = numeric_key(a);
    let (pb, nb) = numeric_key(b);
    a.parent()
        .cmp(&b.parent())
        .then_with(|| pa.cmp(&pb))
        .then_with(|| na.cmp(&nb))
        .then_with(|| a.cmp(b))
}

/// File stem split into the text before its trailing digit run and that run's value.
fn numeric_key(path: &Path) -> (String, Option<u64>) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits_at = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    match digits_at {
        Some(i) => match stem[i..].parse::<u64>() {
            Ok(n) => (stem[..i].to_string(), Some(n)),
            Err(_) => (stem, None),
        },
        None => (stem, None),
    }
}

/// One input file, split into lines.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub lines: Vec<String>,
    /// Set when the bytes were not valid UTF-8 and invalid sequences were replaced.
    pub lossy: bool,
}

impl SourceDocument {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|source| ScanError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        let (text, lossy) = match String::from_utf8(bytes) {
            Ok(s) => (s, false),
            Err(e) => {
                tracing::debug!(path = %path.display(), "not valid UTF-8, decoding lossily");
                (String::from_utf8_lossy(e.as_bytes()).into_owned(), true)
            }
        };
        Ok(Self::from_text(path, &text, lossy))
    }

    pub fn from_text(path: impl Into<PathBuf>, text: &str, lossy: bool) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_string).collect(),
            lossy,
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
