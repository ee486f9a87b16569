pub mod error;
pub mod matcher;
pub mod context;
pub mod extract;
pub mod json_sniff;
pub mod record;
pub mod timestamp;
pub mod source;
pub mod aggregate;
pub mod engine;
pub mod output;

pub use aggregate::{AggregatedResult, MatchOccurrence, OccurrenceKind};
pub use engine::{CancelToken, ScanConfig, ScanEngine, ScanOutcome, TerminationPolicy};
pub use error::{Result, ScanError};
pub use matcher::MatchMode;
pub use source::{FileSelection, SortOrder};
