//! Structured error type shared by every pipeline stage.
//!
//! Every failure is fatal to the stage that raised it. Variants carry enough
//! context (offending values, found vs. expected columns) to diagnose a bad
//! run from the log alone.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of offending values quoted in an error message.
pub const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("no JSON files found in: {}", .0.display())]
    NoRawFiles(PathBuf),

    #[error("invalid JSON in {}: {reason}", .path.display())]
    Json { path: PathBuf, reason: String },

    #[error(
        "could not find list of records in JSON payload: expected an array, \
         or an object with an array under Prices/prices/data/results/items ({0})"
    )]
    UnrecognizedPayload(String),

    #[error("missing required columns {missing:?}; found {found:?}")]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("some {column} values could not be parsed as timestamps; examples: {examples:?}")]
    UnparseableTimestamps {
        column: String,
        examples: Vec<String>,
    },

    #[error("column '{column}' has non-numeric values; examples: {examples:?}")]
    NonNumericValues {
        column: String,
        examples: Vec<String>,
    },

    #[error("column '{column}' has {count} null values")]
    NullValues { column: String, count: usize },

    #[error("table contains 0 rows: {}", .0.display())]
    EmptyTable(PathBuf),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("expected output not created: {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("another pipeline run holds the lock: {}", .0.display())]
    RunInProgress(PathBuf),

    #[error("pipeline exceeded its {budget_secs}s run timeout during {stage}")]
    Timeout { stage: String, budget_secs: u64 },
}

impl EtlError {
    /// Wrap an `io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_message_lists_both_sides() {
        let err = EtlError::MissingColumns {
            missing: vec!["Price_with_VAT".into()],
            found: vec!["ReadingDate".into(), "Price".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Price_with_VAT"));
        assert!(msg.contains("ReadingDate"));
    }

    #[test]
    fn null_values_message_names_count() {
        let err = EtlError::NullValues {
            column: "Price".into(),
            count: 3,
        };
        assert_eq!(err.to_string(), "column 'Price' has 3 null values");
    }
}
