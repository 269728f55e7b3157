//! # Error Types
//!
//! Library-level failures of the analysis pipeline. The binary wraps these in
//! `anyhow::Error` with additional context; library callers can match on the
//! variants to decide whether a failure is fatal to one run or to the batch.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the parsing, aggregation, and filtering stages
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The log header lacks one or more of the required columns
    #[error("malformed traffic log {path}: missing required column(s) {}", .missing.join(", "))]
    MalformedLog { path: PathBuf, missing: Vec<String> },

    /// The input path does not exist
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A filter or grouping step left no rows to work with
    #[error("no results for {context}")]
    EmptyResult { context: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A label registry file could not be read or decoded
    #[error("invalid label registry {path}: {source}")]
    InvalidRegistry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A label registry entry produced an unusable match pattern
    #[error("invalid identity pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl AnalysisError {
    pub(crate) fn empty(context: impl Into<String>) -> Self {
        Self::EmptyResult {
            context: context.into(),
        }
    }

    /// Whether this error concerns a single run and may be skipped in a batch
    pub fn is_per_run(&self) -> bool {
        matches!(
            self,
            Self::MalformedLog { .. } | Self::FileNotFound { .. } | Self::Io { .. } | Self::Csv { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_log_message_lists_columns() {
        let err = AnalysisError::MalformedLog {
            path: PathBuf::from("run/TrafficInformation.csv"),
            missing: vec!["status".to_string(), "senttime".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("status, senttime"));
        assert!(msg.contains("run/TrafficInformation.csv"));
        assert!(err.is_per_run());
    }

    #[test]
    fn test_empty_result_is_not_per_run() {
        let err = AnalysisError::empty("algorithm DOR");
        assert_eq!(err.to_string(), "no results for algorithm DOR");
        assert!(!err.is_per_run());
    }
}
