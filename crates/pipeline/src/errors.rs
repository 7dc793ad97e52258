//! Error types for the feature pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by pipeline stages.
///
/// Variants are split into two classes: those that abort the whole stage
/// (see [`PipelineError::is_fatal_for_run`]) and those that only cost the
/// offending file, which the stage logs and skips.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required input directory or file does not exist
    #[error("input not found: {0}")]
    MissingInputDir(PathBuf),

    /// A weather table has no column matching any time keyword
    #[error("{file}: no time column matches any of {keywords:?}")]
    NoTimeColumn { file: String, keywords: Vec<String> },

    /// A mandatory column role could not be resolved
    #[error("{file}: no column matches required role '{role}'")]
    MissingColumn { file: String, role: String },

    /// Timestamps in a file could not be parsed
    #[error("{file}: unparsable timestamps ({detail})")]
    UnparsableDates { file: String, detail: String },

    /// A table has no usable rows after cleaning
    #[error("{file}: no usable rows")]
    EmptyTable { file: String },

    /// Not enough paired seasons to build train/validation/test splits
    #[error("need at least {required} paired seasons, found {found}")]
    InsufficientSeasons { required: usize, found: usize },

    /// Malformed table contents
    #[error("{file}: {detail}")]
    Malformed { file: String, detail: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether this error aborts the whole stage rather than a single file.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingInputDir(_)
                | PipelineError::NoTimeColumn { .. }
                | PipelineError::InsufficientSeasons { .. }
                | PipelineError::Config(_)
        )
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::MissingInputDir(PathBuf::from("raw")).is_fatal_for_run());
        assert!(PipelineError::NoTimeColumn {
            file: "a.csv".into(),
            keywords: vec!["Time".into()],
        }
        .is_fatal_for_run());

        assert!(!PipelineError::EmptyTable { file: "a.csv".into() }.is_fatal_for_run());
        assert!(!PipelineError::MissingColumn {
            file: "a.csv".into(),
            role: "avg_price".into(),
        }
        .is_fatal_for_run());
    }
}
