//! Error types for DOI normalization and input extraction.

use thiserror::Error;

/// Errors that can occur while turning raw input into DOIs.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The entry was empty or whitespace-only.
    #[error("empty DOI entry")]
    EmptyInput,

    /// The entry does not match the DOI grammar.
    #[error("invalid DOI '{input}': {reason}\n  Suggestion: {suggestion}")]
    InvalidDoi {
        /// The raw input that failed validation
        input: String,
        /// Why the DOI is invalid
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// A spreadsheet was supplied without a `doi` column.
    #[error(
        "no 'doi' column found (columns: {columns})\n  Suggestion: Add a header row with a column named 'doi'"
    )]
    MissingDoiColumn {
        /// Comma-separated header names that were present
        columns: String,
    },

    /// The spreadsheet could not be read as CSV.
    #[error("could not read CSV input: {reason}")]
    Csv {
        /// Underlying reader error, rendered
        reason: String,
    },
}

impl ParseError {
    /// Creates an `InvalidDoi` error with the default suggestion.
    #[must_use]
    pub fn invalid_doi(input: &str, reason: &str) -> Self {
        Self::InvalidDoi {
            input: input.to_string(),
            reason: reason.to_string(),
            suggestion: "DOIs look like 10.1234/example (optionally prefixed by https://doi.org/)"
                .to_string(),
        }
    }

    /// Creates an `InvalidDoi` error for a DOI without a suffix.
    #[must_use]
    pub fn doi_no_suffix(input: &str) -> Self {
        Self::InvalidDoi {
            input: input.to_string(),
            reason: "DOI has no suffix after '/'".to_string(),
            suggestion: "Check that the DOI was not truncated".to_string(),
        }
    }

    /// Creates a `Csv` error from a reader failure.
    #[must_use]
    pub fn csv(error: &csv::Error) -> Self {
        Self::Csv {
            reason: error.to_string(),
        }
    }

    /// Short one-line reason suitable for result tables.
    #[must_use]
    pub fn short_reason(&self) -> String {
        match self {
            Self::EmptyInput => "empty entry".to_string(),
            Self::InvalidDoi { reason, .. } => reason.clone(),
            Self::MissingDoiColumn { .. } => "missing doi column".to_string(),
            Self::Csv { reason } => reason.clone(),
        }
    }
}
