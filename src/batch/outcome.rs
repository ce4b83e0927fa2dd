//! Per-DOI outcomes and the aggregated batch report.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::parser::Doi;
use crate::provider::Attempt;

/// Terminal status of one input entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A provider candidate was fetched in this run.
    Downloaded {
        /// Written file.
        path: PathBuf,
        /// File size.
        bytes: u64,
        /// Provider whose candidate succeeded.
        provider: String,
    },
    /// The output file already existed and was kept.
    AlreadyDownloaded {
        /// Existing file.
        path: PathBuf,
        /// File size.
        bytes: u64,
    },
    /// Every provider reported no record.
    NotFound,
    /// The chain ended without a document for any other reason.
    AllProvidersFailed,
    /// The input is not a DOI.
    InvalidDoi {
        /// Why normalization rejected it.
        reason: String,
    },
    /// The run was cancelled before this DOI was dispatched.
    NotAttempted,
}

impl OutcomeStatus {
    /// Stable lower-case label used in tables and CSV.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Downloaded { .. } => "downloaded",
            Self::AlreadyDownloaded { .. } => "already_downloaded",
            Self::NotFound => "not_found",
            Self::AllProvidersFailed => "failed",
            Self::InvalidDoi { .. } => "invalid_doi",
            Self::NotAttempted => "not_attempted",
        }
    }

    /// True when a document is on disk for this entry.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Downloaded { .. } | Self::AlreadyDownloaded { .. })
    }

    /// File on disk, when there is one.
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Downloaded { path, .. } | Self::AlreadyDownloaded { path, .. } => Some(path),
            _ => None,
        }
    }

    /// File size, when there is a file.
    #[must_use]
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Self::Downloaded { bytes, .. } | Self::AlreadyDownloaded { bytes, .. } => Some(*bytes),
            _ => None,
        }
    }
}

/// The result for one input entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoiOutcome {
    /// Zero-based position in the submitted input list.
    pub index: usize,
    /// The entry as submitted.
    pub input: String,
    /// Normalized DOI, when the input was valid.
    pub doi: Option<Doi>,
    /// Terminal status.
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Human-readable failure detail.
    #[serde(rename = "detail")]
    pub reason: Option<String>,
    /// Every lookup and fetch, in order.
    pub attempts: Vec<Attempt>,
    /// Wall time spent on the DOI.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl DoiOutcome {
    pub(crate) fn invalid(index: usize, input: String, reason: String) -> Self {
        Self {
            index,
            input,
            doi: None,
            status: OutcomeStatus::InvalidDoi {
                reason: reason.clone(),
            },
            reason: Some(reason),
            attempts: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub(crate) fn not_attempted(index: usize, input: String, doi: Doi) -> Self {
        Self {
            index,
            input,
            doi: Some(doi),
            status: OutcomeStatus::NotAttempted,
            reason: Some("run cancelled".to_string()),
            attempts: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// Outcome counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    /// Fetched in this run.
    pub downloaded: usize,
    /// Already on disk.
    pub already_present: usize,
    /// No provider had a record.
    pub not_found: usize,
    /// Chain exhausted.
    pub failed: usize,
    /// Rejected by normalization.
    pub invalid: usize,
    /// Skipped by cancellation.
    pub not_attempted: usize,
}

impl BatchCounts {
    fn record(&mut self, status: &OutcomeStatus) {
        match status {
            OutcomeStatus::Downloaded { .. } => self.downloaded += 1,
            OutcomeStatus::AlreadyDownloaded { .. } => self.already_present += 1,
            OutcomeStatus::NotFound => self.not_found += 1,
            OutcomeStatus::AllProvidersFailed => self.failed += 1,
            OutcomeStatus::InvalidDoi { .. } => self.invalid += 1,
            OutcomeStatus::NotAttempted => self.not_attempted += 1,
        }
    }

    /// Entries with a document on disk.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.already_present
    }

    /// Entries without a document on disk.
    #[must_use]
    pub fn unsuccessful(&self) -> usize {
        self.not_found + self.failed + self.invalid + self.not_attempted
    }
}

/// Final report of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// One outcome per input entry, sorted by input index.
    pub outcomes: Vec<DoiOutcome>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Wall time of the run.
    pub elapsed: Duration,
    /// Highest number of DOIs in flight at once.
    pub peak_in_flight: usize,
    /// Status counters.
    pub counts: BatchCounts,
}

impl BatchReport {
    pub(crate) fn new(
        mut outcomes: Vec<DoiOutcome>,
        cancelled: bool,
        elapsed: Duration,
        peak_in_flight: usize,
    ) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let mut counts = BatchCounts::default();
        for outcome in &outcomes {
            counts.record(&outcome.status);
        }
        Self {
            outcomes,
            cancelled,
            elapsed,
            peak_in_flight,
            counts,
        }
    }

    /// Number of input entries.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}
