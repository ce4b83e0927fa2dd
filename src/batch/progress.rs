//! Progress snapshots and run cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Point-in-time view of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Entries with a recorded outcome.
    pub completed: usize,
    /// Input entries in the run.
    pub total: usize,
    /// DOIs currently being resolved.
    pub in_flight: usize,
}

impl ProgressSnapshot {
    /// True once every entry has an outcome.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Entries still without an outcome.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

/// Shared stop signal for a batch run.
///
/// Cloning shares the flag. Once set, the scheduler dispatches no new DOIs
/// and in-flight DOIs stop before their next lookup or fetch.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
        }
    }
}
