//! Bounded-concurrency batch execution.
//!
//! Inputs are normalized up front. Invalid entries get their outcome
//! immediately; valid DOIs are deduplicated and dispatched to one task each,
//! with a semaphore bounding how many run at once. A single collector task
//! owns the outcome list and progress state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use super::outcome::{BatchReport, DoiOutcome, OutcomeStatus};
use super::progress::{CancellationFlag, ProgressSnapshot};
use crate::download::{doi_output_path, existing_document_size};
use crate::parser::{Doi, normalize_doi};
use crate::provider::{Attempt, ChainResult, ResolutionChain};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of DOIs in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

const CANCELLED_IN_FLIGHT_REASON: &str = "run cancelled during resolution";

/// Run-level errors. Per-DOI failures are outcomes, never errors.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Concurrency outside `1..=100`.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// The output directory could not be created.
    #[error("cannot create output directory '{}': {source}\n  Suggestion: Check the path and its permissions", path.display())]
    OutputDirectory {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The run task itself failed.
    #[error("batch run task failed: {0}")]
    Aborted(String),
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum DOIs in flight.
    pub concurrency: usize,
    /// Refetch even when the output file exists.
    pub force_redownload: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            force_redownload: false,
        }
    }
}

/// Handle to a running batch.
///
/// `outcomes` yields outcomes in completion order. `progress` can be polled
/// with `borrow()` or awaited with `changed()`. [`BatchRun::wait`] returns
/// the final report.
#[derive(Debug)]
pub struct BatchRun {
    /// Outcome stream, in completion order.
    pub outcomes: mpsc::UnboundedReceiver<DoiOutcome>,
    /// Latest progress snapshot.
    pub progress: watch::Receiver<ProgressSnapshot>,
    report: JoinHandle<Result<BatchReport, BatchError>>,
}

impl BatchRun {
    /// Waits for the run to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Aborted`] if the run task or its outcome
    /// collector panicked.
    pub async fn wait(self) -> Result<BatchReport, BatchError> {
        self.report
            .await
            .map_err(|e| BatchError::Aborted(e.to_string()))?
    }
}

/// One unique DOI and every input entry that normalized to it.
struct WorkItem {
    doi: Doi,
    occurrences: Vec<(usize, String)>,
}

impl WorkItem {
    fn fan_out(&self, template: &DoiOutcome) -> Vec<DoiOutcome> {
        self.occurrences
            .iter()
            .map(|(index, input)| DoiOutcome {
                index: *index,
                input: input.clone(),
                ..template.clone()
            })
            .collect()
    }

    fn not_attempted(&self) -> Vec<DoiOutcome> {
        self.occurrences
            .iter()
            .map(|(index, input)| DoiOutcome::not_attempted(*index, input.clone(), self.doi.clone()))
            .collect()
    }
}

/// Live counters shared between the dispatcher, workers and collector.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs a resolution chain over a batch of inputs.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    chain: Arc<ResolutionChain>,
    options: BatchOptions,
}

impl BatchScheduler {
    /// Creates a scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidConcurrency`] outside `1..=100`.
    pub fn new(chain: Arc<ResolutionChain>, options: BatchOptions) -> Result<Self, BatchError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&options.concurrency) {
            return Err(BatchError::InvalidConcurrency {
                value: options.concurrency,
            });
        }
        Ok(Self { chain, options })
    }

    /// Configured options.
    #[must_use]
    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Starts a run and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::OutputDirectory`] before any work starts if the
    /// output directory cannot be created.
    #[instrument(skip(self, inputs, cancel), fields(inputs = inputs.len(), output_dir = %output_dir.display()))]
    pub async fn start(
        &self,
        inputs: Vec<String>,
        output_dir: &Path,
        cancel: CancellationFlag,
    ) -> Result<BatchRun, BatchError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| BatchError::OutputDirectory {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let total = inputs.len();
        let (invalid, work) = plan(inputs);
        info!(
            total,
            unique = work.len(),
            invalid = invalid.len(),
            concurrency = self.options.concurrency,
            "starting batch"
        );

        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot {
            completed: 0,
            total,
            in_flight: 0,
        });

        let run = RunContext {
            chain: Arc::clone(&self.chain),
            options: self.options,
            output_dir: output_dir.to_path_buf(),
            cancel,
            in_flight: Arc::new(InFlight::default()),
        };
        let report = tokio::spawn(run.drive(invalid, work, total, stream_tx, progress_tx));

        Ok(BatchRun {
            outcomes: stream_rx,
            progress: progress_rx,
            report,
        })
    }

    /// Starts a run and waits for its report.
    ///
    /// # Errors
    ///
    /// See [`BatchScheduler::start`] and [`BatchRun::wait`].
    pub async fn run(
        &self,
        inputs: Vec<String>,
        output_dir: &Path,
        cancel: CancellationFlag,
    ) -> Result<BatchReport, BatchError> {
        self.start(inputs, output_dir, cancel).await?.wait().await
    }
}

/// Splits inputs into invalid outcomes and unique work items (first-seen order).
fn plan(inputs: Vec<String>) -> (Vec<DoiOutcome>, Vec<WorkItem>) {
    let mut invalid = Vec::new();
    let mut work: Vec<WorkItem> = Vec::new();
    let mut seen: HashMap<Doi, usize> = HashMap::new();

    for (index, input) in inputs.into_iter().enumerate() {
        match normalize_doi(&input) {
            Ok(doi) => {
                if let Some(&slot) = seen.get(&doi) {
                    work[slot].occurrences.push((index, input));
                } else {
                    seen.insert(doi.clone(), work.len());
                    work.push(WorkItem {
                        doi,
                        occurrences: vec![(index, input)],
                    });
                }
            }
            Err(e) => {
                debug!(index, input = %input, error = %e, "invalid input");
                invalid.push(DoiOutcome::invalid(index, input, e.short_reason()));
            }
        }
    }
    (invalid, work)
}

struct RunContext {
    chain: Arc<ResolutionChain>,
    options: BatchOptions,
    output_dir: PathBuf,
    cancel: CancellationFlag,
    in_flight: Arc<InFlight>,
}

impl RunContext {
    async fn drive(
        self,
        invalid: Vec<DoiOutcome>,
        work: Vec<WorkItem>,
        total: usize,
        stream_tx: mpsc::UnboundedSender<DoiOutcome>,
        progress_tx: watch::Sender<ProgressSnapshot>,
    ) -> Result<BatchReport, BatchError> {
        let started = Instant::now();
        let (worker_tx, worker_rx) = mpsc::unbounded_channel::<DoiOutcome>();
        let collector = tokio::spawn(collect(
            worker_rx,
            total,
            Arc::clone(&self.in_flight),
            stream_tx,
            progress_tx,
        ));

        for outcome in invalid {
            let _ = worker_tx.send(outcome);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let mut handles: Vec<(JoinHandle<()>, Arc<WorkItem>)> = Vec::with_capacity(work.len());
        let mut pending = work.into_iter().map(Arc::new);
        let mut cancelled = false;

        while let Some(item) = pending.next() {
            let permit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit.filter(|_| !self.cancel.is_cancelled()) else {
                cancelled = true;
                for outcome in item.not_attempted() {
                    let _ = worker_tx.send(outcome);
                }
                break;
            };

            self.in_flight.enter();
            let task_item = Arc::clone(&item);
            let chain = Arc::clone(&self.chain);
            let output_dir = self.output_dir.clone();
            let force = self.options.force_redownload;
            let cancel = self.cancel.clone();
            let in_flight = Arc::clone(&self.in_flight);
            let tx = worker_tx.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let outcome =
                    process_doi(&chain, &task_item.doi, &output_dir, force, &cancel).await;
                in_flight.leave();
                for outcome in task_item.fan_out(&outcome) {
                    let _ = tx.send(outcome);
                }
            });
            handles.push((handle, item));
        }

        if cancelled {
            let mut skipped = 0usize;
            for item in pending {
                for outcome in item.not_attempted() {
                    skipped += 1;
                    let _ = worker_tx.send(outcome);
                }
            }
            warn!(skipped, "batch cancelled, remaining DOIs not attempted");
        }

        for (handle, item) in handles {
            if let Err(e) = handle.await {
                warn!(doi = %item.doi, error = %e, "worker task failed");
                self.in_flight.leave();
                let template = DoiOutcome {
                    index: 0,
                    input: String::new(),
                    doi: Some(item.doi.clone()),
                    status: OutcomeStatus::AllProvidersFailed,
                    reason: Some(format!("worker task failed: {e}")),
                    attempts: Vec::new(),
                    elapsed: std::time::Duration::ZERO,
                };
                for outcome in item.fan_out(&template) {
                    let _ = worker_tx.send(outcome);
                }
            }
        }
        drop(worker_tx);

        let outcomes = collected_outcomes(collector.await)?;
        let peak = self.in_flight.peak.load(Ordering::SeqCst);
        let cancelled = cancelled || self.cancel.is_cancelled();
        let report = BatchReport::new(outcomes, cancelled, started.elapsed(), peak);
        info!(
            downloaded = report.counts.downloaded,
            already_present = report.counts.already_present,
            not_found = report.counts.not_found,
            failed = report.counts.failed,
            invalid = report.counts.invalid,
            not_attempted = report.counts.not_attempted,
            elapsed_ms = report.elapsed.as_millis(),
            "batch finished"
        );
        Ok(report)
    }
}

/// A failed collector loses outcomes, so the whole run fails with it.
fn collected_outcomes(
    joined: Result<Vec<DoiOutcome>, JoinError>,
) -> Result<Vec<DoiOutcome>, BatchError> {
    joined.map_err(|e| {
        warn!(error = %e, "outcome collector failed");
        BatchError::Aborted(format!("outcome collector failed: {e}"))
    })
}

/// Appends outcomes, publishes progress, forwards to the stream.
async fn collect(
    mut rx: mpsc::UnboundedReceiver<DoiOutcome>,
    total: usize,
    in_flight: Arc<InFlight>,
    stream_tx: mpsc::UnboundedSender<DoiOutcome>,
    progress_tx: watch::Sender<ProgressSnapshot>,
) -> Vec<DoiOutcome> {
    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome.clone());
        progress_tx.send_replace(ProgressSnapshot {
            completed: outcomes.len(),
            total,
            in_flight: in_flight.current.load(Ordering::SeqCst),
        });
        // The caller may have dropped the stream; the report still has everything.
        let _ = stream_tx.send(outcome);
    }
    outcomes
}

/// Resolves one DOI into an outcome template (index and input filled in later).
#[instrument(skip(chain, output_dir, cancel), fields(doi = %doi))]
async fn process_doi(
    chain: &ResolutionChain,
    doi: &Doi,
    output_dir: &Path,
    force_redownload: bool,
    cancel: &CancellationFlag,
) -> DoiOutcome {
    let started = Instant::now();
    let destination = doi_output_path(output_dir, doi);
    let template = |status: OutcomeStatus, reason: Option<String>, attempts: Vec<Attempt>| DoiOutcome {
        index: 0,
        input: String::new(),
        doi: Some(doi.clone()),
        status,
        reason,
        attempts,
        elapsed: started.elapsed(),
    };

    if !force_redownload && let Some(bytes) = existing_document_size(&destination).await {
        info!(path = %destination.display(), bytes, "already downloaded");
        return template(
            OutcomeStatus::AlreadyDownloaded {
                path: destination,
                bytes,
            },
            None,
            Vec::new(),
        );
    }

    let report = chain.resolve_cancellable(doi, &destination, cancel).await;
    let reason = report.last_failure_reason();
    match report.result {
        ChainResult::Downloaded { document, provider } => {
            info!(provider = %provider, bytes = document.bytes, "downloaded");
            let status = if document.reused {
                OutcomeStatus::AlreadyDownloaded {
                    path: document.path,
                    bytes: document.bytes,
                }
            } else {
                OutcomeStatus::Downloaded {
                    path: document.path,
                    bytes: document.bytes,
                    provider,
                }
            };
            template(status, None, report.attempts)
        }
        ChainResult::NotFound => {
            info!("no provider has a record");
            template(OutcomeStatus::NotFound, reason, report.attempts)
        }
        ChainResult::AllProvidersFailed => {
            info!(reason = reason.as_deref().unwrap_or("no candidates"), "all providers failed");
            let reason = reason.or_else(|| Some("no candidates".to_string()));
            template(OutcomeStatus::AllProvidersFailed, reason, report.attempts)
        }
        ChainResult::Cancelled => {
            info!(attempts = report.attempts.len(), "stopped by cancellation");
            template(
                OutcomeStatus::NotAttempted,
                Some(CANCELLED_IN_FLIGHT_REASON.to_string()),
                report.attempts,
            )
        }
    }
}
