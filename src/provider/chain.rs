//! The resolution chain: ordered providers with deterministic fallback.
//!
//! For one DOI the chain asks each provider in turn for candidates and hands
//! every candidate to the fetcher until a document lands on disk. Each
//! lookup and each fetch is recorded as an [`Attempt`], and the total is
//! bounded by `max_attempts_per_doi`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::{
    CandidateLocation, CrossrefProvider, DoiOrgProvider, MirrorProvider, ProviderError,
    ProviderKind, SourceProvider, UnpaywallProvider,
};
use crate::batch::CancellationFlag;
use crate::config::EngineConfig;
use crate::download::{
    DocumentFetcher, FailureType, FetchResult, FetchedDocument, HttpFetcher, RateLimiter,
    RetryDecision, RetryPolicy, build_download_client,
};
use crate::parser::Doi;

/// Default cap on provider lookups plus fetches for one DOI.
pub const DEFAULT_MAX_ATTEMPTS_PER_DOI: u32 = 20;

/// Attempts per candidate for transient fetch failures (one retry).
const DEFAULT_FETCH_ATTEMPTS: u32 = 2;

/// Longest a single server-mandated wait is honoured inside a chain.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(300);

/// What happened in one provider lookup or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The provider returned candidates.
    Candidates {
        /// Number of candidates.
        count: usize,
    },
    /// The provider had no record (or an empty candidate list).
    NotFound,
    /// The provider rate-limited the lookup.
    RateLimited {
        /// Server-mandated wait in milliseconds, if given.
        retry_after_ms: Option<u64>,
    },
    /// The lookup failed.
    LookupFailed {
        /// Failure detail.
        reason: String,
    },
    /// The fetch wrote the document.
    Fetched {
        /// Document size.
        bytes: u64,
    },
    /// The fetch failed in a retryable way.
    TransientFailure {
        /// Failure detail.
        reason: String,
    },
    /// The fetch failed for good.
    PermanentFailure {
        /// Failure detail.
        reason: String,
    },
}

impl AttemptOutcome {
    /// Short human-readable description for reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Candidates { count } => format!("{count} candidate(s)"),
            Self::NotFound => "not found".to_string(),
            Self::RateLimited { .. } => "rate limited".to_string(),
            Self::Fetched { bytes } => format!("fetched {bytes} bytes"),
            Self::LookupFailed { reason }
            | Self::TransientFailure { reason }
            | Self::PermanentFailure { reason } => reason.clone(),
        }
    }

    fn is_failure(&self) -> bool {
        !matches!(self, Self::Candidates { .. } | Self::Fetched { .. })
    }
}

/// One provider lookup or fetch, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    /// Provider name.
    pub provider: String,
    /// Candidate URL for fetches; `None` for lookups.
    pub url: Option<String>,
    /// Result.
    pub outcome: AttemptOutcome,
}

impl Attempt {
    fn lookup(provider: &str, outcome: AttemptOutcome) -> Self {
        Self {
            provider: provider.to_string(),
            url: None,
            outcome,
        }
    }

    fn fetch(candidate: &CandidateLocation, outcome: AttemptOutcome) -> Self {
        Self {
            provider: candidate.provider.clone(),
            url: Some(candidate.url.clone()),
            outcome,
        }
    }
}

/// Terminal result of a chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainResult {
    /// A document is on disk.
    Downloaded {
        /// The fetched document.
        document: FetchedDocument,
        /// Provider whose candidate succeeded.
        provider: String,
    },
    /// Every provider reported no record.
    NotFound,
    /// The chain ended for any other reason (failures, attempt cap).
    AllProvidersFailed,
    /// The run was cancelled before the chain finished.
    Cancelled,
}

/// Result plus the full attempt history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    /// Terminal result.
    pub result: ChainResult,
    /// Every lookup and fetch, in order.
    pub attempts: Vec<Attempt>,
}

impl ChainReport {
    /// The last failure detail, for reporting why a DOI failed.
    #[must_use]
    pub fn last_failure_reason(&self) -> Option<String> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.outcome.is_failure())
            .map(|a| format!("{}: {}", a.provider, a.outcome.describe()))
    }
}

/// Errors assembling a chain from configuration.
#[derive(Debug, Error)]
pub enum ChainBuildError {
    /// A provider could not be constructed.
    #[error("cannot set up provider: {0}")]
    Provider(#[from] ProviderError),

    /// The download HTTP client could not be constructed.
    #[error("cannot set up download client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Ordered providers plus a fetcher.
pub struct ResolutionChain {
    providers: Vec<Arc<dyn SourceProvider>>,
    fetcher: Arc<dyn DocumentFetcher>,
    provider_retry: RetryPolicy,
    fetch_retry: RetryPolicy,
    max_attempts: u32,
}

impl std::fmt::Debug for ResolutionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionChain")
            .field("providers", &self.provider_names())
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ResolutionChain {
    /// Creates a chain with default retry policies and attempt cap.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self {
            providers,
            fetcher,
            provider_retry: RetryPolicy::default(),
            fetch_retry: RetryPolicy::with_max_attempts(DEFAULT_FETCH_ATTEMPTS),
            max_attempts: DEFAULT_MAX_ATTEMPTS_PER_DOI,
        }
    }

    /// Sets the policy for rate-limited provider lookups.
    #[must_use]
    pub fn with_provider_retry(mut self, policy: RetryPolicy) -> Self {
        self.provider_retry = policy;
        self
    }

    /// Sets the policy for transient fetch failures.
    #[must_use]
    pub fn with_fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    /// Caps lookups plus fetches per DOI (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Provider names in chain order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn budget_exhausted(&self, attempts: &[Attempt]) -> bool {
        attempts.len() >= self.max_attempts as usize
    }

    /// Runs the chain for `doi`, writing a successful fetch to `destination`.
    pub async fn resolve_all(&self, doi: &Doi, destination: &Path) -> ChainReport {
        self.resolve_cancellable(doi, destination, &CancellationFlag::new())
            .await
    }

    /// Like [`resolve_all`](Self::resolve_all), but stops between attempts
    /// once `cancel` is set.
    ///
    /// The flag is checked before every lookup and fetch, and interrupts
    /// rate-limit and retry backoffs. A fetch already streaming is not cut
    /// short. A stopped chain reports [`ChainResult::Cancelled`] with the
    /// attempts made so far.
    #[instrument(skip(self, destination, cancel), fields(doi = %doi))]
    pub async fn resolve_cancellable(
        &self,
        doi: &Doi,
        destination: &Path,
        cancel: &CancellationFlag,
    ) -> ChainReport {
        let mut attempts: Vec<Attempt> = Vec::new();

        'providers: for provider in &self.providers {
            if cancel.is_cancelled() {
                return cancelled(attempts);
            }
            let name = provider.name();
            let Some(candidates) = self
                .lookup(provider.as_ref(), doi, &mut attempts, cancel)
                .await
            else {
                if cancel.is_cancelled() {
                    return cancelled(attempts);
                }
                if self.budget_exhausted(&attempts) {
                    break 'providers;
                }
                continue;
            };

            for candidate in &candidates {
                let mut round = 0u32;
                loop {
                    if cancel.is_cancelled() {
                        return cancelled(attempts);
                    }
                    if self.budget_exhausted(&attempts) {
                        break 'providers;
                    }
                    round += 1;
                    match self.fetcher.fetch(candidate, destination).await {
                        FetchResult::Success(document) => {
                            attempts.push(Attempt::fetch(
                                candidate,
                                AttemptOutcome::Fetched {
                                    bytes: document.bytes,
                                },
                            ));
                            info!(provider = name, url = %candidate.url, "document retrieved");
                            return ChainReport {
                                result: ChainResult::Downloaded {
                                    document,
                                    provider: name.to_string(),
                                },
                                attempts,
                            };
                        }
                        FetchResult::TransientFailure(reason) => {
                            attempts.push(Attempt::fetch(
                                candidate,
                                AttemptOutcome::TransientFailure { reason },
                            ));
                            match self.fetch_retry.should_retry(FailureType::Transient, round) {
                                RetryDecision::Retry { delay, .. } => {
                                    if !sleep_unless_cancelled(delay, cancel).await {
                                        return cancelled(attempts);
                                    }
                                }
                                RetryDecision::DoNotRetry { .. } => break,
                            }
                        }
                        FetchResult::PermanentFailure(reason) => {
                            attempts.push(Attempt::fetch(
                                candidate,
                                AttemptOutcome::PermanentFailure { reason },
                            ));
                            break;
                        }
                    }
                }
            }
        }

        let result = if !attempts.is_empty()
            && attempts
                .iter()
                .all(|a| a.outcome == AttemptOutcome::NotFound)
        {
            ChainResult::NotFound
        } else {
            ChainResult::AllProvidersFailed
        };
        debug!(attempts = attempts.len(), ?result, "chain exhausted");
        ChainReport { result, attempts }
    }

    /// Asks one provider for candidates, honouring rate limits.
    ///
    /// Returns `None` when the chain should move to the next provider.
    async fn lookup(
        &self,
        provider: &dyn SourceProvider,
        doi: &Doi,
        attempts: &mut Vec<Attempt>,
        cancel: &CancellationFlag,
    ) -> Option<Vec<CandidateLocation>> {
        let name = provider.name();
        let mut round = 0u32;
        loop {
            if cancel.is_cancelled() || self.budget_exhausted(attempts) {
                return None;
            }
            round += 1;
            match provider.resolve(doi).await {
                Ok(candidates) if candidates.is_empty() => {
                    attempts.push(Attempt::lookup(name, AttemptOutcome::NotFound));
                    return None;
                }
                Ok(candidates) => {
                    debug!(provider = name, count = candidates.len(), "candidates found");
                    attempts.push(Attempt::lookup(
                        name,
                        AttemptOutcome::Candidates {
                            count: candidates.len(),
                        },
                    ));
                    return Some(candidates);
                }
                Err(ProviderError::NotFound { .. }) => {
                    attempts.push(Attempt::lookup(name, AttemptOutcome::NotFound));
                    return None;
                }
                Err(ProviderError::LookupFailed { reason, .. }) => {
                    debug!(provider = name, %reason, "lookup failed");
                    attempts.push(Attempt::lookup(name, AttemptOutcome::LookupFailed { reason }));
                    return None;
                }
                Err(ProviderError::RateLimited { retry_after, .. }) => {
                    let retry_after_ms =
                        retry_after.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
                    attempts.push(Attempt::lookup(
                        name,
                        AttemptOutcome::RateLimited { retry_after_ms },
                    ));
                    match self.provider_retry.should_retry(FailureType::RateLimited, round) {
                        RetryDecision::Retry { delay, .. } => {
                            let wait = retry_after.unwrap_or(delay).min(MAX_RATE_LIMIT_WAIT);
                            warn!(provider = name, wait_ms = wait.as_millis(), "rate limited, backing off");
                            if !sleep_unless_cancelled(wait, cancel).await {
                                debug!(provider = name, "backoff interrupted by cancellation");
                                return None;
                            }
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(provider = name, %reason, "rate limited, giving up on provider");
                            return None;
                        }
                    }
                }
            }
        }
    }
}

fn cancelled(attempts: Vec<Attempt>) -> ChainReport {
    debug!(attempts = attempts.len(), "chain cancelled");
    ChainReport {
        result: ChainResult::Cancelled,
        attempts,
    }
}

/// Sleeps for `wait`. Returns `false` if `cancel` fired first.
async fn sleep_unless_cancelled(wait: Duration, cancel: &CancellationFlag) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(wait) => true,
    }
}

/// Assembles the configured providers, in order, with an HTTP fetcher.
///
/// Each provider gets its own rate limiter. The mirror provider is skipped
/// when no mirrors are configured.
///
/// # Errors
///
/// Returns [`ChainBuildError`] if an HTTP client cannot be constructed.
pub fn build_resolution_chain(config: &EngineConfig) -> Result<ResolutionChain, ChainBuildError> {
    let settings = config.provider_settings();
    let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::with_capacity(config.providers.len());

    for kind in &config.providers {
        let provider: Arc<dyn SourceProvider> = match kind {
            ProviderKind::Unpaywall => Arc::new(UnpaywallProvider::with_base_url(
                &settings,
                &config.endpoints.unpaywall,
            )?),
            ProviderKind::Crossref => Arc::new(CrossrefProvider::with_base_url(
                &settings,
                &config.endpoints.crossref,
            )?),
            ProviderKind::DoiOrg => Arc::new(DoiOrgProvider::with_base_url(
                &settings,
                &config.endpoints.doi_org,
            )?),
            ProviderKind::Mirror => {
                if config.mirrors.is_empty() {
                    debug!("no mirrors configured, skipping mirror provider");
                    continue;
                }
                Arc::new(MirrorProvider::new(&settings, config.mirrors.clone())?)
            }
        };
        providers.push(provider);
    }

    let client = build_download_client(config.connect_timeout(), config.download_timeout())?;
    let fetcher = HttpFetcher::new(client, Arc::new(RateLimiter::new(config.download_interval())))
        .with_force_redownload(config.force_redownload);

    let chain = ResolutionChain::new(providers, Arc::new(fetcher))
        .with_provider_retry(RetryPolicy::with_retries(config.max_provider_retries))
        .with_max_attempts(config.max_attempts_per_doi);
    debug!(providers = ?chain.provider_names(), "resolution chain assembled");
    Ok(chain)
}
