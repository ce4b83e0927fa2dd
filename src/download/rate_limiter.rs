//! Per-host fixed-interval rate limiting.
//!
//! A [`RateLimiter`] enforces a minimum interval between requests to the same
//! host. Each source provider owns its own limiter, and the fetcher owns one
//! for document hosts, so a provider exhausting its quota never delays
//! another provider.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use paperfetch_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1)));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://api.crossref.org/works/a").await;
//!
//! // Second request to the same host waits for the interval
//! limiter.acquire("https://api.crossref.org/works/b").await;
//!
//! // A different host proceeds immediately
//! limiter.acquire("https://api.unpaywall.org/v2/a").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per host (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value honoured (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-host rate limiter shared across workers.
///
/// Wrap in `Arc` to share. Slot acquisition for one host is serialized by a
/// `tokio::sync::Mutex`; the `DashMap` shard lock is released before any
/// await so hosts never block each other.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum interval between requests to the same host.
    interval: Duration,

    /// Whether rate limiting is disabled (interval of zero).
    disabled: bool,

    /// Per-host state.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Earliest instant the next request may start.
    /// `None` means the host has not been contacted yet.
    next_slot: Mutex<Option<Instant>>,

    /// Cumulative delay applied to this host, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            next_slot: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum interval per host.
    ///
    /// An interval of zero behaves like [`RateLimiter::disabled`] except that
    /// server-mandated `Retry-After` delays are still honoured.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = interval.as_millis()))]
    pub fn new(interval: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            interval,
            disabled: false,
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether rate limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum interval between requests to one host.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone()
    }

    /// Waits until a request to `url`'s host is allowed, then reserves the next slot.
    ///
    /// The first request to any host proceeds immediately.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        let state = self.host_state(&host);
        let mut slot = state.next_slot.lock().await;

        if let Some(next) = *slot {
            let now = Instant::now();
            if next > now {
                let delay = next - now;
                let cumulative = state.add_cumulative_delay(delay);
                debug!(
                    host = %host,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        host = %host,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive rate limiting - consider lowering concurrency"
                    );
                }
                tokio::time::sleep(delay).await;
            }
        } else {
            debug!(host = %host, "first request to host - no delay");
        }

        *slot = Some(Instant::now() + self.interval);
    }

    /// Records a server-mandated delay (from `Retry-After`) for `url`'s host.
    ///
    /// The next [`acquire`](Self::acquire) for that host waits at least `delay`
    /// from now.
    #[instrument(skip(self), fields(host))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        if self.disabled {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        let state = self.host_state(&host);
        let cumulative = state.add_cumulative_delay(delay);
        let not_before = Instant::now() + delay.min(MAX_RETRY_AFTER);
        {
            let mut slot = state.next_slot.lock().await;
            if slot.is_none_or(|next| next < not_before) {
                *slot = Some(not_before);
            }
        }

        debug!(
            host = %host,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - host may be under heavy load"
            );
        }
    }
}

/// Extracts the lower-cased host from a URL, or `"unknown"`.
///
/// # Examples
///
/// ```
/// use paperfetch_core::download::extract_host;
///
/// assert_eq!(extract_host("https://Api.Crossref.org/works"), "api.crossref.org");
/// assert_eq!(extract_host("https://localhost:8080/x"), "localhost");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a `Retry-After` header value (integer seconds or HTTP-date).
///
/// Returns `None` when unparseable. Values above one hour are capped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use paperfetch_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => Some(MAX_RETRY_AFTER),
        Ok(duration) => Some(duration),
        // Date already passed
        Err(_) => Some(Duration::ZERO),
    }
}
