//! Shared HTTP plumbing for providers: client construction, per-host rate
//! limiting and status-to-[`ProviderError`] mapping.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use super::ProviderError;
use crate::download::{RateLimiter, parse_retry_after};

/// Client settings shared by every provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Contact address sent to polite-pool APIs.
    pub contact_email: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout for metadata lookups.
    pub request_timeout: Duration,
    /// Minimum interval between requests to one host, per provider.
    pub request_interval: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            contact_email: "paperfetch@example.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            request_interval: Duration::from_secs(1),
        }
    }
}

/// Builds a provider HTTP client.
///
/// # Errors
///
/// Returns [`ProviderError::LookupFailed`] when client construction fails
/// or the user agent is not a valid header value.
pub(crate) fn build_provider_client(
    provider: &str,
    user_agent: &str,
    settings: &ProviderSettings,
) -> Result<Client, ProviderError> {
    if user_agent.chars().any(char::is_control) {
        return Err(ProviderError::lookup_failed(
            provider,
            "user agent contains control characters",
        ));
    }
    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .gzip(true)
        .user_agent(user_agent)
        .build()
        .map_err(|e| {
            ProviderError::lookup_failed(provider, format!("HTTP client construction failed: {e}"))
        })
}

/// A provider's HTTP handle: client plus its own rate limiter.
#[derive(Debug, Clone)]
pub(crate) struct ProviderHttp {
    provider: &'static str,
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl ProviderHttp {
    pub(crate) fn new(provider: &'static str, client: Client, limiter: Arc<RateLimiter>) -> Self {
        Self {
            provider,
            client,
            limiter,
        }
    }

    /// Sends a rate-limited GET and maps the status.
    ///
    /// 404 (and 410) become `NotFound`, 429 becomes `RateLimited` with the
    /// server's `Retry-After`, any other non-2xx becomes `LookupFailed`.
    pub(crate) async fn get(&self, url: &str) -> Result<Response, ProviderError> {
        self.limiter.acquire(url).await;

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(provider = self.provider, error = %e, "request failed");
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                format!("cannot reach service: {e}")
            };
            ProviderError::lookup_failed(self.provider, reason)
        })?;

        self.check_status(url, response).await
    }

    async fn check_status(&self, url: &str, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        debug!(provider = self.provider, status = status.as_u16(), "lookup returned error status");
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(ProviderError::not_found(self.provider)),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                if let Some(delay) = retry_after {
                    self.limiter.record_rate_limit(url, delay).await;
                }
                warn!(provider = self.provider, ?retry_after, "rate limited");
                Err(ProviderError::rate_limited(self.provider, retry_after))
            }
            other => Err(ProviderError::lookup_failed(
                self.provider,
                format!("HTTP {}", other.as_u16()),
            )),
        }
    }
}
