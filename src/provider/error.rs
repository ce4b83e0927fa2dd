//! Error types for source provider lookups.
//!
//! Lookup errors are never fatal: the resolution chain records each one as
//! an attempt and moves on (or backs off, for [`ProviderError::RateLimited`]).

use std::time::Duration;

use thiserror::Error;

/// Errors a [`SourceProvider`](super::SourceProvider) can report for one DOI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The service asked us to slow down.
    #[error("{provider} rate limited the lookup{}", format_retry_after(*retry_after))]
    RateLimited {
        /// Provider name.
        provider: String,
        /// Server-mandated wait, when the response carried one.
        retry_after: Option<Duration>,
    },

    /// The lookup could not be completed (network error, bad response).
    #[error("{provider} lookup failed: {reason}")]
    LookupFailed {
        /// Provider name.
        provider: String,
        /// What went wrong.
        reason: String,
    },

    /// The service has no record for the DOI.
    #[error("{provider} has no record of this DOI")]
    NotFound {
        /// Provider name.
        provider: String,
    },
}

fn format_retry_after(retry_after: Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| format!(" (retry after {}s)", d.as_secs()))
}

impl ProviderError {
    /// Creates a `RateLimited` error.
    #[must_use]
    pub fn rate_limited(provider: &str, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            provider: provider.to_string(),
            retry_after,
        }
    }

    /// Creates a `LookupFailed` error.
    #[must_use]
    pub fn lookup_failed(provider: &str, reason: impl Into<String>) -> Self {
        Self::LookupFailed {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(provider: &str) -> Self {
        Self::NotFound {
            provider: provider.to_string(),
        }
    }

    /// Returns the provider that produced the error.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimited { provider, .. }
            | Self::LookupFailed { provider, .. }
            | Self::NotFound { provider } => provider,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_rate_limited_display_with_delay() {
        let error = ProviderError::rate_limited("crossref", Some(Duration::from_secs(30)));
        assert_eq!(
            error.to_string(),
            "crossref rate limited the lookup (retry after 30s)"
        );
    }

    #[test]
    fn test_provider_error_rate_limited_display_without_delay() {
        let error = ProviderError::rate_limited("mirror", None);
        assert_eq!(error.to_string(), "mirror rate limited the lookup");
    }

    #[test]
    fn test_provider_error_lookup_failed_display() {
        let error = ProviderError::lookup_failed("unpaywall", "HTTP 500");
        assert!(error.to_string().contains("unpaywall lookup failed: HTTP 500"));
    }

    #[test]
    fn test_provider_error_provider_accessor() {
        assert_eq!(ProviderError::not_found("doi-org").provider(), "doi-org");
        assert_eq!(
            ProviderError::lookup_failed("crossref", "x").provider(),
            "crossref"
        );
    }
}
