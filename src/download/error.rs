//! Error types for document retrieval.
//!
//! These errors never escape a batch: the fetcher classifies each one into
//! a transient or permanent [`FetchResult`](super::FetchResult) and the
//! rendered message becomes the attempt's diagnostic reason.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a candidate document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// The response was not the expected document type.
    #[error("unexpected content from {url}: {reason}")]
    UnexpectedContent {
        /// The URL that served the content.
        url: String,
        /// What did not match (content type, magic bytes).
        reason: String,
    },

    /// The server answered 2xx with an empty body.
    #[error("empty response body from {url}")]
    EmptyBody {
        /// The URL that returned no bytes.
        url: String,
    },

    /// File system error while writing the document.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The candidate URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a network or timeout error depending on the reqwest error kind.
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an unexpected-content error.
    pub fn unexpected_content(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedContent {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an empty-body error.
    pub fn empty_body(url: impl Into<String>) -> Self {
        Self::EmptyBody { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the URL
// or path, which the source errors do not carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_timeout_display() {
        let error = FetchError::timeout("https://example.com/file.pdf");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.pdf"));
    }

    #[test]
    fn test_fetch_error_http_status_display() {
        let error = FetchError::http_status("https://example.com/file.pdf", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/file.pdf"));
    }

    #[test]
    fn test_fetch_error_http_status_keeps_retry_after() {
        let error = FetchError::http_status_with_retry_after(
            "https://example.com",
            429,
            Some("30".to_string()),
        );
        match error {
            FetchError::HttpStatus { retry_after, .. } => {
                assert_eq!(retry_after.as_deref(), Some("30"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_error_unexpected_content_display() {
        let error = FetchError::unexpected_content("https://example.com/x", "got text/html");
        let msg = error.to_string();
        assert!(msg.contains("unexpected content"));
        assert!(msg.contains("text/html"));
    }

    #[test]
    fn test_fetch_error_io_display() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = FetchError::io("/tmp/out.pdf", io);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/out.pdf"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_fetch_error_invalid_url_display() {
        let error = FetchError::invalid_url("not a url");
        assert!(error.to_string().contains("invalid URL"));
    }
}
