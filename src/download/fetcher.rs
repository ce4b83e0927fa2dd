//! Retrieval of candidate documents over HTTP.
//!
//! [`HttpFetcher`] streams a candidate URL into `<destination>.part`,
//! validates that the body is what the provider promised, and renames the
//! file into place. Errors are classified into [`FetchResult`] variants so
//! the resolution chain can decide between retrying and moving on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::FetchError;
use super::filename::partial_path;
use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{FailureType, classify_fetch_error};
use crate::provider::{CandidateLocation, ContentKind};
use crate::user_agent;

/// Number of leading body bytes inspected for the PDF signature.
const SNIFF_LEN: usize = 1024;

/// PDF magic marker.
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Content types that mean "landing page, not a document".
const HTML_CONTENT_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// A document written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// Final output path.
    pub path: PathBuf,
    /// Content type reported by the server, when any.
    pub content_type: Option<String>,
    /// File size in bytes.
    pub bytes: u64,
    /// Whether an existing file was reused instead of downloading.
    pub reused: bool,
}

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The document is on disk.
    Success(FetchedDocument),
    /// Timeout, connection failure, 5xx, 408 or 429. Worth one more try.
    TransientFailure(String),
    /// Wrong content, 4xx, TLS error, bad URL. Retrying will not help.
    PermanentFailure(String),
}

impl FetchResult {
    /// Returns `true` for [`FetchResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the failure reason, or `None` on success.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::TransientFailure(reason) | Self::PermanentFailure(reason) => Some(reason),
        }
    }

    fn from_error(error: &FetchError) -> Self {
        match classify_fetch_error(error) {
            FailureType::Permanent => Self::PermanentFailure(error.to_string()),
            FailureType::Transient | FailureType::RateLimited => {
                Self::TransientFailure(error.to_string())
            }
        }
    }
}

/// Retrieves one candidate location into a destination path.
///
/// Implementations never return an error: every failure is folded into a
/// [`FetchResult`] variant.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetches `location` into `destination`.
    async fn fetch(&self, location: &CandidateLocation, destination: &Path) -> FetchResult;
}

/// Builds the reqwest client used for document downloads.
///
/// `download_timeout` bounds the whole request including the body.
///
/// # Errors
///
/// Returns the reqwest builder error (TLS backend initialization).
pub fn build_download_client(
    connect_timeout: Duration,
    download_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(download_timeout)
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .build()
}

/// Returns the size of `path` when it is an existing, non-empty file.
pub async fn existing_document_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}

/// HTTP implementation of [`DocumentFetcher`].
///
/// Create once and share: the client pools connections and the limiter
/// spaces requests per document host.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    force_redownload: bool,
}

impl HttpFetcher {
    /// Creates a fetcher over an existing client and limiter.
    #[must_use]
    pub fn new(client: Client, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            limiter,
            force_redownload: false,
        }
    }

    /// Overwrite existing destination files instead of reusing them.
    #[must_use]
    pub fn with_force_redownload(mut self, force: bool) -> Self {
        self.force_redownload = force;
        self
    }

    async fn download(
        &self,
        location: &CandidateLocation,
        destination: &Path,
    ) -> Result<FetchedDocument, FetchError> {
        let url = location.url.as_str();
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        self.limiter.acquire(url).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if status.as_u16() == 429 {
                let delay = retry_after
                    .as_deref()
                    .and_then(parse_retry_after)
                    .unwrap_or(self.limiter.interval());
                self.limiter.record_rate_limit(url, delay).await;
            }
            return Err(FetchError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());

        if location.kind == ContentKind::Pdf
            && let Some(ct) = content_type.as_deref()
            && HTML_CONTENT_TYPES.iter().any(|html| ct.starts_with(html))
        {
            return Err(FetchError::unexpected_content(
                url,
                format!("expected a PDF, got {ct}"),
            ));
        }

        let partial = partial_path(destination);
        let streamed = stream_to_partial(response, url, &partial, location.kind).await;
        let bytes = match streamed {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(path = %partial.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(error);
            }
        };

        if let Err(error) = tokio::fs::rename(&partial, destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(FetchError::io(destination, error));
        }

        Ok(FetchedDocument {
            path: destination.to_path_buf(),
            content_type,
            bytes,
            reused: false,
        })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    #[instrument(skip(self, location), fields(url = %location.url, provider = %location.provider))]
    async fn fetch(&self, location: &CandidateLocation, destination: &Path) -> FetchResult {
        if !self.force_redownload
            && let Some(bytes) = existing_document_size(destination).await
        {
            debug!(path = %destination.display(), bytes, "destination exists, reusing");
            return FetchResult::Success(FetchedDocument {
                path: destination.to_path_buf(),
                content_type: None,
                bytes,
                reused: true,
            });
        }

        match self.download(location, destination).await {
            Ok(document) => {
                info!(path = %document.path.display(), bytes = document.bytes, "document saved");
                FetchResult::Success(document)
            }
            Err(error) => {
                let result = FetchResult::from_error(&error);
                match &result {
                    FetchResult::TransientFailure(reason) => {
                        warn!(reason = %reason, "transient fetch failure");
                    }
                    _ => debug!(error = %error, "permanent fetch failure"),
                }
                result
            }
        }
    }
}

/// Streams the body into `partial`, checking the PDF signature early.
async fn stream_to_partial(
    response: reqwest::Response,
    url: &str,
    partial: &Path,
    kind: ContentKind,
) -> Result<u64, FetchError> {
    let file = File::create(partial)
        .await
        .map_err(|e| FetchError::io(partial, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
    let mut sniffed = kind == ContentKind::Any;
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::from_request(url, e))?;

        if !sniffed {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            if head.len() >= SNIFF_LEN {
                check_pdf_signature(&head, url)?;
                sniffed = true;
            }
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(partial, e))?;
        bytes_written += chunk.len() as u64;
    }

    if bytes_written == 0 {
        return Err(FetchError::empty_body(url));
    }
    if !sniffed {
        check_pdf_signature(&head, url)?;
    }

    writer.flush().await.map_err(|e| FetchError::io(partial, e))?;
    Ok(bytes_written)
}

fn check_pdf_signature(head: &[u8], url: &str) -> Result<(), FetchError> {
    if head
        .windows(PDF_SIGNATURE.len())
        .any(|window| window == PDF_SIGNATURE)
    {
        Ok(())
    } else {
        Err(FetchError::unexpected_content(
            url,
            "body does not start like a PDF",
        ))
    }
}
