//! Document retrieval: fetching, retry policy, rate limiting, file naming.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use paperfetch_core::download::{
//!     DocumentFetcher, FetchResult, HttpFetcher, RateLimiter, build_download_client,
//! };
//! use paperfetch_core::provider::{CandidateLocation, ContentKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = build_download_client(Duration::from_secs(10), Duration::from_secs(300))?;
//! let fetcher = HttpFetcher::new(client, Arc::new(RateLimiter::new(Duration::from_millis(500))));
//! let location = CandidateLocation::new(
//!     "unpaywall",
//!     "https://example.com/paper.pdf",
//!     ContentKind::Pdf,
//!     90,
//! );
//! if let FetchResult::Success(document) = fetcher.fetch(&location, Path::new("paper.pdf")).await {
//!     println!("saved {} bytes", document.bytes);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod fetcher;
mod filename;
pub mod rate_limiter;
mod retry;

pub use error::FetchError;
pub use fetcher::{
    DocumentFetcher, FetchResult, FetchedDocument, HttpFetcher, build_download_client,
    existing_document_size,
};
pub use filename::{DOCUMENT_EXTENSION, doi_file_name, doi_output_path};
pub use rate_limiter::{RateLimiter, extract_host, parse_retry_after};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_fetch_error,
    classify_http_status,
};

// No module-local Result alias: signatures spell out `Result<T, FetchError>`.
