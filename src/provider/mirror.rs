//! Fallback lookup through user-configured mirror sites.
//!
//! Each mirror serves a viewer page at `{mirror}{doi}` with the document
//! embedded as `<embed id="pdf" src=...>` (or an iframe). Mirrors are tried
//! in a random order so load spreads across them.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, instrument, warn};

use super::html::extract_embedded_pdf;
use super::http_client::{ProviderHttp, ProviderSettings, build_provider_client};
use super::{CandidateLocation, ContentKind, ProviderError, SourceProvider};
use crate::download::RateLimiter;
use crate::parser::Doi;
use crate::user_agent;

const NAME: &str = "mirror";
const MIRROR_CONFIDENCE: u8 = 20;

/// Resolves DOIs through a list of mirror base URLs.
pub struct MirrorProvider {
    http: ProviderHttp,
    mirrors: Vec<String>,
}

impl MirrorProvider {
    /// Creates a provider over `mirrors` (base URLs the DOI is appended to).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::LookupFailed`] if the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings, mirrors: Vec<String>) -> Result<Self, ProviderError> {
        let client = build_provider_client(NAME, &user_agent::default_user_agent(), settings)?;
        let limiter = Arc::new(RateLimiter::new(settings.request_interval));
        Ok(Self {
            http: ProviderHttp::new(NAME, client, limiter),
            mirrors,
        })
    }
}

impl std::fmt::Debug for MirrorProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorProvider")
            .field("mirrors", &self.mirrors)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceProvider for MirrorProvider {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(provider = NAME, doi = %doi))]
    async fn resolve(&self, doi: &Doi) -> Result<Vec<CandidateLocation>, ProviderError> {
        let mut order: Vec<&String> = self.mirrors.iter().collect();
        order.shuffle(&mut rand::thread_rng());

        let mut rate_limited = 0usize;
        let mut unreachable = 0usize;
        let mut last_retry_after = None;

        for mirror in order {
            let page_url = format!("{mirror}{doi}");
            let response = match self.http.get(&page_url).await {
                Ok(response) => response,
                Err(ProviderError::RateLimited { retry_after, .. }) => {
                    rate_limited += 1;
                    last_retry_after = retry_after.or(last_retry_after);
                    continue;
                }
                Err(ProviderError::LookupFailed { reason, .. }) => {
                    debug!(mirror = %mirror, %reason, "mirror unavailable");
                    unreachable += 1;
                    continue;
                }
                Err(ProviderError::NotFound { .. }) => continue,
            };

            let final_url = response.url().clone();
            let html = match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    warn!(mirror = %mirror, error = %e, "mirror page unreadable");
                    continue;
                }
            };

            if let Some(target) = extract_embedded_pdf(&html, &final_url) {
                debug!(mirror = %mirror, target = %target, "embedded document found");
                return Ok(vec![CandidateLocation::new(
                    NAME,
                    target,
                    ContentKind::Pdf,
                    MIRROR_CONFIDENCE,
                )]);
            }
            debug!(mirror = %mirror, "no embedded document on mirror page");
        }

        let tried = self.mirrors.len();
        if tried > 0 && rate_limited == tried {
            Err(ProviderError::rate_limited(NAME, last_retry_after))
        } else if tried > 0 && unreachable == tried {
            Err(ProviderError::lookup_failed(NAME, "no mirror could be reached"))
        } else {
            Err(ProviderError::not_found(NAME))
        }
    }
}
