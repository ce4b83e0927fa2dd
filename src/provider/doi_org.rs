//! Publisher resolution through the DOI resolver.
//!
//! Follows `https://doi.org/{doi}` to the publisher. A PDF response is a
//! candidate by itself; an HTML landing page is scanned for PDF links.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use super::html::extract_pdf_links;
use super::http_client::{ProviderHttp, ProviderSettings, build_provider_client};
use super::{CandidateLocation, ContentKind, ProviderError, SourceProvider};
use crate::download::RateLimiter;
use crate::parser::Doi;
use crate::user_agent;

/// Default resolver base URL.
pub const DEFAULT_BASE_URL: &str = "https://doi.org";

const NAME: &str = "doi-org";
const RESOLVED_PDF_CONFIDENCE: u8 = 65;
const LANDING_PAGE_CONFIDENCE: u8 = 55;

/// Resolves DOIs by following the DOI resolver to the publisher site.
pub struct DoiOrgProvider {
    http: ProviderHttp,
    base_url: String,
}

impl DoiOrgProvider {
    /// Creates a provider against `https://doi.org`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::LookupFailed`] if the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates a provider against a custom resolver base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::LookupFailed`] if the HTTP client cannot be built.
    pub fn with_base_url(
        settings: &ProviderSettings,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = build_provider_client(NAME, &user_agent::default_user_agent(), settings)?;
        let limiter = Arc::new(RateLimiter::new(settings.request_interval));
        Ok(Self {
            http: ProviderHttp::new(NAME, client, limiter),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl std::fmt::Debug for DoiOrgProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoiOrgProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceProvider for DoiOrgProvider {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(provider = NAME, doi = %doi))]
    async fn resolve(&self, doi: &Doi) -> Result<Vec<CandidateLocation>, ProviderError> {
        let url = format!("{}/{}", self.base_url, doi.path_encoded());
        let response = self.http.get(&url).await?;
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        debug!(final_url = %final_url, content_type = %content_type, "resolver landed");

        if content_type.starts_with("application/pdf") {
            return Ok(vec![CandidateLocation::new(
                NAME,
                final_url.to_string(),
                ContentKind::Pdf,
                RESOLVED_PDF_CONFIDENCE,
            )]);
        }

        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(ProviderError::not_found(NAME));
        }

        let html = response.text().await.map_err(|e| {
            ProviderError::lookup_failed(NAME, format!("landing page unreadable: {e}"))
        })?;
        let candidates: Vec<CandidateLocation> = extract_pdf_links(&html, &final_url)
            .into_iter()
            .map(|link| CandidateLocation::new(NAME, link, ContentKind::Pdf, LANDING_PAGE_CONFIDENCE))
            .collect();

        if candidates.is_empty() {
            return Err(ProviderError::not_found(NAME));
        }
        Ok(candidates)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn provider(base: &str) -> DoiOrgProvider {
        let settings = ProviderSettings {
            request_interval: std::time::Duration::ZERO,
            ..ProviderSettings::default()
        };
        DoiOrgProvider::with_base_url(&settings, base).unwrap()
    }

    #[tokio::test]
    async fn test_doi_org_redirect_to_pdf_yields_final_url() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let base = mock_server.uri();
        Mock::given(method("GET"))
            .and(path("/10.1234/abc"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{base}/content/abc.pdf")),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/content/abc.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
            )
            .mount(&mock_server)
            .await;

        let doi = Doi::parse("10.1234/abc").unwrap();
        let candidates = provider(&base).resolve(&doi).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, format!("{base}/content/abc.pdf"));
        assert_eq!(candidates[0].confidence, 65);
    }

    #[tokio::test]
    async fn test_doi_org_landing_page_links() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let base = mock_server.uri();
        Mock::given(method("GET"))
            .and(path("/10.1234/abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    r#"<meta name="citation_pdf_url" content="/article/abc.pdf"><a href="/si.pdf">SI</a>"#,
                    "text/html; charset=utf-8",
                ),
            )
            .mount(&mock_server)
            .await;

        let doi = Doi::parse("10.1234/abc").unwrap();
        let candidates = provider(&base).resolve(&doi).await.unwrap();
        let urls: Vec<String> = candidates.iter().map(|c| c.url.clone()).collect();
        assert_eq!(
            urls,
            vec![format!("{base}/article/abc.pdf"), format!("{base}/si.pdf")]
        );
        assert!(candidates.iter().all(|c| c.confidence == 55));
    }

    #[tokio::test]
    async fn test_doi_org_unknown_doi_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let doi = Doi::parse("10.1234/nothing").unwrap();
        assert_eq!(
            provider(&mock_server.uri()).resolve(&doi).await.unwrap_err(),
            ProviderError::not_found("doi-org")
        );
    }

    #[tokio::test]
    async fn test_doi_org_landing_without_links_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>Subscribe to read</body></html>", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let doi = Doi::parse("10.1234/abc").unwrap();
        assert_eq!(
            provider(&mock_server.uri()).resolve(&doi).await.unwrap_err(),
            ProviderError::not_found("doi-org")
        );
    }
}
