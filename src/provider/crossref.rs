//! Crossref publisher-metadata lookup.
//!
//! The [`CrossrefProvider`] calls the Crossref REST API and turns the
//! `message.link` array into candidates: direct PDF links first, then
//! MDPI-style `/htm` links rewritten to `/pdf`, then PDF links scraped from
//! a few linked landing pages.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::html::{extract_pdf_links, is_pdf_path};
use super::http_client::{ProviderHttp, ProviderSettings, build_provider_client};
use super::{CandidateLocation, ContentKind, ProviderError, SourceProvider};
use crate::download::RateLimiter;
use crate::parser::Doi;
use crate::user_agent;

/// Default Crossref API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

const NAME: &str = "crossref";
const DIRECT_PDF_CONFIDENCE: u8 = 70;
const REWRITTEN_PDF_CONFIDENCE: u8 = 60;
const CRAWLED_PDF_CONFIDENCE: u8 = 50;

/// Landing pages fetched per DOI at most.
const MAX_CRAWL_PAGES: usize = 3;

// ==================== Crossref API Response Types ====================

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    status: String,
    message: CrossrefMessage,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefMessage {
    #[serde(default)]
    link: Vec<CrossrefLink>,
}

/// A resource link from the Crossref response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CrossrefLink {
    /// The URL field is uppercase in the Crossref response.
    #[serde(rename = "URL")]
    url: Option<String>,
    content_type: Option<String>,
    intended_application: Option<String>,
}

impl CrossrefLink {
    fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    fn has_content_type(&self, mime: &str) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(mime))
    }

    fn is_text_mining(&self) -> bool {
        self.intended_application
            .as_deref()
            .is_some_and(|app| app.eq_ignore_ascii_case("text-mining"))
    }
}

// ==================== CrossrefProvider ====================

/// Resolves DOIs to candidate PDF locations via the Crossref REST API.
///
/// Requests carry a `mailto` parameter for Crossref's polite pool.
pub struct CrossrefProvider {
    http: ProviderHttp,
    base_url: String,
    mailto: String,
}

impl CrossrefProvider {
    /// Creates a provider against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::LookupFailed`] if the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates a provider against a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::LookupFailed`] if the HTTP client cannot be built.
    pub fn with_base_url(
        settings: &ProviderSettings,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = build_provider_client(
            NAME,
            &user_agent::polite_user_agent(&settings.contact_email),
            settings,
        )?;
        let limiter = Arc::new(RateLimiter::new(settings.request_interval));
        Ok(Self {
            http: ProviderHttp::new(NAME, client, limiter),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto: settings.contact_email.clone(),
        })
    }

    /// Fetches a landing page and returns its PDF links. Failures yield nothing.
    async fn crawl_page(&self, page_url: &str) -> Vec<String> {
        let response = match self.http.get(page_url).await {
            Ok(response) => response,
            Err(e) => {
                warn!(page = page_url, error = %e, "landing page fetch failed");
                return Vec::new();
            }
        };
        let final_url = response.url().clone();
        match response.text().await {
            Ok(html) => extract_pdf_links(&html, &final_url),
            Err(e) => {
                warn!(page = page_url, error = %e, "landing page body unreadable");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for CrossrefProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefProvider")
            .field("base_url", &self.base_url)
            .field("mailto", &self.mailto)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceProvider for CrossrefProvider {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(provider = NAME, doi = %doi))]
    async fn resolve(&self, doi: &Doi) -> Result<Vec<CandidateLocation>, ProviderError> {
        let url = format!(
            "{}/works/{}?mailto={}",
            self.base_url,
            doi.encoded(),
            urlencoding::encode(&self.mailto)
        );
        debug!(api_url = %url, "calling Crossref API");

        let response = self.http.get(&url).await?;
        let body: CrossrefResponse = response.json().await.map_err(|e| {
            ProviderError::lookup_failed(NAME, format!("unexpected response format: {e}"))
        })?;
        if !body.status.eq_ignore_ascii_case("ok") {
            return Err(ProviderError::lookup_failed(
                NAME,
                format!("response status was '{}'", body.status),
            ));
        }

        let links = body.message.link;
        let mut candidates = Vec::new();
        for (url, confidence) in direct_pdf_links(&links)
            .into_iter()
            .map(|u| (u, DIRECT_PDF_CONFIDENCE))
            .chain(
                rewritten_pdf_links(&links)
                    .into_iter()
                    .map(|u| (u, REWRITTEN_PDF_CONFIDENCE)),
            )
        {
            push_unique(&mut candidates, url, confidence);
        }

        for page in crawl_targets(&links) {
            for url in self.crawl_page(&page).await {
                push_unique(&mut candidates, url, CRAWLED_PDF_CONFIDENCE);
            }
        }

        debug!(count = candidates.len(), "Crossref candidates");
        if candidates.is_empty() {
            return Err(ProviderError::not_found(NAME));
        }
        Ok(candidates)
    }
}

// ==================== Extraction Helpers ====================

fn push_unique(candidates: &mut Vec<CandidateLocation>, url: String, confidence: u8) {
    if !candidates.iter().any(|c| c.url == url) {
        candidates.push(CandidateLocation::new(NAME, url, ContentKind::Pdf, confidence));
    }
}

/// Links declared as PDF or whose path ends in `.pdf`.
fn direct_pdf_links(links: &[CrossrefLink]) -> Vec<String> {
    links
        .iter()
        .filter(|link| link.has_content_type("application/pdf") || link.url().is_some_and(is_pdf_path))
        .filter_map(|link| link.url().map(str::to_string))
        .collect()
}

/// MDPI serves the PDF at the same path with `/htm` replaced by `/pdf`.
fn rewritten_pdf_links(links: &[CrossrefLink]) -> Vec<String> {
    links
        .iter()
        .filter_map(CrossrefLink::url)
        .filter_map(|raw| {
            let mut url = Url::parse(raw).ok()?;
            let is_mdpi = url
                .host_str()
                .is_some_and(|h| h == "mdpi.com" || h.ends_with(".mdpi.com"));
            if !is_mdpi || !url.path().ends_with("/htm") {
                return None;
            }
            let path = format!("{}/pdf", url.path().trim_end_matches("/htm"));
            url.set_path(&path);
            Some(url.to_string())
        })
        .collect()
}

/// Landing pages worth crawling: HTML and text-mining links first, others after.
fn crawl_targets(links: &[CrossrefLink]) -> Vec<String> {
    let (preferred, rest): (Vec<&CrossrefLink>, Vec<&CrossrefLink>) = links
        .iter()
        .partition(|link| link.has_content_type("text/html") || link.is_text_mining());

    let mut targets: Vec<String> = Vec::new();
    for url in preferred.into_iter().chain(rest).filter_map(CrossrefLink::url) {
        if is_pdf_path(url) || targets.iter().any(|t| t == url) {
            continue;
        }
        targets.push(url.to_string());
        if targets.len() == MAX_CRAWL_PAGES {
            break;
        }
    }
    targets
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn link(url: &str, content_type: Option<&str>, app: Option<&str>) -> CrossrefLink {
        CrossrefLink {
            url: Some(url.to_string()),
            content_type: content_type.map(str::to_string),
            intended_application: app.map(str::to_string),
        }
    }

    fn settings() -> ProviderSettings {
        ProviderSettings {
            contact_email: "test@example.com".to_string(),
            request_interval: std::time::Duration::ZERO,
            ..ProviderSettings::default()
        }
    }

    // ==================== Serde Deserialization Tests ====================

    #[test]
    fn test_crossref_response_deserialize_full() {
        let json = serde_json::json!({
            "status": "ok",
            "message": {
                "title": ["A Test Paper"],
                "link": [{
                    "URL": "https://publisher.com/paper.pdf",
                    "content-type": "application/pdf",
                    "content-version": "vor",
                    "intended-application": "text-mining"
                }]
            }
        });

        let resp: CrossrefResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.message.link[0].url(), Some("https://publisher.com/paper.pdf"));
        assert!(resp.message.link[0].is_text_mining());
    }

    #[test]
    fn test_crossref_response_deserialize_minimal() {
        let json = serde_json::json!({"status": "ok", "message": {}});
        let resp: CrossrefResponse = serde_json::from_value(json).unwrap();
        assert!(resp.message.link.is_empty());
    }

    // ==================== Link Extraction Tests ====================

    #[test]
    fn test_direct_pdf_links_by_content_type_or_extension() {
        let links = vec![
            link("https://p.example/a", Some("application/pdf; charset=binary"), None),
            link("https://p.example/b.PDF", Some("unspecified"), None),
            link("https://p.example/c.html", Some("text/html"), None),
        ];
        assert_eq!(
            direct_pdf_links(&links),
            vec!["https://p.example/a".to_string(), "https://p.example/b.PDF".to_string()]
        );
    }

    #[test]
    fn test_rewritten_pdf_links_mdpi_only() {
        let links = vec![
            link("https://www.mdpi.com/2073-4409/9/1/12/htm", Some("text/html"), None),
            link("https://other.example/article/htm", Some("text/html"), None),
        ];
        assert_eq!(
            rewritten_pdf_links(&links),
            vec!["https://www.mdpi.com/2073-4409/9/1/12/pdf".to_string()]
        );
    }

    #[test]
    fn test_crawl_targets_prefers_html_and_caps_count() {
        let links = vec![
            link("https://p.example/xml", Some("text/xml"), None),
            link("https://p.example/landing", Some("text/html"), None),
            link("https://p.example/tdm", None, Some("text-mining")),
            link("https://p.example/direct.pdf", Some("text/html"), None),
            link("https://p.example/other", None, None),
        ];
        assert_eq!(
            crawl_targets(&links),
            vec![
                "https://p.example/landing".to_string(),
                "https://p.example/tdm".to_string(),
                "https://p.example/xml".to_string(),
            ]
        );
    }

    // ==================== Provider Tests (wiremock) ====================

    #[tokio::test]
    async fn test_crossref_resolve_orders_direct_rewritten_crawled() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let base = mock_server.uri();
        Mock::given(method("GET"))
            .and(path_regex(r"^/works/10\.1234%2Fabc$"))
            .and(query_param("mailto", "test@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "message": {
                    "link": [
                        {"URL": format!("{base}/landing"), "content-type": "text/html"},
                        {"URL": "https://pub.example/full.pdf", "content-type": "application/pdf"}
                    ]
                }
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><a href="/files/scraped.pdf">Download</a></html>"#,
            ))
            .mount(&mock_server)
            .await;

        let provider = CrossrefProvider::with_base_url(&settings(), &base).unwrap();
        let doi = Doi::parse("10.1234/abc").unwrap();
        let candidates = provider.resolve(&doi).await.unwrap();

        let urls: Vec<String> = candidates.iter().map(|c| c.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                "https://pub.example/full.pdf".to_string(),
                format!("{base}/files/scraped.pdf"),
            ]
        );
        assert_eq!(candidates[0].confidence, 70);
        assert_eq!(candidates[1].confidence, 50);
    }

    #[tokio::test]
    async fn test_crossref_resolve_crawl_failure_is_skipped() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let base = mock_server.uri();
        Mock::given(method("GET"))
            .and(path_regex(r"^/works/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "message": {"link": [{"URL": format!("{base}/gone"), "content-type": "text/html"}]}
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = CrossrefProvider::with_base_url(&settings(), &base).unwrap();
        let doi = Doi::parse("10.1234/abc").unwrap();
        assert_eq!(
            provider.resolve(&doi).await.unwrap_err(),
            ProviderError::not_found("crossref")
        );
    }

    #[tokio::test]
    async fn test_crossref_resolve_429_is_rate_limited() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
            .mount(&mock_server)
            .await;

        let provider = CrossrefProvider::with_base_url(&settings(), mock_server.uri()).unwrap();
        let doi = Doi::parse("10.1234/abc").unwrap();
        assert_eq!(
            provider.resolve(&doi).await.unwrap_err(),
            ProviderError::rate_limited("crossref", Some(std::time::Duration::from_secs(2)))
        );
    }

    #[tokio::test]
    async fn test_crossref_resolve_status_not_ok_is_lookup_failed() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "error", "message": {}})),
            )
            .mount(&mock_server)
            .await;

        let provider = CrossrefProvider::with_base_url(&settings(), mock_server.uri()).unwrap();
        let doi = Doi::parse("10.1234/abc").unwrap();
        assert!(matches!(
            provider.resolve(&doi).await.unwrap_err(),
            ProviderError::LookupFailed { .. }
        ));
    }
}
