//! Unpaywall open-access lookup.
//!
//! `GET {base}/v2/{doi}?email={contact}` returns the known open-access
//! copies of a work. The best location is offered first.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::http_client::{ProviderHttp, ProviderSettings, build_provider_client};
use super::{CandidateLocation, ContentKind, ProviderError, SourceProvider};
use crate::download::RateLimiter;
use crate::parser::Doi;
use crate::user_agent;

/// Default Unpaywall API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.unpaywall.org";

const NAME: &str = "unpaywall";
const BEST_LOCATION_CONFIDENCE: u8 = 90;
const OTHER_LOCATION_CONFIDENCE: u8 = 80;

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: bool,
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

/// Resolves DOIs to open-access PDF copies via the Unpaywall API.
pub struct UnpaywallProvider {
    http: ProviderHttp,
    base_url: String,
    email: String,
}

impl UnpaywallProvider {
    /// Creates a provider against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::LookupFailed`] if the HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates a provider against a custom base URL.
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
            email: settings.contact_email.clone(),
        })
    }

    fn lookup_url(&self, doi: &Doi) -> String {
        format!(
            "{}/v2/{}?email={}",
            self.base_url,
            doi.encoded(),
            urlencoding::encode(&self.email)
        )
    }
}

impl std::fmt::Debug for UnpaywallProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnpaywallProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceProvider for UnpaywallProvider {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(provider = NAME, doi = %doi))]
    async fn resolve(&self, doi: &Doi) -> Result<Vec<CandidateLocation>, ProviderError> {
        let response = self.http.get(&self.lookup_url(doi)).await?;
        let body: UnpaywallResponse = response.json().await.map_err(|e| {
            ProviderError::lookup_failed(NAME, format!("unexpected response format: {e}"))
        })?;

        let candidates = candidates_from(body);
        debug!(count = candidates.len(), "open-access locations found");
        if candidates.is_empty() {
            return Err(ProviderError::not_found(NAME));
        }
        Ok(candidates)
    }
}

fn candidates_from(body: UnpaywallResponse) -> Vec<CandidateLocation> {
    if !body.is_oa && body.best_oa_location.is_none() && body.oa_locations.is_empty() {
        return Vec::new();
    }

    let best = body
        .best_oa_location
        .and_then(|loc| loc.url_for_pdf)
        .map(|url| (url, BEST_LOCATION_CONFIDENCE));
    let others = body
        .oa_locations
        .into_iter()
        .filter_map(|loc| loc.url_for_pdf)
        .map(|url| (url, OTHER_LOCATION_CONFIDENCE));

    let mut candidates: Vec<CandidateLocation> = Vec::new();
    for (url, confidence) in best.into_iter().chain(others) {
        let url = url.trim().to_string();
        if url.is_empty() || candidates.iter().any(|c| c.url == url) {
            continue;
        }
        candidates.push(CandidateLocation::new(NAME, url, ContentKind::Pdf, confidence));
    }
    candidates
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn settings() -> ProviderSettings {
        ProviderSettings {
            contact_email: "test@example.com".to_string(),
            request_interval: std::time::Duration::ZERO,
            ..ProviderSettings::default()
        }
    }

    // ==================== Extraction Tests ====================

    #[test]
    fn test_candidates_best_first_then_others_deduplicated() {
        let body: UnpaywallResponse = serde_json::from_value(serde_json::json!({
            "is_oa": true,
            "best_oa_location": {"url_for_pdf": "https://repo.example/best.pdf"},
            "oa_locations": [
                {"url_for_pdf": "https://repo.example/best.pdf"},
                {"url_for_pdf": null},
                {"url_for_pdf": "https://other.example/copy.pdf"}
            ]
        }))
        .unwrap();

        let candidates = candidates_from(body);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://repo.example/best.pdf");
        assert_eq!(candidates[0].confidence, 90);
        assert_eq!(candidates[1].url, "https://other.example/copy.pdf");
        assert_eq!(candidates[1].confidence, 80);
        assert!(candidates.iter().all(|c| c.kind == ContentKind::Pdf));
    }

    #[test]
    fn test_candidates_closed_access_is_empty() {
        let body: UnpaywallResponse =
            serde_json::from_value(serde_json::json!({"is_oa": false, "best_oa_location": null}))
                .unwrap();
        assert!(candidates_from(body).is_empty());
    }

    #[test]
    fn test_lookup_url_encodes_doi_and_email() {
        let provider = UnpaywallProvider::with_base_url(&settings(), "https://api.test/").unwrap();
        let doi = Doi::parse("10.1038/nphys1170").unwrap();
        assert_eq!(
            provider.lookup_url(&doi),
            "https://api.test/v2/10.1038%2Fnphys1170?email=test%40example.com"
        );
    }

    // ==================== Provider Tests (wiremock) ====================

    #[tokio::test]
    async fn test_unpaywall_resolve_success() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/v2/10.1038%2Fnphys1170"))
            .and(query_param("email", "test@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "is_oa": true,
                "best_oa_location": {"url_for_pdf": "https://repo.example/a.pdf"},
                "oa_locations": []
            })))
            .mount(&mock_server)
            .await;

        let provider = UnpaywallProvider::with_base_url(&settings(), mock_server.uri()).unwrap();
        let doi = Doi::parse("10.1038/nphys1170").unwrap();
        let candidates = provider.resolve(&doi).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider, "unpaywall");
    }

    #[tokio::test]
    async fn test_unpaywall_resolve_404_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let provider = UnpaywallProvider::with_base_url(&settings(), mock_server.uri()).unwrap();
        let doi = Doi::parse("10.1038/missing").unwrap();
        assert_eq!(
            provider.resolve(&doi).await.unwrap_err(),
            ProviderError::not_found("unpaywall")
        );
    }

    #[tokio::test]
    async fn test_unpaywall_resolve_bad_json_is_lookup_failed() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let provider = UnpaywallProvider::with_base_url(&settings(), mock_server.uri()).unwrap();
        let doi = Doi::parse("10.1038/nphys1170").unwrap();
        assert!(matches!(
            provider.resolve(&doi).await.unwrap_err(),
            ProviderError::LookupFailed { .. }
        ));
    }
}
