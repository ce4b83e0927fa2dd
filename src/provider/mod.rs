//! Source providers and the resolution chain.
//!
//! A [`SourceProvider`] turns a [`Doi`] into ordered [`CandidateLocation`]s.
//! The [`ResolutionChain`] walks providers in configured order and hands
//! each candidate to a [`DocumentFetcher`](crate::download::DocumentFetcher)
//! until one succeeds.
//!
//! # Architecture
//!
//! - [`UnpaywallProvider`] - open-access copies from the Unpaywall API
//! - [`CrossrefProvider`] - publisher links from Crossref metadata
//! - [`DoiOrgProvider`] - publisher landing pages via the DOI resolver
//! - [`MirrorProvider`] - user-configured mirror sites, tried last
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use paperfetch_core::config::EngineConfig;
//! use paperfetch_core::parser::Doi;
//! use paperfetch_core::provider::{ChainResult, build_resolution_chain};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = build_resolution_chain(&EngineConfig::default())?;
//! let doi = Doi::parse("10.1038/nphys1170")?;
//! let report = chain.resolve_all(&doi, Path::new("downloads/10.1038_nphys1170.pdf")).await;
//! if let ChainResult::Downloaded { provider, .. } = report.result {
//!     println!("downloaded via {provider}");
//! }
//! # Ok(())
//! # }
//! ```

mod chain;
mod crossref;
mod doi_org;
mod error;
mod html;
mod http_client;
mod mirror;
mod unpaywall;

pub use chain::{
    Attempt, AttemptOutcome, ChainBuildError, ChainReport, ChainResult, ResolutionChain,
    build_resolution_chain, DEFAULT_MAX_ATTEMPTS_PER_DOI,
};
pub use crossref::{CrossrefProvider, DEFAULT_BASE_URL as CROSSREF_BASE_URL};
pub use doi_org::{DEFAULT_BASE_URL as DOI_ORG_BASE_URL, DoiOrgProvider};
pub use error::ProviderError;
pub use http_client::ProviderSettings;
pub use mirror::MirrorProvider;
pub use unpaywall::{DEFAULT_BASE_URL as UNPAYWALL_BASE_URL, UnpaywallProvider};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::parser::Doi;

/// What a candidate URL is expected to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// A PDF: HTML responses and bodies without the PDF signature are rejected.
    Pdf,
    /// Any non-empty body is accepted.
    Any,
}

/// A URL believed to serve the document for a DOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateLocation {
    /// Name of the provider that produced the candidate.
    pub provider: String,
    /// Absolute URL to fetch.
    pub url: String,
    /// Expected content.
    pub kind: ContentKind,
    /// Provider confidence, higher is better.
    pub confidence: u8,
}

impl CandidateLocation {
    /// Creates a candidate location.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        url: impl Into<String>,
        kind: ContentKind,
        confidence: u8,
    ) -> Self {
        Self {
            provider: provider.into(),
            url: url.into(),
            kind,
            confidence,
        }
    }
}

/// A service that maps DOIs to candidate document locations.
///
/// `Ok(vec![])` is treated by the chain like [`ProviderError::NotFound`].
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Stable provider name used in attempts, logs and reports.
    fn name(&self) -> &str;

    /// Looks up candidate locations for `doi`.
    async fn resolve(&self, doi: &Doi) -> Result<Vec<CandidateLocation>, ProviderError>;
}

/// The built-in provider strategies, in configuration form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// [`UnpaywallProvider`].
    Unpaywall,
    /// [`CrossrefProvider`].
    Crossref,
    /// [`DoiOrgProvider`].
    DoiOrg,
    /// [`MirrorProvider`].
    Mirror,
}

impl ProviderKind {
    /// Default chain order.
    pub const DEFAULT_ORDER: [Self; 4] = [Self::Unpaywall, Self::Crossref, Self::DoiOrg, Self::Mirror];

    /// Returns the provider's configuration name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaywall => "unpaywall",
            Self::Crossref => "crossref",
            Self::DoiOrg => "doi-org",
            Self::Mirror => "mirror",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::DEFAULT_ORDER
            .into_iter()
            .find(|kind| kind.as_str() == wanted || (wanted == "doi.org" && *kind == Self::DoiOrg))
            .ok_or_else(|| {
                format!(
                    "unknown provider '{s}' (expected one of: unpaywall, crossref, doi-org, mirror)"
                )
            })
    }
}
