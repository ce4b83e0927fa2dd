//! paperfetch core library
//!
//! Resolves batches of DOIs to downloadable documents and writes them to an
//! output directory, reporting a per-DOI outcome.
//!
//! # Architecture
//!
//! - [`parser`] - DOI normalization and input list extraction
//! - [`provider`] - Source providers and the ordered resolution chain
//! - [`download`] - Fetcher, retry policy, rate limiting and file naming
//! - [`batch`] - Bounded-concurrency scheduler, outcomes and progress
//! - [`report`] - Table, JSON lines and summary CSV rendering
//! - [`config`] - TOML configuration with CLI overrides

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod download;
pub mod parser;
pub mod provider;
pub mod report;

#[cfg(test)]
mod test_support;
mod user_agent;

// Re-export commonly used types
pub use batch::{
    BatchError, BatchOptions, BatchReport, BatchRun, BatchScheduler, CancellationFlag, DoiOutcome,
    OutcomeStatus, ProgressSnapshot,
};
pub use config::{CliOverrides, ConfigError, EngineConfig};
pub use download::{DocumentFetcher, FetchResult, FetchedDocument, HttpFetcher};
pub use parser::{Doi, ParseError, normalize_doi};
pub use provider::{
    CandidateLocation, ChainReport, ChainResult, ContentKind, ProviderError, ProviderKind,
    ResolutionChain, SourceProvider, build_resolution_chain,
};
