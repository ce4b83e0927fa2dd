//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use paperfetch_core::config::CliOverrides;
use paperfetch_core::provider::ProviderKind;

/// Resolve DOIs to full-text documents and download them.
///
/// Each DOI is looked up through Unpaywall, Crossref, the DOI resolver and
/// any configured mirrors, in order, until a document is retrieved.
#[derive(Parser, Debug)]
#[command(name = "paperfetch")]
#[command(author, version, about)]
pub struct Args {
    /// DOIs to fetch (also accepts https://doi.org/... and doi:... forms)
    #[arg(value_name = "DOIS")]
    pub dois: Vec<String>,

    /// Read DOIs from a file (.csv uses the `doi` column, anything else is a whitespace-separated list)
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory to write documents and the summary CSV to
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum DOIs resolved concurrently (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Retries for a rate-limited provider lookup (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Cap on provider lookups plus fetches per DOI
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Metadata request timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Whole-download timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub download_timeout: Option<u64>,

    /// Providers to try, in order (unpaywall,crossref,doi-org,mirror)
    #[arg(long, value_delimiter = ',')]
    pub providers: Option<Vec<ProviderKind>>,

    /// Mirror base URL the DOI is appended to (repeatable)
    #[arg(long = "mirror", value_name = "URL")]
    pub mirrors: Vec<String>,

    /// Contact email sent to metadata APIs
    #[arg(long)]
    pub email: Option<String>,

    /// Download again even when the output file exists
    #[arg(long)]
    pub force: bool,

    /// Config file (default: ~/.config/paperfetch/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Do not write download_summary.csv
    #[arg(long)]
    pub no_summary: bool,

    /// Print outcomes as JSON lines instead of a table
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Command-line values that override the config file.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_dir: self.output_dir.clone(),
            concurrency: self.concurrency.map(usize::from),
            max_provider_retries: self.max_retries.map(u32::from),
            max_attempts_per_doi: self.max_attempts,
            request_timeout_secs: self.timeout,
            download_timeout_secs: self.download_timeout,
            providers: self.providers.clone(),
            mirrors: self.mirrors.clone(),
            contact_email: self.email.clone(),
            force_redownload: self.force,
        }
    }
}
