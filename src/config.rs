//! Engine configuration: TOML file defaults, CLI overrides, validation.
//!
//! Every field has a default, so a partial file (or none at all) is valid.
//!
//! ```toml
//! output_dir = "papers"
//! concurrency = 8
//! providers = ["unpaywall", "crossref"]
//!
//! [endpoints]
//! crossref = "https://api.crossref.org"
//! ```

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::batch::{BatchOptions, MAX_CONCURRENCY};
use crate::provider::{DEFAULT_MAX_ATTEMPTS_PER_DOI, ProviderKind, ProviderSettings};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PAPERFETCH_CONFIG";

const APP_DIR: &str = "paperfetch";
const CONFIG_FILE: &str = "config.toml";
const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_PROVIDER_RETRIES: u32 = 10;
const MAX_INTERVAL_MS: u64 = 60_000;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A value is out of range or malformed.
    #[error("invalid config value for `{field}`: {reason}\n  Suggestion: {suggestion}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// What is wrong.
        reason: String,
        /// How to fix it.
        suggestion: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// Base URLs for the built-in metadata services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Endpoints {
    /// Unpaywall API base.
    pub unpaywall: String,
    /// Crossref API base.
    pub crossref: String,
    /// DOI resolver base.
    pub doi_org: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            unpaywall: crate::provider::UNPAYWALL_BASE_URL.to_string(),
            crossref: crate::provider::CROSSREF_BASE_URL.to_string(),
            doi_org: crate::provider::DOI_ORG_BASE_URL.to_string(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory downloads are written to.
    pub output_dir: PathBuf,
    /// Maximum DOIs in flight.
    pub concurrency: usize,
    /// Metadata lookup timeout in seconds.
    pub request_timeout_secs: u64,
    /// Whole-download timeout in seconds.
    pub download_timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Retries after a rate-limited provider lookup.
    pub max_provider_retries: u32,
    /// Cap on lookups plus fetches per DOI.
    pub max_attempts_per_doi: u32,
    /// Overwrite existing files instead of reusing them.
    pub force_redownload: bool,
    /// Contact address for polite-pool APIs.
    pub contact_email: String,
    /// Providers in chain order.
    pub providers: Vec<ProviderKind>,
    /// Mirror base URLs for the mirror provider.
    pub mirrors: Vec<String>,
    /// Minimum gap between requests to one host, per provider.
    pub provider_interval_ms: u64,
    /// Minimum gap between downloads from one host.
    pub download_interval_ms: u64,
    /// Service base URLs.
    pub endpoints: Endpoints,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            concurrency: crate::batch::DEFAULT_CONCURRENCY,
            request_timeout_secs: 30,
            download_timeout_secs: 300,
            connect_timeout_secs: 10,
            max_provider_retries: crate::download::DEFAULT_MAX_RETRIES,
            max_attempts_per_doi: DEFAULT_MAX_ATTEMPTS_PER_DOI,
            force_redownload: false,
            contact_email: "paperfetch@example.com".to_string(),
            providers: ProviderKind::DEFAULT_ORDER.to_vec(),
            mirrors: Vec::new(),
            provider_interval_ms: 1000,
            download_interval_ms: 500,
            endpoints: Endpoints::default(),
        }
    }
}

/// Values given on the command line; `None` keeps the file/default value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--output-dir`.
    pub output_dir: Option<PathBuf>,
    /// `--concurrency`.
    pub concurrency: Option<usize>,
    /// `--max-retries`.
    pub max_provider_retries: Option<u32>,
    /// `--max-attempts`.
    pub max_attempts_per_doi: Option<u32>,
    /// `--timeout`.
    pub request_timeout_secs: Option<u64>,
    /// `--download-timeout`.
    pub download_timeout_secs: Option<u64>,
    /// `--providers`.
    pub providers: Option<Vec<ProviderKind>>,
    /// `--mirror` (repeatable); replaces the file list when non-empty.
    pub mirrors: Vec<String>,
    /// `--email`.
    pub contact_email: Option<String>,
    /// `--force`.
    pub force_redownload: bool,
}

impl EngineConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] (with `path` as the label) on invalid TOML.
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Loads a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Loads `explicit` when given, else the default file when it exists, else defaults.
    ///
    /// # Errors
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }
        match resolve_default_config_path() {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "loading default config file");
                Ok((Self::load_from(&path)?, Some(path)))
            }
            _ => Ok((Self::default(), None)),
        }
    }

    /// Applies command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(retries) = overrides.max_provider_retries {
            self.max_provider_retries = retries;
        }
        if let Some(attempts) = overrides.max_attempts_per_doi {
            self.max_attempts_per_doi = attempts;
        }
        if let Some(timeout) = overrides.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(timeout) = overrides.download_timeout_secs {
            self.download_timeout_secs = timeout;
        }
        if let Some(providers) = overrides.providers {
            self.providers = providers;
        }
        if !overrides.mirrors.is_empty() {
            self.mirrors = overrides.mirrors;
        }
        if let Some(email) = overrides.contact_email {
            self.contact_email = email;
        }
        if overrides.force_redownload {
            self.force_redownload = true;
        }
    }

    /// Checks ranges and formats.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::InvalidValue`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!("{} is out of range", self.concurrency),
                format!("Use a value between 1 and {MAX_CONCURRENCY}"),
            ));
        }
        validate_timeout("request_timeout_secs", self.request_timeout_secs)?;
        validate_timeout("download_timeout_secs", self.download_timeout_secs)?;
        validate_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        if self.max_provider_retries > MAX_PROVIDER_RETRIES {
            return Err(ConfigError::invalid(
                "max_provider_retries",
                format!("{} is out of range", self.max_provider_retries),
                format!("Use a value between 0 and {MAX_PROVIDER_RETRIES}"),
            ));
        }
        if self.max_attempts_per_doi == 0 {
            return Err(ConfigError::invalid(
                "max_attempts_per_doi",
                "must be at least 1",
                "Use a value of 1 or more",
            ));
        }
        validate_interval("provider_interval_ms", self.provider_interval_ms)?;
        validate_interval("download_interval_ms", self.download_interval_ms)?;
        self.validate_providers()?;
        validate_url("endpoints.unpaywall", &self.endpoints.unpaywall)?;
        validate_url("endpoints.crossref", &self.endpoints.crossref)?;
        validate_url("endpoints.doi_org", &self.endpoints.doi_org)?;
        for mirror in &self.mirrors {
            validate_url("mirrors", mirror)?;
        }
        let email = self.contact_email.trim();
        if email.is_empty() || email.chars().any(char::is_control) {
            return Err(ConfigError::invalid(
                "contact_email",
                "must be a non-empty address without control characters",
                "Set contact_email to an address the API operators can reach",
            ));
        }
        Ok(())
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::invalid(
                "providers",
                "the provider list is empty",
                "List at least one of: unpaywall, crossref, doi-org, mirror",
            ));
        }
        for (index, kind) in self.providers.iter().enumerate() {
            if self.providers[..index].contains(kind) {
                return Err(ConfigError::invalid(
                    "providers",
                    format!("'{kind}' is listed more than once"),
                    "List each provider once, in the order to try them",
                ));
            }
        }
        Ok(())
    }

    /// Provider client settings derived from this config.
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            contact_email: self.contact_email.trim().to_string(),
            connect_timeout: self.connect_timeout(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            request_interval: Duration::from_millis(self.provider_interval_ms),
        }
    }

    /// Batch scheduler options derived from this config.
    #[must_use]
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            force_redownload: self.force_redownload,
        }
    }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-download timeout.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Minimum gap between downloads from one host.
    #[must_use]
    pub fn download_interval(&self) -> Duration {
        Duration::from_millis(self.download_interval_ms)
    }
}

fn validate_timeout(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if (1..=MAX_TIMEOUT_SECS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{value} is out of range"),
            format!("Use a value between 1 and {MAX_TIMEOUT_SECS} seconds"),
        ))
    }
}

fn validate_interval(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value <= MAX_INTERVAL_MS {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("{value} is out of range"),
            format!("Use a value between 0 and {MAX_INTERVAL_MS} milliseconds"),
        ))
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::invalid(
            field,
            format!("'{value}' is not an http(s) URL"),
            "Use an absolute URL such as https://example.org/",
        )),
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$PAPERFETCH_CONFIG`
/// 2. `$XDG_CONFIG_HOME/paperfetch/config.toml`
/// 3. `$HOME/.config/paperfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env_var_non_empty_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(explicit));
    }
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join(APP_DIR).join(CONFIG_FILE))
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
