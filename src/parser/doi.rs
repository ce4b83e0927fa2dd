//! DOI validation and normalization.
//!
//! [`normalize_doi`] is the single entry point that turns a raw user string
//! into a [`Doi`]. It is pure: no I/O, no logging above `trace`.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tracing::trace;

use super::error::ParseError;

/// URL and host prefixes stripped before validation, compared case-insensitively.
const URL_PREFIXES: [&str; 8] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "https://www.doi.org/",
    "http://www.doi.org/",
    "doi.org/",
    "dx.doi.org/",
];

/// Minimum digits in the first registrant segment (`10.1000/...`).
const MIN_REGISTRANT_DIGITS: usize = 4;

/// Maximum digits in the first registrant segment.
const MAX_REGISTRANT_DIGITS: usize = 9;

/// A normalized Digital Object Identifier.
///
/// Always lower-case, free of URL and `doi:` prefixes, and shaped like
/// `10.<registrant>/<suffix>`. The only way to build one is through
/// [`normalize_doi`] (or its aliases [`Doi::parse`] and [`FromStr`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Doi(String);

impl Doi {
    /// Normalizes `raw` into a DOI.
    ///
    /// # Errors
    ///
    /// Same as [`normalize_doi`].
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        normalize_doi(raw)
    }

    /// Returns the canonical DOI string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the DOI percent-encoded as a single path segment (`/` → `%2F`).
    ///
    /// Used for REST APIs that take the DOI as one segment.
    #[must_use]
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }

    /// Returns the DOI percent-encoded per segment, keeping `/` separators.
    ///
    /// Used for resolvers that expect the DOI verbatim in the path.
    #[must_use]
    pub fn path_encoded(&self) -> String {
        self.0
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Doi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Doi {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_doi(s)
    }
}

impl Serialize for Doi {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Validates and canonicalizes a raw DOI string.
///
/// Trims whitespace, strips `https://doi.org/`-style prefixes and a leading
/// `doi:`, percent-decodes, and lower-cases the identifier.
///
/// # Errors
///
/// - [`ParseError::EmptyInput`] for empty or whitespace-only input.
/// - [`ParseError::InvalidDoi`] for anything that does not match the DOI grammar.
///
/// # Examples
///
/// ```
/// use paperfetch_core::parser::normalize_doi;
///
/// let doi = normalize_doi(" https://doi.org/10.1126/Science.ABA2420 ").unwrap();
/// assert_eq!(doi.as_str(), "10.1126/science.aba2420");
/// assert!(normalize_doi("not-a-doi").is_err());
/// ```
pub fn normalize_doi(raw: &str) -> Result<Doi, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let mut candidate = trimmed;
    for prefix in URL_PREFIXES {
        if let Some(stripped) = strip_prefix_ignore_case(candidate, prefix) {
            candidate = stripped;
            break;
        }
    }
    if let Some(stripped) = strip_prefix_ignore_case(candidate, "doi:") {
        candidate = stripped.trim_start();
    }

    let decoded = match urlencoding::decode(candidate) {
        Ok(decoded) => decoded.trim().to_string(),
        Err(_) => candidate.trim().to_string(),
    };
    let canonical = decoded.to_lowercase();

    validate_doi(&canonical).map_err(|err| match err {
        // Report against what the user typed, not the intermediate form.
        ParseError::InvalidDoi {
            reason, suggestion, ..
        } => ParseError::InvalidDoi {
            input: trimmed.to_string(),
            reason,
            suggestion,
        },
        other => other,
    })?;

    trace!(raw = %raw, doi = %canonical, "normalized DOI");
    Ok(Doi(canonical))
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// Checks the `10.<registrant>/<suffix>` grammar.
///
/// - Must start with `10.`
/// - First registrant segment is 4-9 digits, further `.`-separated segments are digits
/// - Suffix is non-empty and free of whitespace and control characters
fn validate_doi(doi: &str) -> Result<(), ParseError> {
    let Some(rest) = doi.strip_prefix("10.") else {
        return Err(ParseError::invalid_doi(doi, "DOI must start with '10.'"));
    };

    let Some((registrant, suffix)) = rest.split_once('/') else {
        return Err(ParseError::doi_no_suffix(doi));
    };

    if registrant.is_empty() {
        return Err(ParseError::invalid_doi(
            doi,
            "missing registrant code after '10.'",
        ));
    }

    let mut segments = registrant.split('.');
    let first = segments.next().unwrap_or("");
    if !(MIN_REGISTRANT_DIGITS..=MAX_REGISTRANT_DIGITS).contains(&first.len())
        || !first.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseError::invalid_doi(
            doi,
            "registrant code must have 4 to 9 digits",
        ));
    }
    if segments.any(|s| s.is_empty() || !s.chars().all(|c| c.is_ascii_digit())) {
        return Err(ParseError::invalid_doi(
            doi,
            "registrant sub-codes must be numeric",
        ));
    }

    if suffix.is_empty() {
        return Err(ParseError::doi_no_suffix(doi));
    }
    if suffix.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ParseError::invalid_doi(
            doi,
            "DOI suffix must not contain whitespace",
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Canonicalization Tests ====================

    #[test]
    fn test_normalize_bare_doi_unchanged() {
        let doi = normalize_doi("10.1038/nphys1170").unwrap();
        assert_eq!(doi.as_str(), "10.1038/nphys1170");
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        let doi = normalize_doi(" 10.1126/science.aba2420 ").unwrap();
        assert_eq!(doi.as_str(), "10.1126/science.aba2420");
    }

    #[test]
    fn test_normalize_strips_doi_org_prefix() {
        let doi = normalize_doi("https://doi.org/10.1234/example").unwrap();
        assert_eq!(doi.as_str(), "10.1234/example");
    }

    #[test]
    fn test_normalize_strips_dx_and_http_prefixes() {
        for raw in [
            "http://doi.org/10.1234/example",
            "https://dx.doi.org/10.1234/example",
            "http://dx.doi.org/10.1234/example",
            "doi.org/10.1234/example",
            "HTTPS://DOI.ORG/10.1234/example",
        ] {
            assert_eq!(normalize_doi(raw).unwrap().as_str(), "10.1234/example", "{raw}");
        }
    }

    #[test]
    fn test_normalize_strips_doi_label() {
        assert_eq!(
            normalize_doi("doi:10.1234/example").unwrap().as_str(),
            "10.1234/example"
        );
        assert_eq!(
            normalize_doi("DOI: 10.1234/example").unwrap().as_str(),
            "10.1234/example"
        );
    }

    #[test]
    fn test_normalize_lowercases() {
        let doi = normalize_doi("10.1002/ANIE.202312345").unwrap();
        assert_eq!(doi.as_str(), "10.1002/anie.202312345");
    }

    #[test]
    fn test_normalize_prefixed_matches_stripped_form() {
        let plain = normalize_doi("10.1126/science.aba2420").unwrap();
        let prefixed = normalize_doi("  https://doi.org/10.1126/SCIENCE.aba2420\t").unwrap();
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn test_normalize_percent_decodes() {
        let doi = normalize_doi("https://doi.org/10.1002%2F%28SICI%291097-4636").unwrap();
        assert_eq!(doi.as_str(), "10.1002/(sici)1097-4636");
    }

    #[test]
    fn test_normalize_nested_registrant() {
        assert_eq!(
            normalize_doi("10.1000.10/example").unwrap().as_str(),
            "10.1000.10/example"
        );
    }

    // ==================== Rejection Tests ====================

    #[test]
    fn test_normalize_empty_is_empty_input() {
        assert!(matches!(normalize_doi(""), Err(ParseError::EmptyInput)));
        assert!(matches!(normalize_doi("  \t "), Err(ParseError::EmptyInput)));
    }

    #[test]
    fn test_normalize_rejects_non_doi() {
        let err = normalize_doi("not-a-doi").unwrap_err();
        match err {
            ParseError::InvalidDoi { input, .. } => assert_eq!(input, "not-a-doi"),
            other => panic!("expected InvalidDoi, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_rejects_short_registrant() {
        assert!(normalize_doi("10.123/abc").is_err());
    }

    #[test]
    fn test_normalize_rejects_missing_suffix() {
        assert!(normalize_doi("10.1234/").is_err());
        assert!(normalize_doi("10.1234").is_err());
    }

    #[test]
    fn test_normalize_rejects_inner_whitespace() {
        assert!(normalize_doi("10.1234/abc def").is_err());
    }

    #[test]
    fn test_normalize_rejects_non_numeric_subcode() {
        assert!(normalize_doi("10.1234.x/abc").is_err());
    }

    #[test]
    fn test_normalize_rejects_bare_url() {
        assert!(normalize_doi("https://example.com/paper.pdf").is_err());
    }

    // ==================== Doi Accessor Tests ====================

    #[test]
    fn test_doi_encoded_escapes_slash() {
        let doi = Doi::parse("10.1234/ab").unwrap();
        assert_eq!(doi.encoded(), "10.1234%2Fab");
    }

    #[test]
    fn test_doi_path_encoded_keeps_slash() {
        let doi = Doi::parse("10.1002/(sici)1097<x>").unwrap();
        assert_eq!(doi.path_encoded(), "10.1002/%28sici%291097%3Cx%3E");
    }

    #[test]
    fn test_doi_from_str_and_display() {
        let doi: Doi = "DOI:10.5555/ABC".parse().unwrap();
        assert_eq!(doi.to_string(), "10.5555/abc");
    }

    #[test]
    fn test_doi_serializes_as_string() {
        let doi = Doi::parse("10.5555/abc").unwrap();
        assert_eq!(serde_json::to_string(&doi).unwrap(), "\"10.5555/abc\"");
    }
}
