//! Link extraction from landing pages: `citation_pdf_url` meta tags, `.pdf`
//! anchors, and `<embed id="pdf">` viewers.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// `<meta name="citation_pdf_url" content="...">`, either attribute order.
static CITATION_PDF_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<meta\s+[^>]*?(?:(?:name|property)\s*=\s*["']citation_pdf_url["'][^>]*?content\s*=\s*["']([^"']+)["']|content\s*=\s*["']([^"']+)["'][^>]*?(?:name|property)\s*=\s*["']citation_pdf_url["'])"#,
    )
});

/// `<a href="...">` targets.
static ANCHOR_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?is)<a\s+[^>]*?href\s*=\s*["']([^"']+)["']"#));

/// `<embed ...>` / `<iframe ...>` opening tags.
static VIEWER_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<(?:embed|iframe)\b[^>]*>"));

static ID_PDF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?i)\bid\s*=\s*["']?pdf["'\s>/]"#));

static SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#));

/// Resolves a possibly relative URL string against a base URL.
///
/// Absolute `http(s)` values are returned as-is, `//host/x` becomes
/// `https://host/x`, anything else is joined with `base_url`.
#[must_use]
pub(crate) fn absolutize_url(value: &str, base_url: &Url) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(value.to_string());
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base_url.join(value).ok().map(|url| url.to_string())
}

/// Returns `true` when the URL path ends in `.pdf` (query and fragment ignored).
#[must_use]
pub(crate) fn is_pdf_path(url: &str) -> bool {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_ascii_lowercase().ends_with(".pdf")
}

/// Collects PDF links from a landing page, meta tags first.
///
/// Results are absolute and deduplicated, in document order.
#[must_use]
pub(crate) fn extract_pdf_links(html: &str, page_url: &Url) -> Vec<String> {
    let meta = CITATION_PDF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| decode_entities(m.as_str()));
    let anchors = ANCHOR_HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()))
        .filter(|href| is_pdf_path(href));

    let mut links: Vec<String> = Vec::new();
    for raw in meta.chain(anchors) {
        if let Some(absolute) = absolutize_url(&raw, page_url)
            && !links.contains(&absolute)
        {
            links.push(absolute);
        }
    }
    links
}

/// Returns the `src` of the first `<embed id="pdf">` or `<iframe id="pdf">`.
///
/// The result is absolute and has any `#fragment` removed.
#[must_use]
pub(crate) fn extract_embedded_pdf(html: &str, page_url: &Url) -> Option<String> {
    VIEWER_TAG_RE
        .find_iter(html)
        .map(|tag| tag.as_str())
        .filter(|tag| ID_PDF_RE.is_match(tag))
        .find_map(|tag| SRC_RE.captures(tag).and_then(|caps| caps.get(1)))
        .and_then(|src| absolutize_url(&decode_entities(src.as_str()), page_url))
        .map(|url| match url.split_once('#') {
            Some((head, _)) => head.to_string(),
            None => url,
        })
}

fn decode_entities(value: &str) -> String {
    value.trim().replace("&amp;", "&")
}
