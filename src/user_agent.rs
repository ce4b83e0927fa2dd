//! Shared User-Agent string for provider and download HTTP clients.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/paperfetch/paperfetch";

/// Default User-Agent sent with every request (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("paperfetch/{version} (research-tool; +{PROJECT_UA_URL})")
}

/// User-Agent carrying a contact address, for APIs with a polite pool.
#[must_use]
pub(crate) fn polite_user_agent(contact_email: &str) -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("paperfetch/{version} (research-tool; +{PROJECT_UA_URL}; mailto:{contact_email})")
}
