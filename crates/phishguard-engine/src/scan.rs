//! Candidate-URL extraction from message text.
//!
//! Inbound messages (SMS and the like) are scanned for `http(s)` URLs;
//! every match is a candidate for the detection pipeline. Only the
//! extraction lives here; hooking a platform message source is the caller's
//! problem.

use regex::Regex;
use std::sync::OnceLock;

static URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn url_pattern() -> &'static Regex {
    URL_PATTERN.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("valid url pattern"))
}

/// Extract all `http://`/`https://` URLs from free-form text, in order of
/// appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
