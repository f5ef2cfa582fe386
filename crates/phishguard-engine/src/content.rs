//! Page content acquisition: fetch raw HTML and strip it to visible text.

use reqwest::header::USER_AGENT;
use std::io::Cursor;
use tracing::{debug, warn};

/// Rendering width handed to the markup stripper. Only affects line
/// wrapping of the extracted text, not its content.
const TEXT_WIDTH: usize = 120;

/// Fetches page HTML with a browser-like User-Agent and reduces it to
/// visible text for tokenization.
pub struct ContentFetcher {
    http: reqwest::Client,
    user_agent: String,
}

impl ContentFetcher {
    pub fn new(http: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            user_agent: user_agent.into(),
        }
    }

    /// GET the page and return its visible text.
    ///
    /// Returns `None` on transport error or non-success status; the caller
    /// surfaces the failure and there is no retry. Markup-strip failures
    /// never fail the pipeline: the raw body is returned instead.
    pub async fn fetch_and_clean(&self, url: &str) -> Option<String> {
        let resp = match self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("page fetch failed for {}: {}", url, e);
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("page fetch for {} returned status {}", url, resp.status());
            return None;
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("failed to read page body for {}: {}", url, e);
                return None;
            }
        };

        let text = clean_html(&body);
        debug!("fetched {} ({} chars of visible text)", url, text.len());
        Some(text)
    }
}

/// Strip script/style/non-visible markup, returning visible text only.
/// Falls back to the unmodified input when the markup cannot be parsed.
pub fn clean_html(html: &str) -> String {
    html2text::from_read(Cursor::new(html.as_bytes()), TEXT_WIDTH)
        .unwrap_or_else(|_| html.to_string())
}
