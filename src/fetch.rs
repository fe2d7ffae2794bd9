//! Blocking HTTP retrieval for venue calendar pages.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;

/// Base URL of the reader-mode proxy used as the second retrieval path.
pub const READER_PROXY_BASE: &str = "https://r.jina.ai/";

const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,text/plain,*/*;q=0.8";
const USER_AGENT: &str = concat!("scrape-audit/", env!("CARGO_PKG_VERSION"));

/// Reader-proxy rendering of a page: the proxy takes the full target URL as
/// its path.
pub fn reader_proxy_url(calendar_url: &str) -> String {
    format!("{READER_PROXY_BASE}{calendar_url}")
}

/// Bodies and errors from the two retrieval paths for one calendar URL.
///
/// The bodies are named optional fields so parser selection stays explicit
/// about which body it consumes.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub jina_text: Option<String>,
    pub raw_text: Option<String>,
    pub jina_error: Option<String>,
    pub raw_error: Option<String>,
}

impl FetchResult {
    pub fn jina_body(&self) -> &str {
        self.jina_text.as_deref().unwrap_or("")
    }

    pub fn raw_body(&self) -> &str {
        self.raw_text.as_deref().unwrap_or("")
    }

    /// True when either retrieval path failed.
    pub fn any_error(&self) -> bool {
        self.jina_error.is_some() || self.raw_error.is_some()
    }
}

/// Sequential fetcher with a fixed per-request timeout and a rate-bounding
/// pause after every request.
pub struct Fetcher {
    client: Client,
    delay: Duration,
}

impl Fetcher {
    pub fn new(timeout_seconds: f64, delay_seconds: f64, insecure: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(timeout_seconds.max(0.0)))
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            client,
            delay: Duration::from_secs_f64(delay_seconds.max(0.0)),
        })
    }

    /// Fetch the reader-proxy rendering, then the raw page. Failures land in
    /// the error fields; they never abort the run.
    pub fn fetch_source(&self, calendar_url: &str) -> FetchResult {
        let (jina_text, jina_error) = self.fetch_text(&reader_proxy_url(calendar_url));
        self.pause();
        let (raw_text, raw_error) = self.fetch_text(calendar_url);
        self.pause();

        FetchResult {
            jina_text,
            raw_text,
            jina_error,
            raw_error,
        }
    }

    fn fetch_text(&self, url: &str) -> (Option<String>, Option<String>) {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER);
        match request.send() {
            Ok(response) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    return (None, Some(format!("HTTP {}", status.as_u16())));
                }
                match response.text() {
                    Ok(text) => (Some(text), None),
                    Err(err) => (None, Some(format!("Fetch error: {err}"))),
                }
            }
            Err(err) if err.is_timeout() => (None, Some("Request timed out".to_string())),
            Err(err) if err.is_connect() => (None, Some(format!("Connection error: {err}"))),
            Err(err) => (None, Some(format!("Fetch error: {err}"))),
        }
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_proxy_prefixes_the_full_target() {
        assert_eq!(
            reader_proxy_url("https://venue.org/events"),
            "https://r.jina.ai/https://venue.org/events"
        );
    }

    #[test]
    fn fetch_result_reports_any_error() {
        let ok = FetchResult::default();
        assert!(!ok.any_error());

        let failed = FetchResult {
            raw_error: Some("HTTP 503".to_string()),
            ..FetchResult::default()
        };
        assert!(failed.any_error());
    }

    #[test]
    fn bodies_default_to_empty() {
        let result = FetchResult {
            jina_text: Some("rendered".to_string()),
            ..FetchResult::default()
        };
        assert_eq!(result.jina_body(), "rendered");
        assert_eq!(result.raw_body(), "");
    }

    #[test]
    fn fetcher_builds_with_and_without_tls_verification() {
        assert!(Fetcher::new(20.0, 0.0, false).is_ok());
        assert!(Fetcher::new(20.0, 0.0, true).is_ok());
    }
}
