// src/fetch.rs
//! Page fetching: one `FetchResult` per configured URL, sequential, with
//! retries on transient statuses and a politeness delay between requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u8 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Listing pages checked when `SCHOLARSHIP_URLS` is not set.
pub const DEFAULT_SCHOLARSHIP_URLS: &[&str] = &[
    "https://www.scholarshipportal.com/scholarships/norway",
    "https://www.studyinnorway.no/scholarships",
    "https://www.scholars4dev.com/tag/norway-scholarships/",
    "https://www.scholarshipportal.com/scholarships/sweden",
    "https://studyinsweden.se/scholarships/",
    "https://www.scholarshipportal.com/scholarships/denmark",
    "https://www.scholarshipportal.com/scholarships/finland",
    "https://www.studyinfinland.fi/scholarships",
    "https://www.scholarshipportal.com/scholarships/germany",
    "https://www.daad.de/en/study-and-research-in-germany/scholarships/",
    "https://www.scholarshipportal.com/scholarships/netherlands",
    "https://www.studyinholland.nl/finances/scholarships",
    "https://www.scholarshipportal.com/scholarships/france",
    "https://www.campusfrance.org/en/scholarships-masters",
    "https://www.scholarshipportal.com/scholarships/austria",
    "https://www.scholarshipportal.com/scholarships/switzerland",
    "https://www.scholarshipportal.com/scholarships/estonia",
    "https://www.studyinestonia.ee/scholarships",
];

/// Outcome of fetching one page. Only `success` and `html_content` matter to
/// extraction; the rest is diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub source_url: String,
    pub html_content: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
}

impl FetchResult {
    pub fn ok(source_url: impl Into<String>, html: String) -> Self {
        Self {
            source_url: source_url.into(),
            html_content: Some(html),
            success: true,
            error_message: None,
            status_code: Some(200),
        }
    }

    pub fn failed(source_url: impl Into<String>, msg: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            source_url: source_url.into(),
            html_content: None,
            success: false,
            error_message: Some(msg.into()),
            status_code: status,
        }
    }
}

/// Only absolute http(s) URLs with a host are fetched.
pub fn is_valid_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult;
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(headers)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Base delay; attempt `n` waits `backoff * 2^(n-1)`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay_for(&self, attempt: u8) -> Duration {
        self.backoff * (1u32 << (attempt.saturating_sub(1)).min(16))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        if !is_valid_url(url) {
            warn!(target: "fetch", url, "invalid url, skipping");
            return FetchResult::failed(url, format!("invalid URL: {url}"), None);
        }

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .get(url)
                .timeout(self.timeout)
                .send()
                .await;

            let retryable_failure = match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return match rsp.text().await {
                            Ok(body) => {
                                info!(target: "fetch", url, bytes = body.len(), "fetched");
                                FetchResult {
                                    status_code: Some(status.as_u16()),
                                    ..FetchResult::ok(url, body)
                                }
                            }
                            Err(e) => {
                                warn!(target: "fetch", url, "reading body failed: {e}");
                                FetchResult::failed(url, format!("read body: {e}"), Some(status.as_u16()))
                            }
                        };
                    }
                    if !RETRY_STATUSES.contains(&status.as_u16()) {
                        warn!(target: "fetch", url, status = status.as_u16(), "non-retryable http status");
                        return FetchResult::failed(url, http_message(status), Some(status.as_u16()));
                    }
                    (http_message(status), Some(status.as_u16()))
                }
                Err(e) => {
                    let msg = if e.is_timeout() {
                        format!("request timed out after {}s", self.timeout.as_secs())
                    } else {
                        format!("request failed: {e}")
                    };
                    (msg, None)
                }
            };

            let (msg, status) = retryable_failure;
            if attempt > self.max_retries {
                warn!(target: "fetch", url, attempts = attempt, "giving up: {msg}");
                return FetchResult::failed(url, msg, status);
            }
            let wait = self.delay_for(attempt);
            debug!(target: "fetch", url, attempt, ?wait, "retrying: {msg}");
            tokio::time::sleep(wait).await;
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn http_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {}: {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

/// Fetch every URL in order, sleeping `delay` between requests (not after
/// the last one). Always returns one result per input URL.
pub async fn fetch_all(fetcher: &dyn PageFetcher, urls: &[String], delay: Duration) -> Vec<FetchResult> {
    let mut out = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        debug!(target: "fetch", fetcher = fetcher.name(), n = i + 1, total = urls.len(), url = %url, "fetching");
        out.push(fetcher.fetch(url).await);
        if i + 1 < urls.len() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    let ok = out.iter().filter(|r| r.success).count();
    info!(target: "fetch", ok, failed = out.len() - ok, "fetch complete");
    out
}

/// Parse a comma-separated URL list, trimming blanks.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn default_urls() -> Vec<String> {
    DEFAULT_SCHOLARSHIP_URLS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://example.org/a"));
        assert!(is_valid_url("http://example.org"));
        assert!(!is_valid_url("ftp://example.org"));
        assert!(!is_valid_url("example.org/a"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("https://"));
    }

    #[test]
    fn url_list_parsing_trims_and_skips_blanks() {
        assert_eq!(
            parse_url_list(" https://a.example , ,https://b.example,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_url_list("").is_empty());
    }

    #[test]
    fn defaults_are_all_valid() {
        assert!(default_urls().iter().all(|u| is_valid_url(u)));
    }

    #[test]
    fn backoff_doubles() {
        let f = HttpFetcher::new().unwrap().with_backoff(Duration::from_millis(10));
        assert_eq!(f.delay_for(1), Duration::from_millis(10));
        assert_eq!(f.delay_for(2), Duration::from_millis(20));
        assert_eq!(f.delay_for(3), Duration::from_millis(40));
    }

    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for Recording {
        async fn fetch(&self, url: &str) -> FetchResult {
            self.seen.lock().unwrap().push(url.to_string());
            if url.contains("bad") {
                FetchResult::failed(url, "boom", Some(500))
            } else {
                FetchResult::ok(url, "<html></html>".into())
            }
        }
        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn fetch_all_preserves_order_and_count() {
        let f = Recording { seen: Mutex::new(Vec::new()) };
        let urls = vec![
            "https://a.example".to_string(),
            "https://bad.example".to_string(),
            "https://c.example".to_string(),
        ];
        let out = fetch_all(&f, &urls, Duration::ZERO).await;
        assert_eq!(out.len(), 3);
        assert!(out[0].success && !out[1].success && out[2].success);
        assert_eq!(*f.seen.lock().unwrap(), urls);
    }

    #[tokio::test]
    async fn invalid_url_fails_without_request() {
        let f = HttpFetcher::new().unwrap();
        let r = f.fetch("not a url").await;
        assert!(!r.success);
        assert!(r.error_message.unwrap().contains("invalid URL"));
    }
}
