// src/notify/github.rs
//! GitHub issue channel: one issue per run listing the new entries.

use super::format::{issue_body, issue_title};
use super::{NotificationBatch, Notifier, NotifyOutcome};
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const ENV_GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const API_VERSION: &str = "2022-11-28";
pub const DEFAULT_LABELS: &[&str] = &["scholarship", "automated"];

const MAX_ATTEMPTS: u8 = 3;
const RATE_LIMIT_WAIT_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitHubError {
    #[error("invalid repository {0:?}, expected owner/repo")]
    InvalidRepository(String),
    #[error("GitHub authentication failed, check {}", ENV_GITHUB_TOKEN)]
    Unauthorized,
    #[error("GitHub permission denied, token may lack the issues scope")]
    Forbidden,
    #[error("repository {0} not found or not accessible")]
    NotFound(String),
    #[error("GitHub validation error: {0}")]
    Validation(String),
    #[error("GitHub API rate limit exceeded")]
    RateLimited,
    #[error("GitHub API error: HTTP {0}")]
    Http(u16),
    #[error("GitHub API request failed: {0}")]
    Transport(String),
}

/// Split `owner/repo`.
pub fn parse_repository(raw: &str) -> std::result::Result<(String, String), GitHubError> {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(GitHubError::InvalidRepository(raw.to_string())),
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreatedIssue {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct GitHubNotifier {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    labels: Vec<String>,
    dry_run: bool,
    rate_limit_wait: Duration,
}

impl GitHubNotifier {
    pub fn new(token: &str, repository: &str) -> Result<Self> {
        let (owner, repo) = parse_repository(repository)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim())).context("token is not a valid header value")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        let client = Client::builder()
            .user_agent(concat!("scholarship-watcher/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("build github client")?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            owner,
            repo,
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            dry_run: false,
            rate_limit_wait: RATE_LIMIT_WAIT_CAP,
        })
    }

    /// `None` when token or repository is missing. `$GITHUB_API_URL`
    /// overrides the API base (GitHub Enterprise).
    pub fn from_env() -> Result<Option<Self>> {
        let token = std::env::var(ENV_GITHUB_TOKEN).ok().filter(|s| !s.trim().is_empty());
        let repo = std::env::var(ENV_GITHUB_REPOSITORY).ok().filter(|s| !s.trim().is_empty());
        let (Some(token), Some(repo)) = (token, repo) else {
            return Ok(None);
        };
        let mut n = Self::new(&token, &repo)?;
        if let Ok(base) = std::env::var(ENV_GITHUB_API_URL) {
            if !base.trim().is_empty() {
                n = n.with_api_base(&base);
            }
        }
        Ok(Some(n))
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Upper bound on how long to sleep when rate limited.
    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Advisory: can we authenticate at all?
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/user", self.api_base);
        match self.client.get(&url).send().await {
            Ok(rsp) if rsp.status().is_success() => {
                debug!(target: "github", "connection ok");
                true
            }
            Ok(rsp) => {
                warn!(target: "github", status = rsp.status().as_u16(), "connection check failed");
                false
            }
            Err(e) => {
                warn!(target: "github", "connection check failed: {e}");
                false
            }
        }
    }

    pub async fn create_issue(&self, title: &str, body: &str) -> std::result::Result<CreatedIssue, GitHubError> {
        let url = format!("{}/repos/{}/{}/issues", self.api_base, self.owner, self.repo);
        let mut payload = serde_json::json!({ "title": title, "body": body });
        if !self.labels.is_empty() {
            payload["labels"] = serde_json::json!(self.labels);
        }

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let rsp = match self.client.post(&url).json(&payload).send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS => {
                    warn!(target: "github", attempt, "request timeout, retrying");
                    continue;
                }
                Err(e) => return Err(GitHubError::Transport(e.to_string())),
            };

            let status = rsp.status();
            if status == StatusCode::CREATED {
                return rsp
                    .json::<CreatedIssue>()
                    .await
                    .map_err(|e| GitHubError::Transport(format!("decode issue response: {e}")));
            }

            let wait = rate_limit_wait(&rsp);
            let msg = read_message(rsp).await;

            let limited = wait.is_some()
                || (status == StatusCode::FORBIDDEN && msg.message.to_lowercase().contains("rate limit"));
            if limited {
                if attempt < MAX_ATTEMPTS {
                    let sleep_for = wait.unwrap_or(self.rate_limit_wait).min(self.rate_limit_wait);
                    warn!(target: "github", attempt, ?sleep_for, "rate limited, waiting");
                    tokio::time::sleep(sleep_for).await;
                    continue;
                }
                return Err(GitHubError::RateLimited);
            }

            return Err(match status {
                StatusCode::UNAUTHORIZED => GitHubError::Unauthorized,
                StatusCode::FORBIDDEN => GitHubError::Forbidden,
                StatusCode::NOT_FOUND => GitHubError::NotFound(self.repository()),
                StatusCode::UNPROCESSABLE_ENTITY => {
                    let details: Vec<String> = msg
                        .errors
                        .iter()
                        .map(|e| {
                            e.get("message")
                                .and_then(|m| m.as_str())
                                .map(str::to_string)
                                .unwrap_or_else(|| e.to_string())
                        })
                        .collect();
                    let base = if msg.message.is_empty() {
                        "Validation failed".to_string()
                    } else {
                        msg.message
                    };
                    if details.is_empty() {
                        GitHubError::Validation(base)
                    } else {
                        GitHubError::Validation(format!("{base}. {}", details.join("; ")))
                    }
                }
                other => GitHubError::Http(other.as_u16()),
            });
        }
    }
}

/// `Some(wait)` when the response is a 403 with an exhausted rate limit.
fn rate_limit_wait(rsp: &Response) -> Option<Duration> {
    if rsp.status() != StatusCode::FORBIDDEN {
        return None;
    }
    let header = |name: &str| {
        rsp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    if header("x-ratelimit-remaining").as_deref() != Some("0") {
        return None;
    }
    let reset = header("x-ratelimit-reset").and_then(|s| s.parse::<i64>().ok());
    let secs = reset
        .map(|r| (r - Utc::now().timestamp()).max(0) as u64)
        .unwrap_or(RATE_LIMIT_WAIT_CAP.as_secs());
    Some(Duration::from_secs(secs))
}

async fn read_message(rsp: Response) -> ApiMessage {
    let text = rsp.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or(ApiMessage {
        message: String::new(),
        errors: Vec::new(),
    })
}

#[async_trait::async_trait]
impl Notifier for GitHubNotifier {
    async fn notify(&self, batch: &NotificationBatch) -> Result<NotifyOutcome> {
        if batch.is_empty() {
            debug!(target: "github", "nothing new, no issue");
            return Ok(NotifyOutcome::Skipped("no new entries".into()));
        }
        let now = Utc::now();
        let title = issue_title(batch, now);
        let body = issue_body(batch, now);

        if self.dry_run {
            info!(target: "github", repo = %self.repository(), %title, "[dry run] would create issue");
            debug!(target: "github", "[dry run] issue body:\n{body}");
            return Ok(NotifyOutcome::DryRun);
        }

        let issue = self
            .create_issue(&title, &body)
            .await
            .with_context(|| format!("create issue in {}", self.repository()))?;
        info!(target: "github", number = issue.number, url = %issue.html_url, "issue created");
        Ok(NotifyOutcome::Sent {
            reference: Some(issue.html_url),
        })
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_parsing() {
        assert_eq!(
            parse_repository("octo/watch").unwrap(),
            ("octo".to_string(), "watch".to_string())
        );
        assert!(parse_repository("octo").is_err());
        assert!(parse_repository("/watch").is_err());
        assert!(parse_repository("octo/").is_err());
        assert!(parse_repository("a/b/c").is_err());
    }

    #[test]
    fn error_messages_are_readable() {
        assert!(GitHubError::Unauthorized.to_string().contains("GITHUB_TOKEN"));
        assert_eq!(GitHubError::Http(500).to_string(), "GitHub API error: HTTP 500");
        assert_eq!(
            GitHubError::InvalidRepository("octo".into()).to_string(),
            "invalid repository \"octo\", expected owner/repo"
        );
        assert_eq!(
            GitHubError::NotFound("octo/watch".into()).to_string(),
            "repository octo/watch not found or not accessible"
        );
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let n = GitHubNotifier::new("t", "octo/watch")
            .unwrap()
            .with_api_base("http://127.0.0.1:9")
            .with_dry_run(true);
        let batch = NotificationBatch::Flat(vec![crate::entry::ScholarshipEntry::new("A", "https://x/a")]);
        assert_eq!(n.notify(&batch).await.unwrap(), NotifyOutcome::DryRun);

        let empty = NotificationBatch::Flat(vec![]);
        assert!(matches!(n.notify(&empty).await.unwrap(), NotifyOutcome::Skipped(_)));
    }
}
