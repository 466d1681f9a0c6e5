//! Activity sources -- where raw GitHub JSON comes from.
//!
//! Two interchangeable backends sit behind [`ActivitySource`]: the `gh` CLI
//! (which handles authentication itself) and the REST API via `reqwest`.
//! Both take an API path such as `/repos/o/r/events?page=1&per_page=100` and
//! return one parsed JSON document.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};

/// Default GitHub API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Timeout applied to each external call.
const CALL_TIMEOUT_SECS: u64 = 30;

/// Label used in error messages for source calls.
const SOURCE_OP: &str = "github_api";

/// A backend that can answer GitHub API GETs.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch one JSON document for `path` (leading `/`, query string allowed).
    async fn get_page(&self, path: &str) -> Result<Value>;

    /// Login of the authenticated user, if there is one.
    async fn current_user(&self) -> Result<Option<String>> {
        let user = self.get_page("/user").await?;
        Ok(user
            .get("login")
            .and_then(Value::as_str)
            .filter(|login| !login.is_empty())
            .map(str::to_owned))
    }
}

// ---------------------------------------------------------------------------
// gh CLI
// ---------------------------------------------------------------------------

/// Runs `gh api <path>` as a subprocess.
#[derive(Debug, Clone)]
pub struct GhCliSource {
    program: String,
    timeout_secs: u64,
}

impl GhCliSource {
    pub fn new() -> Self {
        Self {
            program: "gh".to_owned(),
            timeout_secs: CALL_TIMEOUT_SECS,
        }
    }

    /// Use a different executable in place of `gh`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::new()
        }
    }
}

impl Default for GhCliSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivitySource for GhCliSource {
    async fn get_page(&self, path: &str) -> Result<Value> {
        debug!(program = %self.program, path, "gh api");

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("api").arg(path).kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| AdapterError::Timeout {
                seconds: self.timeout_secs,
                reason: format!("`{} api {path}` did not finish", self.program),
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AdapterError::ExecutionFailed {
                        tool_name: SOURCE_OP.into(),
                        reason: format!(
                            "{} is not installed or not in PATH",
                            self.program
                        ),
                    }
                } else {
                    AdapterError::IoError(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::ExecutionFailed {
                tool_name: SOURCE_OP.into(),
                reason: format!(
                    "`{} api {path}` exited with {}: {}",
                    self.program,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| AdapterError::ExecutionFailed {
            tool_name: SOURCE_OP.into(),
            reason: format!("failed to parse gh output as JSON: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// REST API
// ---------------------------------------------------------------------------

/// Talks to the GitHub REST API directly.
#[derive(Debug, Clone)]
pub struct RestSource {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RestSource {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("toolbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(CALL_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.filter(|t| !t.is_empty()),
            client,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl ActivitySource for RestSource {
    async fn get_page(&self, path: &str) -> Result<Value> {
        let url = self.api_url(path);
        debug!(url = %url, "GET");

        let response = self.get_request(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    seconds: CALL_TIMEOUT_SECS,
                    reason: format!("GitHub API request timed out: {e}"),
                }
            } else {
                AdapterError::ExecutionFailed {
                    tool_name: SOURCE_OP.into(),
                    reason: format!("GitHub API request failed: {e}"),
                }
            }
        })?;

        let status = response.status();

        let rate_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if let Some(remaining) = rate_remaining
            && remaining < 10
        {
            warn!(remaining, path, "GitHub API rate limit is low");
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                tool_name: SOURCE_OP.into(),
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            let error_body: Value = serde_json::from_str(&body_text)
                .unwrap_or_else(|_| json!({ "message": body_text }));
            return Err(AdapterError::ExecutionFailed {
                tool_name: SOURCE_OP.into(),
                reason: format!(
                    "GitHub API returned {}: {}",
                    status.as_u16(),
                    error_body
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or(&body_text)
                ),
            });
        }

        serde_json::from_str(&body_text).map_err(|e| AdapterError::ExecutionFailed {
            tool_name: SOURCE_OP.into(),
            reason: format!("failed to parse GitHub API response as JSON: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedUser(Value);

    #[async_trait]
    impl ActivitySource for FixedUser {
        async fn get_page(&self, path: &str) -> Result<Value> {
            assert_eq!(path, "/user");
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn current_user_reads_login() {
        let source = FixedUser(json!({"login": "octocat", "id": 1}));
        assert_eq!(source.current_user().await.unwrap().as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn current_user_is_none_without_login() {
        let source = FixedUser(json!({"message": "Requires authentication"}));
        assert_eq!(source.current_user().await.unwrap(), None);
    }

    #[test]
    fn rest_source_trims_base_url() {
        let source = RestSource::new("https://ghe.example.com/api/v3/", None);
        assert_eq!(
            source.api_url("/user"),
            "https://ghe.example.com/api/v3/user"
        );
    }

    #[test]
    fn rest_source_ignores_empty_token() {
        let source = RestSource::new(DEFAULT_API_URL, Some(String::new()));
        assert!(source.token.is_none());
    }

    #[tokio::test]
    async fn gh_source_reports_missing_binary() {
        let source = GhCliSource::with_program("definitely-not-a-real-gh-binary");
        let err = source.get_page("/user").await.unwrap_err();
        assert!(err.to_string().contains("not installed"), "{err}");
    }
}
