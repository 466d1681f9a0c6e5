//! Settings for the standup adapter.

use std::str::FromStr;
use std::sync::Arc;

use crate::error::AdapterError;
use crate::standup::source::{ActivitySource, DEFAULT_API_URL, GhCliSource, RestSource};

/// Which backend answers GitHub API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// `gh api` subprocess calls.
    #[default]
    Cli,
    /// Direct REST calls.
    Api,
}

impl FromStr for Backend {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cli" | "gh" => Ok(Self::Cli),
            "api" | "rest" | "http" => Ok(Self::Api),
            other => Err(AdapterError::ConfigError(format!(
                "unknown standup backend `{other}` (expected `cli` or `api`)"
            ))),
        }
    }
}

/// Where activity is read from and which repositories are considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandupConfig {
    /// Organization whose repositories are listed (`GITHUB_ORG`).
    pub org: Option<String>,
    /// Explicit repository list (`GITHUB_REPOS`, comma-separated).
    pub repos: Vec<String>,
    /// Bearer token for the REST backend (`GITHUB_TOKEN`).
    pub token: Option<String>,
    /// REST base URL (`GITHUB_API_URL`).
    pub api_url: String,
    /// `STANDUP_BACKEND`.
    pub backend: Backend,
    /// Fall back to the user's own repositories, then their public feed,
    /// when neither repos nor org are configured (`STANDUP_USER_FALLBACK`).
    pub user_fallback: bool,
}

impl Default for StandupConfig {
    fn default() -> Self {
        Self {
            org: None,
            repos: Vec::new(),
            token: None,
            api_url: DEFAULT_API_URL.to_owned(),
            backend: Backend::Cli,
            user_fallback: true,
        }
    }
}

impl StandupConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, AdapterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup using the environment variable
    /// names as keys.  Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AdapterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();
        let backend = match get("STANDUP_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };
        let user_fallback = match get("STANDUP_USER_FALLBACK") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AdapterError::ConfigError(format!(
                    "STANDUP_USER_FALLBACK must be true or false, got `{raw}`"
                ))
            })?,
            None => defaults.user_fallback,
        };

        let api_url = get("GITHUB_API_URL").unwrap_or(defaults.api_url);
        url::Url::parse(&api_url).map_err(|e| {
            AdapterError::ConfigError(format!("GITHUB_API_URL `{api_url}` is not a valid URL: {e}"))
        })?;

        Ok(Self {
            org: get("GITHUB_ORG"),
            repos: get("GITHUB_REPOS")
                .map(|raw| parse_repo_list(&raw))
                .unwrap_or_default(),
            token: get("GITHUB_TOKEN"),
            api_url,
            backend,
            user_fallback,
        })
    }

    /// Instantiate the configured backend.
    pub fn source(&self) -> Arc<dyn ActivitySource> {
        match self.backend {
            Backend::Cli => Arc::new(GhCliSource::new()),
            Backend::Api => Arc::new(RestSource::new(&self.api_url, self.token.clone())),
        }
    }
}

/// Split a comma-separated repository list, dropping blanks.
pub fn parse_repo_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
