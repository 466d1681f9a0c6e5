//! Standup adapter -- summarize a day's GitHub activity as a status report.
//!
//! Tools resolve a human date expression to a calendar day, fetch the user's
//! activity for that day through an [`ActivitySource`], and render it as a
//! standup report or a detailed activity listing.

pub mod activity;
pub mod config;
pub mod dates;
pub mod events;
pub mod report;
pub mod source;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, AdapterType, HealthStatus, ToolDefinition, opt_str};

pub use activity::{ActivityCollection, SummaryStats, fetch, summarize};
pub use config::{Backend, StandupConfig};
pub use events::{ActivityEvent, EventType, FetchContext, ProcessedInfo};
pub use report::{ReportFormat, render, render_detailed};
pub use source::{ActivitySource, GhCliSource, RestSource};

/// Exposes activity reporting as tools.
pub struct StandupAdapter {
    id: String,
    config: StandupConfig,
    source: Arc<dyn ActivitySource>,
    /// Fixed "today" for date resolution; the local date when `None`.
    today: Option<NaiveDate>,
    connected: bool,
}

impl StandupAdapter {
    /// Create an adapter using the backend named in `config`.
    pub fn new(id: &str, config: StandupConfig) -> Self {
        let source = config.source();
        Self::with_source(id, config, source)
    }

    /// Create an adapter reading from an explicit source.
    pub fn with_source(id: &str, config: StandupConfig, source: Arc<dyn ActivitySource>) -> Self {
        Self {
            id: id.to_string(),
            config,
            source,
            today: None,
            connected: false,
        }
    }

    /// Pin the date that relative expressions resolve against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn resolve_date(&self, expression: &str) -> NaiveDate {
        match self.today {
            Some(today) => dates::resolve_at(expression, today),
            None => dates::resolve(expression),
        }
    }

    async fn collect(&self, params: &Value) -> Result<ActivityCollection> {
        let date = self.resolve_date(opt_str(params, "date").unwrap_or(""));
        let username = opt_str(params, "username");
        let repos = repos_param(params);
        debug!(date = %date, ?username, ?repos, "collecting activity");
        activity::fetch(self.source.as_ref(), &self.config, date, username, repos).await
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    async fn tool_get_standup_summary(&self, params: Value) -> Result<Value> {
        let format = ReportFormat::lenient(opt_str(&params, "format"));
        let collection = self.collect(&params).await?;
        Ok(Value::String(render(&collection, format)?))
    }

    async fn tool_get_github_activity(&self, params: Value) -> Result<Value> {
        if params.get("date").and_then(Value::as_str).is_none() {
            return Err(AdapterError::missing_param(
                "get_github_activity",
                "date",
                "string",
            ));
        }
        let collection = self.collect(&params).await?;
        Ok(Value::String(render_detailed(&collection)))
    }

    async fn tool_get_workday_date(&self, params: Value) -> Result<Value> {
        let expression = params
            .get("date_expression")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::missing_param("get_workday_date", "date_expression", "string")
            })?;
        let date = self.resolve_date(expression);
        Ok(Value::String(format!(
            "Parsed date: {}",
            dates::to_iso_midnight(date)
        )))
    }

    async fn tool_format_standup_report(&self, params: Value) -> Result<Value> {
        let activity = match params.get("github_activity") {
            Some(v @ Value::Object(_)) => v.clone(),
            _ => {
                return Err(AdapterError::missing_param(
                    "format_standup_report",
                    "github_activity",
                    "object",
                ));
            }
        };
        let format = ReportFormat::lenient(opt_str(&params, "format"));
        let collection = report::collection_from_value(activity)?;
        Ok(Value::String(render(&collection, format)?))
    }
}

/// `repos` may be a comma-separated string or an array of names.
fn repos_param(params: &Value) -> Option<Vec<String>> {
    let repos = match params.get("repos")? {
        Value::String(raw) => config::parse_repo_list(raw),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => return None,
    };
    (!repos.is_empty()).then_some(repos)
}

#[async_trait]
impl Adapter for StandupAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reporting
    }

    async fn connect(&mut self) -> Result<()> {
        info!(
            id = %self.id,
            backend = ?self.config.backend,
            org = ?self.config.org,
            repos = self.config.repos.len(),
            "standup adapter connected"
        );
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!(id = %self.id, "standup adapter disconnected");
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if !self.connected {
            return Ok(HealthStatus::Unhealthy);
        }
        match self.source.current_user().await {
            Ok(Some(_)) => Ok(HealthStatus::Healthy),
            Ok(None) => Ok(HealthStatus::Degraded),
            Err(e) => {
                warn!(error = %e, "standup health check failed");
                Ok(HealthStatus::Degraded)
            }
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        if !self.connected {
            return Err(AdapterError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("adapter `{}` is not connected", self.id),
            });
        }

        match name {
            "get_standup_summary" => self.tool_get_standup_summary(params).await,
            "get_github_activity" => self.tool_get_github_activity(params).await,
            "get_workday_date" => self.tool_get_workday_date(params).await,
            "format_standup_report" => self.tool_format_standup_report(params).await,
            _ => Err(AdapterError::ToolNotFound {
                adapter_id: self.id.clone(),
                tool_name: name.to_string(),
            }),
        }
    }
}

fn build_tool_definitions() -> Vec<ToolDefinition> {
    let username = json!({
        "type": "string",
        "description": "GitHub username to filter by (defaults to the authenticated user)"
    });
    let repos = json!({
        "type": "string",
        "description": "Comma-separated repositories (owner/name) to include"
    });

    vec![
        ToolDefinition {
            name: "get_standup_summary".into(),
            description: "Generate a standup summary of GitHub activity for a day".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "Date expression such as 'yesterday', 'last friday' or '2024-07-23' (defaults to the last workday)"
                    },
                    "username": username,
                    "repos": repos,
                    "format": {
                        "type": "string",
                        "enum": ["markdown", "text", "json"],
                        "description": "Output format (default: markdown)"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "get_github_activity".into(),
            description: "List detailed GitHub activity for a specific date".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "Date expression to report on"
                    },
                    "username": username,
                    "repos": repos
                },
                "required": ["date"]
            }),
        },
        ToolDefinition {
            name: "get_workday_date".into(),
            description: "Resolve a date expression such as 'last friday' to a calendar date".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "date_expression": {
                        "type": "string",
                        "description": "Expression to resolve ('yesterday', 'monday', '2024-07-23', ...)"
                    }
                },
                "required": ["date_expression"]
            }),
        },
        ToolDefinition {
            name: "format_standup_report".into(),
            description: "Render a previously fetched activity collection as a standup report".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "github_activity": {
                        "type": "object",
                        "description": "Activity collection or JSON standup report"
                    },
                    "format": {
                        "type": "string",
                        "enum": ["markdown", "text", "json"],
                        "description": "Output format (default: markdown)"
                    }
                },
                "required": ["github_activity"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned pages and records requested paths.
    #[derive(Default)]
    struct FakeSource {
        user: Option<String>,
        pages: HashMap<String, Value>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActivitySource for FakeSource {
        async fn get_page(&self, path: &str) -> Result<Value> {
            self.requested.lock().unwrap().push(path.to_string());
            if path == "/user" {
                return Ok(match &self.user {
                    Some(login) => json!({ "login": login }),
                    None => json!({}),
                });
            }
            Ok(self.pages.get(path).cloned().unwrap_or_else(|| json!([])))
        }
    }

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 23).unwrap()
    }

    async fn connected(source: FakeSource, config: StandupConfig) -> StandupAdapter {
        let mut adapter = StandupAdapter::with_source("standup", config, Arc::new(source))
            .with_today(tuesday());
        adapter.connect().await.unwrap();
        adapter
    }

    fn repo_config() -> StandupConfig {
        StandupConfig {
            repos: vec!["org/repo1".into()],
            ..StandupConfig::default()
        }
    }

    fn repo1_page() -> Value {
        json!([{
            "type": "PullRequestEvent",
            "created_at": "2024-07-22T15:00:00Z",
            "actor": {"login": "dev"},
            "repo": {"name": "org/repo1"},
            "payload": {"action": "opened", "pull_request": {"number": 3, "title": "Speed up"}}
        }])
    }

    #[test]
    fn tools_have_expected_names() {
        let names: Vec<String> = build_tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "get_standup_summary",
                "get_github_activity",
                "get_workday_date",
                "format_standup_report"
            ]
        );
    }

    #[test]
    fn repos_param_accepts_string_or_array() {
        assert_eq!(
            repos_param(&json!({"repos": "a/b, c/d"})),
            Some(vec!["a/b".to_string(), "c/d".to_string()])
        );
        assert_eq!(
            repos_param(&json!({"repos": ["a/b", ""]})),
            Some(vec!["a/b".to_string()])
        );
        assert_eq!(repos_param(&json!({"repos": ""})), None);
        assert_eq!(repos_param(&json!({})), None);
    }

    #[tokio::test]
    async fn workday_date_tool_formats_midnight() {
        let adapter = connected(FakeSource::default(), StandupConfig::default()).await;
        let out = adapter
            .execute_tool("get_workday_date", json!({"date_expression": "last friday"}))
            .await
            .unwrap();
        assert_eq!(out, json!("Parsed date: 2024-07-19T00:00:00"));

        let out = adapter
            .execute_tool("get_workday_date", json!({"date_expression": ""}))
            .await
            .unwrap();
        assert_eq!(out, json!("Parsed date: 2024-07-22T00:00:00"));
    }

    #[tokio::test]
    async fn workday_date_requires_expression() {
        let adapter = connected(FakeSource::default(), StandupConfig::default()).await;
        let err = adapter
            .execute_tool("get_workday_date", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("date_expression"));
    }

    #[tokio::test]
    async fn standup_summary_defaults_to_last_workday_markdown() {
        let mut source = FakeSource {
            user: Some("dev".into()),
            ..FakeSource::default()
        };
        source.pages.insert(
            "/repos/org/repo1/events?page=1&per_page=100".into(),
            repo1_page(),
        );
        let adapter = connected(source, repo_config()).await;
        let out = adapter
            .execute_tool("get_standup_summary", json!({}))
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.starts_with("# Standup Summary - July 22, 2024"));
        assert!(text.contains("- Opened **[PR #3](https://github.com/org/repo1/pull/3)**: Speed up"));
    }

    #[tokio::test]
    async fn standup_summary_honours_format() {
        let mut source = FakeSource {
            user: Some("dev".into()),
            ..FakeSource::default()
        };
        source.pages.insert(
            "/repos/org/repo1/events?page=1&per_page=100".into(),
            repo1_page(),
        );
        let adapter = connected(source, repo_config()).await;
        let out = adapter
            .execute_tool(
                "get_standup_summary",
                json!({"date": "2024-07-22", "format": "json"}),
            )
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(out.as_str().unwrap()).unwrap();
        assert_eq!(parsed["source"]["summary"]["pr_count"], 1);
    }

    #[tokio::test]
    async fn github_activity_requires_date() {
        let adapter = connected(FakeSource::default(), repo_config()).await;
        let err = adapter
            .execute_tool("get_github_activity", json!({"username": "dev"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn github_activity_without_events() {
        let adapter = connected(FakeSource::default(), repo_config()).await;
        let out = adapter
            .execute_tool(
                "get_github_activity",
                json!({"date": "2024-07-22", "username": "dev"}),
            )
            .await
            .unwrap();
        assert_eq!(out, json!("No GitHub activity found for 2024-07-22"));
    }

    #[tokio::test]
    async fn unresolved_identity_is_an_error() {
        let adapter = connected(FakeSource::default(), repo_config()).await;
        let err = adapter
            .execute_tool("get_standup_summary", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::IdentityUnresolved));
    }

    #[tokio::test]
    async fn format_tool_requires_object() {
        let adapter = connected(FakeSource::default(), StandupConfig::default()).await;
        let err = adapter
            .execute_tool("format_standup_report", json!({"github_activity": "nope"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("github_activity"));
    }

    #[tokio::test]
    async fn format_tool_renders_supplied_collection() {
        let adapter = connected(FakeSource::default(), StandupConfig::default()).await;
        let out = adapter
            .execute_tool(
                "format_standup_report",
                json!({
                    "github_activity": {"target_date": "2024-07-22", "events": []},
                    "format": "text"
                }),
            )
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.starts_with("Standup Summary - July 22, 2024"));
        assert!(text.contains("No significant activity to report."));
    }

    #[tokio::test]
    async fn rejects_when_not_connected_and_unknown_tools() {
        let adapter = StandupAdapter::with_source(
            "standup",
            StandupConfig::default(),
            Arc::new(FakeSource::default()),
        );
        assert!(adapter.execute_tool("get_workday_date", json!({})).await.is_err());
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Unhealthy);

        let adapter = connected(FakeSource::default(), StandupConfig::default()).await;
        let err = adapter.execute_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, AdapterError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn health_reflects_identity() {
        let adapter = connected(
            FakeSource {
                user: Some("dev".into()),
                ..FakeSource::default()
            },
            StandupConfig::default(),
        )
        .await;
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);

        let adapter = connected(FakeSource::default(), StandupConfig::default()).await;
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Degraded);
    }
}
