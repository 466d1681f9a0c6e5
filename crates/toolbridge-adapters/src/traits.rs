//! Core adapter trait and supporting types.
//!
//! Every tool adapter (mise, standup) implements the [`Adapter`] trait,
//! providing a uniform interface for the MCP server to discover and invoke
//! tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// The category of service an adapter provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterType {
    /// Developer tooling wrapped from a local CLI.
    DevTools,
    /// Reports built from a remote activity feed.
    Reporting,
}

impl std::fmt::Display for AdapterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DevTools => write!(f, "devtools"),
            Self::Reporting => write!(f, "reporting"),
        }
    }
}

/// The health status of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The adapter is fully operational.
    Healthy,
    /// The adapter is working but its backing program or API looks unusable.
    Degraded,
    /// The adapter is not functional.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A tool exposed by an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Machine-readable tool name (e.g. `mise_install`, `get_standup_summary`).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The universal adapter interface.
///
/// The MCP server discovers available tools via [`Adapter::tools`] and
/// executes them via [`Adapter::execute_tool`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Return the unique identifier for this adapter instance.
    fn id(&self) -> &str;

    /// Return the category of service this adapter provides.
    fn adapter_type(&self) -> AdapterType;

    /// Prepare the adapter for tool calls.
    async fn connect(&mut self) -> Result<()>;

    /// Release the adapter.
    async fn disconnect(&mut self) -> Result<()>;

    /// Check whether the adapter is healthy and operational.
    async fn health_check(&self) -> Result<HealthStatus>;

    /// Return the list of tools this adapter exposes.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Whether this adapter owns a tool called `name`.
    fn has_tool(&self, name: &str) -> bool {
        self.tools().iter().any(|t| t.name == name)
    }

    /// Execute a named tool with the given JSON parameters.
    ///
    /// Returns a JSON value representing the tool's output.  Text-producing
    /// tools return a JSON string.
    async fn execute_tool(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

/// Read an optional string argument, treating empty strings as absent.
pub(crate) fn opt_str<'a>(params: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read a boolean flag, defaulting to `false`.
pub(crate) fn flag(params: &serde_json::Value, field: &str) -> bool {
    params.get(field).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opt_str_ignores_empty_and_whitespace() {
        let params = json!({"a": "x", "b": "", "c": "   ", "d": 3});
        assert_eq!(opt_str(&params, "a"), Some("x"));
        assert_eq!(opt_str(&params, "b"), None);
        assert_eq!(opt_str(&params, "c"), None);
        assert_eq!(opt_str(&params, "d"), None);
        assert_eq!(opt_str(&params, "missing"), None);
    }

    #[test]
    fn flag_defaults_to_false() {
        let params = json!({"global": true, "all": "yes"});
        assert!(flag(&params, "global"));
        assert!(!flag(&params, "all"));
        assert!(!flag(&params, "current"));
    }

    #[test]
    fn display_impls() {
        assert_eq!(AdapterType::DevTools.to_string(), "devtools");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
    }
}
