//! Adapter error types.
//!
//! All adapter subsystems surface errors through [`AdapterError`].  Each
//! variant carries enough context for callers to decide how to handle the
//! failure without inspecting opaque strings.

/// Unified error type for toolbridge adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The requested tool does not exist on this adapter.
    #[error("tool not found: `{tool_name}` on adapter `{adapter_id}`")]
    ToolNotFound {
        adapter_id: String,
        tool_name: String,
    },

    /// The parameters supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// A tool invocation failed.
    #[error("execution failed for tool `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An external call exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// No repository source or other required setting could be resolved.
    #[error("{0}")]
    ConfigError(String),

    /// The acting user could not be determined from arguments or the
    /// authenticated session.
    #[error("could not determine current GitHub user; please provide a username explicitly")]
    IdentityUnresolved,
}

impl AdapterError {
    /// Shorthand for a missing or mistyped required argument.
    pub fn missing_param(tool_name: &str, field: &str, kind: &str) -> Self {
        Self::InvalidParams {
            tool_name: tool_name.to_string(),
            reason: format!("missing required {kind} field `{field}`"),
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
