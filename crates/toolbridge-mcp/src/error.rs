//! MCP server error types.

/// Errors raised by the MCP transports.
///
/// Protocol-level problems (bad JSON, unknown methods, failing tools) are
/// answered in-band as JSON-RPC responses and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Reading from or writing to the transport failed.
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    /// A response could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the MCP crate.
pub type Result<T> = std::result::Result<T, McpError>;
