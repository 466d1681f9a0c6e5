//! MCP (Model Context Protocol) server for toolbridge.
//!
//! [`McpServer`] answers JSON-RPC 2.0 messages by dispatching `tools/call`
//! to the registered adapters.  Two transports are provided:
//!
//! - [`stdio`]: newline-delimited JSON on stdin/stdout, one server per
//!   process as MCP clients expect.
//! - [`http`]: `POST /mcp` accepting single or batch requests.

pub mod error;
pub mod http;
pub mod server;
pub mod stdio;

pub use error::{McpError, Result};
pub use http::{router, serve_http, serve_listener};
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer};
pub use stdio::{serve_stdin, serve_stdio};
