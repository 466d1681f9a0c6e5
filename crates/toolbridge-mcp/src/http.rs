//! HTTP transport: `POST /mcp` plus a small health endpoint.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::{McpError, Result};
use crate::server::McpServer;

/// Build the router exposing `server`.
pub fn router(server: Arc<McpServer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/mcp", post(handle_mcp_request))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(server)
}

/// Accept a single JSON-RPC request or a batch array.  A body made only of
/// notifications is acknowledged with `202 Accepted` and no content.
pub async fn handle_mcp_request(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_text(&body).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Report each adapter's health.
pub async fn handle_health(State(server): State<Arc<McpServer>>) -> Json<Value> {
    let mut adapters = Vec::with_capacity(server.adapters().len());
    for adapter in server.adapters() {
        let status = match adapter.health_check().await {
            Ok(status) => status.to_string(),
            Err(e) => format!("error: {e}"),
        };
        adapters.push(json!({
            "id": adapter.id(),
            "type": adapter.adapter_type().to_string(),
            "status": status,
            "tools": adapter.tools().len(),
        }));
    }
    Json(json!({ "adapters": adapters }))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve_http(server: Arc<McpServer>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| McpError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
    serve_listener(server, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve_listener(server: Arc<McpServer>, listener: tokio::net::TcpListener) -> Result<()> {
    let local = listener.local_addr()?;
    info!(addr = %local, "serving MCP over HTTP at /mcp");
    axum::serve(listener, router(server)).await?;
    Ok(())
}
