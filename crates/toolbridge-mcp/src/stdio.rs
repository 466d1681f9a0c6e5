//! Newline-delimited JSON-RPC over a byte stream.
//!
//! Each line read is one JSON-RPC message (or batch); each reply is written
//! as one line and flushed immediately.  The loop ends cleanly at EOF.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::error::Result;
use crate::server::McpServer;

/// Serve `server` over the given reader and writer until EOF.
pub async fn serve_stdio<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            info!("stdin closed, shutting down");
            return Ok(());
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        debug!(bytes = message.len(), "message received");

        if let Some(reply) = server.handle_text(message).await {
            let mut out = serde_json::to_vec(&reply)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
    }
}

/// Serve `server` on the process's stdin and stdout.
pub async fn serve_stdin(server: &McpServer) -> Result<()> {
    info!("serving MCP over stdio");
    serve_stdio(server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
