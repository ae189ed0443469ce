//! Newline-delimited JSON-RPC transports: stdio and Unix socket
//!
//! Frames are one JSON document per line. Over stdio, logs must go to
//! stderr (the binary configures that); stdout carries only frames.

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;
use lattice_core::Engine;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

/// Serve over stdin/stdout. Returns Ok on clean EOF; an Err means a
/// fatal read failure (the caller exits nonzero).
pub async fn serve_stdio(engine: Arc<Engine>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    info!("serving mcp over stdio");
    serve_connection(engine, stdin, stdout).await
}

/// Serve over a Unix domain socket, one server session per connection.
pub async fn serve_unix_socket(engine: Arc<Engine>, path: &Path) -> anyhow::Result<()> {
    // A previous unclean shutdown leaves the socket file behind.
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "serving mcp over unix socket");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let engine = engine.clone();
        tokio::spawn(async move {
            let (read, write) = stream.into_split();
            if let Err(e) = serve_connection(engine, read, write).await {
                warn!("connection ended with error: {e}");
            }
        });
    }
}

async fn serve_connection(
    engine: Arc<Engine>,
    read: impl AsyncRead + Unpin,
    mut write: impl AsyncWrite + Unpin,
) -> anyhow::Result<()> {
    let mut server = McpServer::new(engine);
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("eof, closing session");
                return Ok(());
            }
            Err(e) => {
                error!("transport read error: {e}");
                return Err(e.into());
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => server.handle_request(request).await,
            Err(e) => {
                warn!("unparseable frame: {e}");
                Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
            }
        };

        if let Some(response) = response {
            let frame = serde_json::to_string(&response).unwrap_or_else(|e| {
                error!("response serialization failed: {e}");
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
                    .to_string()
            });
            write.write_all(frame.as_bytes()).await?;
            write.write_all(b"\n").await?;
            write.flush().await?;
        }
    }
}
