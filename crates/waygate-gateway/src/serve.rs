//! The newline-delimited JSON-RPC serving loop.
//!
//! One JSON document per line, both directions. Requests are handled
//! by the facade; notifications pushed by the gateway (tools changed,
//! relayed backend notifications) share the same write half.

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use waygate_mcp::{JsonRpcNotification, JsonRpcResponse, RpcError, error_codes};

use crate::gateway::Gateway;

/// Serve one client over a byte stream pair until EOF.
///
/// # Errors
///
/// Returns the underlying I/O error when the stream fails.
pub async fn serve<R, W>(gateway: Arc<Gateway>, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    // Outbound notifications flow through a channel so the gateway can
    // fire them from any task.
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel::<JsonRpcNotification>();
    gateway.set_notification_sender(move |notification| {
        let _ = notify_tx.send(notification);
    });
    let notify_writer = Arc::clone(&writer);
    let notify_task = tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            if let Ok(mut line) = serde_json::to_string(&notification) {
                line.push('\n');
                let mut writer = notify_writer.lock().await;
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                let _ = writer.flush().await;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            debug!(line = %line, "discarding non-JSON input line");
            continue;
        };

        let id = value.get("id").and_then(Value::as_i64);
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let params = value.get("params").cloned().unwrap_or(Value::Null);

        match (id, method) {
            (Some(id), Some(method)) => {
                let response = match gateway.handle_request(&method, params).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(e) => {
                        debug!(method = %method, error = %e, "request failed");
                        JsonRpcResponse::failure(id, e.to_rpc_error())
                    },
                };
                write_response(&writer, &response).await?;
            },
            (None, Some(method)) => {
                // Client notifications need no response.
                debug!(method = %method, "client notification");
            },
            (Some(id), None) => {
                let response = JsonRpcResponse::failure(
                    id,
                    RpcError::new(error_codes::INVALID_REQUEST, "request has no method"),
                );
                write_response(&writer, &response).await?;
            },
            (None, None) => {
                warn!("discarding message with neither id nor method");
            },
        }
    }

    notify_task.abort();
    Ok(())
}

async fn write_response<W>(
    writer: &Arc<tokio::sync::Mutex<W>>,
    response: &JsonRpcResponse,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    line.push('\n');
    let mut writer = writer.lock().await;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
