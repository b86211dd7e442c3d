//! Standard-stream transport driver.
//!
//! Newline-delimited JSON-RPC frames on stdin/stdout, diagnostics on
//! stderr. The whole process is one implicit session whose backend context
//! comes from the environment; it is registered before the first frame and
//! torn down on EOF or SIGINT/SIGTERM.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::mcp::handler::{parse_frame, McpServer};
use crate::mcp::session::new_session_id;
use crate::mcp::types::JsonRpcResponse;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Frame sink half of a transport; stdout for the standard-stream driver.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, response: JsonRpcResponse) -> Result<(), TransportError>;
}

pub struct StdioTransport {
    stdout: Arc<Mutex<std::io::Stdout>>,
}

impl StdioTransport {
    /// Builds the transport and a channel of raw input lines fed by a
    /// background reader task. The channel closes on stdin EOF.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = tokio::io::BufReader::new(stdin);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if tx.send(trimmed.to_string()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "error reading from stdin");
                        break;
                    }
                }
            }
        });

        (
            Self {
                stdout: Arc::new(Mutex::new(std::io::stdout())),
            },
            rx,
        )
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, response: JsonRpcResponse) -> Result<(), TransportError> {
        let frame = serde_json::to_string(&response)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;

        let mut stdout = self
            .stdout
            .lock()
            .map_err(|_| TransportError::Io("failed to lock stdout".to_string()))?;
        writeln!(stdout, "{frame}").map_err(|e| TransportError::Io(e.to_string()))?;
        stdout.flush().map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Runs the server over stdin/stdout until EOF or a shutdown signal.
pub async fn serve_stdio(server: Arc<McpServer>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let session_id = new_session_id();
    server.open_session(&session_id, server.backend_defaults());
    eprintln!("Terraform MCP Server running on stdio");
    info!(%session_id, "stdio transport started");

    let (transport, mut frames) = StdioTransport::new();
    let mut initialized = false;

    loop {
        let raw = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutting down stdio server");
                break;
            }
            frame = frames.recv() => match frame {
                Some(raw) => raw,
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
        };

        let request = match parse_frame(&raw) {
            Ok(request) => request,
            Err(parse_error) => {
                transport.send(parse_error).await?;
                continue;
            }
        };

        // Requests before the handshake are refused; notifications are not.
        if !initialized && !request.is_notification() && request.method != "initialize" {
            transport
                .send(JsonRpcResponse::error(
                    request.id.clone(),
                    crate::mcp::types::error_codes::INVALID_REQUEST,
                    "server not initialized, send 'initialize' first",
                ))
                .await?;
            continue;
        }
        if request.method == "initialize" {
            initialized = true;
        }

        // A per-request token that dies with the transport loop.
        let cancel = shutdown.child_token();
        if let Some(response) = server.handle_message(&session_id, request, cancel).await {
            transport.send(response).await?;
        }
    }

    server.close_session(&session_id);
    Ok(())
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        error!(error = %e, "failed to install SIGTERM handler");
                        let _ = ctrl_c.await;
                        shutdown.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        shutdown.cancel();
    });
}
