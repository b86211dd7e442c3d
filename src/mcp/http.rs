//! Streamable HTTP transport driver.
//!
//! One endpoint serves the whole protocol: POST carries JSON-RPC messages
//! (answered directly as JSON, or as a one-shot SSE stream when the client
//! asks for `text/event-stream`), GET opens a standalone notification
//! stream, DELETE ends the session. Sessions are threaded through the
//! `Mcp-Session-Id` header in stateful mode; stateless mode runs every
//! request in an ephemeral session.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CorsConfig, ServerConfig};
use crate::mcp::context::terraform_context_middleware;
use crate::mcp::handler::McpServer;
use crate::mcp::security::origin_gate_middleware;
use crate::mcp::session::{new_session_id, BackendContext, DEFAULT_SESSION_TTL};
use crate::mcp::types::{error_codes, JsonRpcRequest, JsonRpcResponse, SERVER_NAME};

pub const MCP_SESSION_ID_HEADER: &str = "Mcp-Session-Id";

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on one POSTed request's handling time; no request is held
/// open past this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the HTTP handlers and middleware.
#[derive(Clone)]
pub struct HttpState {
    pub server: Arc<McpServer>,
    pub cors: CorsConfig,
    pub backend_defaults: BackendContext,
    pub stateless: bool,
    pub endpoint: String,
    pub shutdown: CancellationToken,
}

/// Builds the full router: the MCP endpoint (plus its trailing-slash alias)
/// behind the origin gate and context enricher, and `/health` outside them.
pub fn build_router(state: HttpState) -> Router {
    let mcp_routes = axum::routing::post(post_mcp)
        .get(get_mcp)
        .delete(delete_mcp)
        .options(|| async { StatusCode::OK });

    let mut mcp_router = Router::new().route(&state.endpoint, mcp_routes.clone());
    if state.endpoint != "/" {
        mcp_router = mcp_router.route(&format!("{}/", state.endpoint), mcp_routes);
    }

    // Innermost layer runs last: origin gate first, then context enricher.
    let mcp_router = mcp_router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            terraform_context_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            origin_gate_middleware,
        ));

    Router::new()
        .merge(mcp_router)
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<HttpState>) -> Response {
    Json(json!({
        "status": "ok",
        "service": SERVER_NAME,
        "transport": "streamable-http",
        "endpoint": state.endpoint,
    }))
    .into_response()
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn error_json(status: StatusCode, code: i32, message: &str) -> Response {
    (
        status,
        Json(JsonRpcResponse::error(None, code, message)),
    )
        .into_response()
}

/// Renders a response either as plain JSON or as a one-shot SSE stream,
/// tagging the session ID header either way.
fn render_response(
    response: JsonRpcResponse,
    session_id: Option<&str>,
    as_sse: bool,
) -> Response {
    let mut rendered = if as_sse {
        let event = Event::default()
            .event("message")
            .json_data(&response)
            .unwrap_or_else(|_| Event::default().event("message").data("{}"));
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(event) });
        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
            .into_response()
    } else {
        Json(response).into_response()
    };

    if let Some(session_id) = session_id {
        if let Ok(value) = HeaderValue::from_str(session_id) {
            rendered.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
    }
    rendered
}

async fn post_mcp(
    State(state): State<HttpState>,
    headers: HeaderMap,
    axum::Extension(context): axum::Extension<BackendContext>,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_json(
                StatusCode::BAD_REQUEST,
                error_codes::PARSE_ERROR,
                &format!("parse error: {e}"),
            )
        }
    };
    debug!(method = %request.method, "received MCP POST request");

    let as_sse = wants_sse(&headers);

    if state.stateless {
        // Every request runs in its own throwaway session; an incoming
        // Mcp-Session-Id header is ignored.
        let session_id = new_session_id();
        state.server.open_session(&session_id, context);
        let response = dispatch_bounded(&state, &session_id, request).await;
        state.server.close_session(&session_id);

        return match response {
            Ok(Some(response)) => render_response(response, None, as_sse),
            Ok(None) => StatusCode::ACCEPTED.into_response(),
            Err(timeout) => timeout,
        };
    }

    // Stateful: initialize opens the session, everything else joins one.
    let session_id = if request.method == "initialize" {
        let session_id = new_session_id();
        state.server.open_session(&session_id, context);
        info!(%session_id, "session initialized");
        session_id
    } else {
        let Some(session_id) = session_header(&headers) else {
            return error_json(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_REQUEST,
                "Mcp-Session-Id header required for non-initialize requests",
            );
        };
        if !state.server.sessions.exists(&session_id) {
            return error_json(
                StatusCode::NOT_FOUND,
                error_codes::INVALID_REQUEST,
                "session not found or expired",
            );
        }
        session_id
    };

    match dispatch_bounded(&state, &session_id, request).await {
        Ok(Some(response)) => render_response(response, Some(&session_id), as_sse),
        Ok(None) => {
            let mut response = StatusCode::ACCEPTED.into_response();
            if let Ok(value) = HeaderValue::from_str(&session_id) {
                response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
            }
            response
        }
        Err(timeout) => timeout,
    }
}

/// Dispatches with the request-level deadline. The cancellation token is
/// dropped on timeout so the handler's upstream work stops promptly.
async fn dispatch_bounded(
    state: &HttpState,
    session_id: &str,
    request: JsonRpcRequest,
) -> Result<Option<JsonRpcResponse>, Response> {
    let cancel = state.shutdown.child_token();
    let guard = cancel.clone();

    match tokio::time::timeout(
        REQUEST_TIMEOUT,
        state.server.handle_message(session_id, request, cancel),
    )
    .await
    {
        Ok(response) => Ok(response),
        Err(_) => {
            guard.cancel();
            warn!(%session_id, "request handling exceeded the server timeout");
            Err(error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "request timed out",
            ))
        }
    }
}

/// Standalone SSE stream for server-initiated messages. This server sends
/// none, so the stream only carries keep-alives until the client goes away
/// or the process shuts down.
async fn get_mcp(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if state.stateless {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(session_id) = session_header(&headers) else {
        return error_json(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_REQUEST,
            "Mcp-Session-Id header required to open a notification stream",
        );
    };
    if !state.server.sessions.exists(&session_id) {
        return error_json(
            StatusCode::NOT_FOUND,
            error_codes::INVALID_REQUEST,
            "session not found or expired",
        );
    }

    debug!(%session_id, "opened notification stream");
    let shutdown = state.shutdown.clone();
    let stream = futures::stream::unfold(shutdown, |token| async move {
        token.cancelled().await;
        None::<(Result<Event, Infallible>, CancellationToken)>
    });

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
    }
    response
}

async fn delete_mcp(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if state.stateless {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(session_id) = session_header(&headers) else {
        return error_json(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_REQUEST,
            "Mcp-Session-Id header required to terminate a session",
        );
    };
    if !state.server.sessions.exists(&session_id) {
        return error_json(
            StatusCode::NOT_FOUND,
            error_codes::INVALID_REQUEST,
            "session not found or expired",
        );
    }

    state.server.close_session(&session_id);
    info!(%session_id, "session terminated by client");
    StatusCode::OK.into_response()
}

/// Binds and runs the HTTP server until SIGINT/SIGTERM. In-flight requests
/// get a bounded grace period after the signal.
pub async fn serve_http(server: Arc<McpServer>, config: &ServerConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let state = HttpState {
        server: server.clone(),
        cors: config.cors.clone(),
        backend_defaults: server.backend_defaults(),
        stateless: config.stateless,
        endpoint: config.endpoint.clone(),
        shutdown: shutdown.clone(),
    };

    log_cors_configuration(&config.cors);
    info!(stateless = config.stateless, "running with session mode");

    if !config.stateless {
        spawn_idle_sweeper(server.clone(), shutdown.clone());
    }

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(
        "starting StreamableHTTP server on {}{}",
        config.bind_address(),
        config.endpoint
    );

    let graceful = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };
    let server_future = async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
    };
    let mut server_future = std::pin::pin!(server_future);

    tokio::select! {
        result = &mut server_future => result?,
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("graceful shutdown grace period elapsed, closing remaining connections");
        }
    }

    info!("StreamableHTTP server stopped");
    Ok(())
}

fn log_cors_configuration(cors: &CorsConfig) {
    info!(mode = cors.mode.as_str(), "CORS mode");
    match cors.mode {
        crate::config::CorsMode::Strict if cors.allowed_origins.is_empty() => {
            warn!("no allowed origins configured in strict mode, all cross-origin requests will be rejected");
        }
        crate::config::CorsMode::Development => {
            info!("development mode: localhost origins are automatically allowed");
        }
        crate::config::CorsMode::Disabled => {
            warn!("CORS validation is disabled, this is not recommended for production");
        }
        _ => {
            info!(origins = %cors.allowed_origins.join(", "), "allowed origins");
        }
    }
}

/// Defensive cleanup for sessions whose client vanished without DELETE.
fn spawn_idle_sweeper(server: Arc<McpServer>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for session_id in server.sessions.idle_sessions(DEFAULT_SESSION_TTL) {
                        info!(%session_id, "closing idle session");
                        server.close_session(&session_id);
                    }
                }
            }
        }
    });
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(_) => {
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

        info!("shutting down StreamableHTTP server");
        shutdown.cancel();
    });
}
