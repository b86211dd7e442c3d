//! MCP protocol core: JSON-RPC dispatch shared by both transports.
//!
//! The `tools/call` pipeline is rate limiter, then credential gate (applied
//! at registration time for credentialed tools), then the handler, with the
//! handler future insulated so a panic surfaces as an internal error instead
//! of tearing the transport down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::mcp::ratelimit::RateLimiter;
use crate::mcp::session::{BackendContext, SessionManager};
use crate::mcp::types::{
    error_codes, InitializeParams, JsonRpcRequest, JsonRpcResponse, RequestId, PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::resources;
use crate::tools::dynamic::{DynamicToolRegistry, ToolContext, ToolError};
use crate::tools::{registry as registry_tools, tfe as tfe_tools};
use crate::version;

/// Everything both transports share: the tool catalog, the session set and
/// the rate limiter.
pub struct McpServer {
    pub sessions: Arc<SessionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tools: Arc<DynamicToolRegistry>,
    backend_defaults: BackendContext,
}

impl McpServer {
    pub fn new(config: &ServerConfig) -> Arc<Self> {
        let tools = Arc::new(DynamicToolRegistry::new(
            registry_tools::all(),
            tfe_tools::all(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let sessions = Arc::new(SessionManager::new(vec![
            tools.clone() as Arc<dyn crate::mcp::session::SessionObserver>,
            rate_limiter.clone() as Arc<dyn crate::mcp::session::SessionObserver>,
        ]));

        Arc::new(Self {
            sessions,
            rate_limiter,
            tools,
            backend_defaults: BackendContext::from_defaults(&config.backend),
        })
    }

    /// Backend fallbacks for transports that have no per-request context
    /// (stdio, and HTTP requests without override headers).
    pub fn backend_defaults(&self) -> BackendContext {
        self.backend_defaults.clone()
    }

    /// Registers a session and builds its upstream clients.
    pub fn open_session(&self, session_id: &str, context: BackendContext) {
        self.sessions.register(session_id, context);
    }

    /// Tears a session down; observers release the per-session state first.
    pub fn close_session(&self, session_id: &str) {
        self.sessions.unregister(session_id);
    }

    /// Dispatches one JSON-RPC message. Returns `None` for notifications.
    pub async fn handle_message(
        &self,
        session_id: &str,
        request: JsonRpcRequest,
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        self.sessions.touch(session_id);

        if request.is_notification() {
            // notifications/initialized, notifications/cancelled and the
            // like need no answer.
            return None;
        }
        let id = request.id.clone();

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => {
                self.handle_tools_call(session_id, id, request.params, cancel)
                    .await
            }
            "resources/list" => JsonRpcResponse::success(
                id,
                json!({"resources": resources::list_resources()}),
            ),
            "resources/templates/list" => JsonRpcResponse::success(
                id,
                json!({"resourceTemplates": resources::list_resource_templates()}),
            ),
            "resources/read" => self.handle_resources_read(session_id, id, request.params).await,
            method => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ),
        };

        Some(response)
    }

    fn handle_initialize(&self, id: Option<RequestId>, params: Value) -> JsonRpcResponse {
        let params: InitializeParams = serde_json::from_value(params).unwrap_or(InitializeParams {
            protocol_version: String::new(),
            capabilities: Value::Null,
            client_info: None,
        });
        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, "client initialized");
        }

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {"listChanged": true},
                    "resources": {"subscribe": false, "listChanged": false}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": version::VERSION
                },
                "instructions": "Tools for the public Terraform Registry and, when a TFE_TOKEN \
                     is configured, Terraform Cloud/Enterprise workspaces and runs."
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<RequestId>) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({"tools": self.tools.list()}))
    }

    async fn handle_tools_call(
        &self,
        session_id: &str,
        id: Option<RequestId>,
        params: Value,
        cancel: CancellationToken,
    ) -> JsonRpcResponse {
        #[derive(Deserialize)]
        struct CallToolParams {
            name: String,
            #[serde(default)]
            arguments: Value,
        }

        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("invalid tools/call params: {e}"),
                )
            }
        };

        let limiter_key = (!session_id.is_empty()).then_some(session_id);
        if let Err(e) = self.rate_limiter.check(limiter_key) {
            warn!(tool = %params.name, "{e}");
            return JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string());
        }

        let Some(tool) = self.tools.get(&params.name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("tool not found: {}", params.name),
            );
        };

        info!(tool = %params.name, "executing tool");
        let ctx = ToolContext {
            session_id: session_id.to_string(),
            sessions: self.sessions.clone(),
            cancel,
        };

        let arguments = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };

        let outcome = AssertUnwindSafe(tool.handler.call(ctx, arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => JsonRpcResponse::success(
                id,
                serde_json::to_value(result).unwrap_or_else(|_| json!({})),
            ),
            Ok(Err(ToolError::InvalidParams(message))) => {
                JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, message)
            }
            Ok(Err(ToolError::Internal(message))) => {
                error!(tool = %params.name, "{message}");
                JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, message)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = %params.name, %detail, "tool handler panicked");
                JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, "internal server error")
            }
        }
    }

    async fn handle_resources_read(
        &self,
        session_id: &str,
        id: Option<RequestId>,
        params: Value,
    ) -> JsonRpcResponse {
        #[derive(Deserialize)]
        struct ReadResourceParams {
            uri: String,
        }

        let params: ReadResourceParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("invalid resources/read params: {e}"),
                )
            }
        };

        let Some(client) = self.sessions.http_client(session_id) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INTERNAL_ERROR,
                "getting http client for public Terraform registry: no active session",
            );
        };

        match resources::read_resource(&client, &params.uri).await {
            Ok(contents) => JsonRpcResponse::success(id, json!({"contents": contents})),
            Err(e) => {
                error!(uri = %params.uri, "{e}");
                JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string())
            }
        }
    }
}

/// Parses one raw frame into a request, mapping malformed JSON to the
/// protocol-level parse error.
pub fn parse_frame(raw: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    serde_json::from_str::<JsonRpcRequest>(raw).map_err(|e| {
        JsonRpcResponse::error(
            None,
            error_codes::PARSE_ERROR,
            format!("parse error: {e}"),
        )
    })
}
