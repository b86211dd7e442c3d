//! Tool catalog with dynamic, credential-gated availability.
//!
//! Registry tools are published at startup. TFE tools are published lazily,
//! the first time any session arrives with a working backend client, and are
//! never withdrawn: MCP offers no removal primitive, so availability is
//! enforced per call by a decorator around every credentialed handler.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::tfe::TfeClient;
use crate::mcp::session::{SessionManager, SessionObserver};
use crate::mcp::types::{CallToolResult, ToolDescriptor};

/// Diagnostic returned when a credentialed tool is invoked by a session
/// without a backend client.
pub const TFE_UNAVAILABLE: &str = "This tool is not available. It requires a valid Terraform \
     Cloud/Enterprise token and address. Please ensure TFE_TOKEN and TFE_ADDRESS are properly set.";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),
}

impl From<String> for ToolError {
    fn from(message: String) -> Self {
        ToolError::InvalidParams(message)
    }
}

/// Per-call context handed to every tool handler.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub sessions: Arc<SessionManager>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// The calling session's general registry client.
    pub fn http_client(&self) -> Result<reqwest::Client, ToolError> {
        self.sessions.http_client(&self.session_id).ok_or_else(|| {
            ToolError::Internal(
                "failed to get http client for public Terraform registry: no active session"
                    .to_string(),
            )
        })
    }

    /// The calling session's backend client, if it has one.
    pub fn tfe_client(&self) -> Option<Arc<TfeClient>> {
        self.sessions.tfe_client(&self.session_id)
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError>;
}

/// A descriptor paired with its handler; unique by name in the registry.
#[derive(Clone)]
pub struct ServerTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

impl ServerTool {
    pub fn new(descriptor: ToolDescriptor, handler: impl ToolHandler + 'static) -> Self {
        Self {
            descriptor,
            handler: Arc::new(handler),
        }
    }
}

/// Decorator that re-checks backend availability on every invocation.
struct CredentialGate {
    tool_name: String,
    inner: Arc<dyn ToolHandler>,
    sessions_with_tfe: Arc<RwLock<HashSet<String>>>,
}

#[async_trait]
impl ToolHandler for CredentialGate {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        if ctx.session_id.is_empty() {
            warn!(tool = %self.tool_name, "TFE tool called without session context");
            return Ok(CallToolResult::error(TFE_UNAVAILABLE));
        }

        let known = self
            .sessions_with_tfe
            .read()
            .expect("session set lock poisoned")
            .contains(&ctx.session_id);

        if !known {
            // The set can lag behind the client map (a lazily re-created
            // client, or a hook that raced); the live map is authoritative.
            if ctx.tfe_client().is_none() {
                warn!(tool = %self.tool_name, "TFE tool called but session has no valid TFE client");
                return Ok(CallToolResult::error(TFE_UNAVAILABLE));
            }
            self.sessions_with_tfe
                .write()
                .expect("session set lock poisoned")
                .insert(ctx.session_id.clone());
        }

        self.inner.call(ctx, args).await
    }
}

/// Catalog of advertised tools plus the dynamic-registration state.
pub struct DynamicToolRegistry {
    tools: RwLock<Vec<ServerTool>>,
    pending_tfe_tools: Mutex<Vec<ServerTool>>,
    tfe_tools_registered: AtomicBool,
    sessions_with_tfe: Arc<RwLock<HashSet<String>>>,
}

impl DynamicToolRegistry {
    /// `always` tools are advertised immediately; `credentialed` tools wait
    /// for the first backend-capable session.
    pub fn new(always: Vec<ServerTool>, credentialed: Vec<ServerTool>) -> Self {
        let sessions_with_tfe = Arc::new(RwLock::new(HashSet::new()));

        let gated = credentialed
            .into_iter()
            .map(|tool| {
                let gate = CredentialGate {
                    tool_name: tool.descriptor.name.clone(),
                    inner: tool.handler,
                    sessions_with_tfe: sessions_with_tfe.clone(),
                };
                ServerTool {
                    descriptor: tool.descriptor,
                    handler: Arc::new(gate),
                }
            })
            .collect();

        Self {
            tools: RwLock::new(always),
            pending_tfe_tools: Mutex::new(gated),
            tfe_tools_registered: AtomicBool::new(false),
            sessions_with_tfe,
        }
    }

    /// Currently advertised descriptors, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .expect("tool catalog lock poisoned")
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    /// Looks up an advertised tool by name.
    pub fn get(&self, name: &str) -> Option<ServerTool> {
        self.tools
            .read()
            .expect("tool catalog lock poisoned")
            .iter()
            .find(|tool| tool.descriptor.name == name)
            .cloned()
    }

    pub fn tfe_tools_registered(&self) -> bool {
        self.tfe_tools_registered.load(Ordering::SeqCst)
    }

    pub fn session_has_tfe(&self, session_id: &str) -> bool {
        self.sessions_with_tfe
            .read()
            .expect("session set lock poisoned")
            .contains(session_id)
    }

    /// Publishes the credentialed tool set. The flag transitions at most
    /// once per process lifetime.
    fn register_tfe_tools(&self) {
        if self.tfe_tools_registered.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("registering TFE tools - first session with valid TFE client detected");
        let mut pending = self
            .pending_tfe_tools
            .lock()
            .expect("pending tool lock poisoned");
        self.tools
            .write()
            .expect("tool catalog lock poisoned")
            .append(&mut pending);
    }
}

impl SessionObserver for DynamicToolRegistry {
    fn on_session_start(&self, session_id: &str, has_backend: bool) {
        if !has_backend {
            return;
        }
        self.sessions_with_tfe
            .write()
            .expect("session set lock poisoned")
            .insert(session_id.to_string());
        self.register_tfe_tools();
    }

    fn on_session_end(&self, session_id: &str) {
        // Descriptors stay advertised; only this session loses access.
        self.sessions_with_tfe
            .write()
            .expect("session set lock poisoned")
            .remove(session_id);
    }
}
