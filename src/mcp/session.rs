//! Client session lifecycle and per-session upstream clients.
//!
//! Every session exclusively owns up to two upstream clients, held in two
//! process-wide maps keyed by session ID: a general registry client (always
//! built) and a TFE client (only when the session's context carries a
//! token). Map entries are unlinked before the session record is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::registry::build_http_client;
use crate::client::tfe::TfeClient;
use crate::config::BackendDefaults;

/// Sessions idle longer than this are swept in stateful HTTP mode.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Backend configuration bound to a request or session, resolved by the
/// context enricher with header, query parameter, environment precedence.
#[derive(Clone, Default)]
pub struct BackendContext {
    pub address: String,
    pub token: String,
    pub skip_tls_verify: bool,
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendContext")
            .field("address", &self.address)
            .field("token", &if self.token.is_empty() { "<empty>" } else { "<redacted>" })
            .field("skip_tls_verify", &self.skip_tls_verify)
            .finish()
    }
}

impl BackendContext {
    pub fn from_defaults(defaults: &BackendDefaults) -> Self {
        Self {
            address: defaults.address.clone(),
            token: defaults.token.clone(),
            skip_tls_verify: defaults.skip_tls_verify,
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Generates an unguessable session identifier.
pub fn new_session_id() -> String {
    format!("mcp-{}", Uuid::new_v4())
}

/// Receives session lifecycle events. The session layer only knows this
/// interface; the dynamic tool registry and the rate limiter implement it.
pub trait SessionObserver: Send + Sync {
    fn on_session_start(&self, session_id: &str, has_backend: bool);
    fn on_session_end(&self, session_id: &str);
}

/// Bookkeeping for one live session.
#[derive(Debug)]
pub struct Session {
    pub created_at: Instant,
    pub last_activity: Instant,
    pub context: BackendContext,
}

impl Session {
    fn new(context: BackendContext) -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_activity: now,
            context,
        }
    }

    fn is_idle(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }
}

/// Owns the set of live sessions and their upstream clients.
pub struct SessionManager {
    sessions: DashMap<String, Session>,
    http_clients: DashMap<String, reqwest::Client>,
    tfe_clients: DashMap<String, Arc<TfeClient>>,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl SessionManager {
    pub fn new(observers: Vec<Arc<dyn SessionObserver>>) -> Self {
        Self {
            sessions: DashMap::new(),
            http_clients: DashMap::new(),
            tfe_clients: DashMap::new(),
            observers,
        }
    }

    /// Registers a session: builds its general client, builds a TFE client
    /// when the context carries a token, then notifies observers. A TFE
    /// build failure is not fatal; the session continues general-only.
    pub fn register(&self, session_id: &str, context: BackendContext) {
        match build_http_client(context.skip_tls_verify) {
            Ok(client) => {
                self.http_clients.insert(session_id.to_string(), client);
                info!(session_id, "created HTTP client");
            }
            Err(e) => error!(session_id, error = %e, "failed to create HTTP client"),
        }

        let mut has_backend = false;
        if context.has_token() {
            match TfeClient::new(&context.address, &context.token, context.skip_tls_verify) {
                Ok(client) => {
                    self.tfe_clients
                        .insert(session_id.to_string(), Arc::new(client));
                    has_backend = true;
                    info!(session_id, "created TFE client");
                }
                Err(e) => {
                    // Never include the token in this message; the address
                    // alone is enough to diagnose.
                    warn!(session_id, error = %e, "failed to create TFE client, session continues without backend access");
                }
            }
        } else {
            debug!(session_id, "no Terraform token provided, TFE client will not be available");
        }

        self.sessions
            .insert(session_id.to_string(), Session::new(context));

        for observer in &self.observers {
            observer.on_session_start(session_id, has_backend);
        }
    }

    /// Tears a session down: observers are notified first, then the client
    /// map entries are unlinked, then the session record itself.
    pub fn unregister(&self, session_id: &str) {
        for observer in &self.observers {
            observer.on_session_end(session_id);
        }

        self.tfe_clients.remove(session_id);
        self.http_clients.remove(session_id);
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id, "cleaned up clients for session");
        }
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.last_activity = Instant::now();
        }
    }

    /// The session's general registry client. Re-created on demand if the
    /// entry is missing while the session is still live; the double-checked
    /// insert keeps a race to exactly one stored client.
    pub fn http_client(&self, session_id: &str) -> Option<reqwest::Client> {
        if let Some(client) = self.http_clients.get(session_id) {
            return Some(client.value().clone());
        }

        let session = self.sessions.get(session_id)?;
        warn!(session_id, "HTTP client not found, creating a new one");
        let fresh = build_http_client(session.context.skip_tls_verify).ok()?;
        drop(session);

        let entry = self
            .http_clients
            .entry(session_id.to_string())
            .or_insert(fresh);
        Some(entry.value().clone())
    }

    /// The session's TFE client, if it has one. Absence is a state, not an
    /// error.
    pub fn tfe_client(&self, session_id: &str) -> Option<Arc<TfeClient>> {
        self.tfe_clients
            .get(session_id)
            .map(|client| client.value().clone())
    }

    pub fn has_tfe_client(&self, session_id: &str) -> bool {
        self.tfe_clients.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Collects sessions idle past `ttl`; the transport decides when to run
    /// this and calls `unregister` for each.
    pub fn idle_sessions(&self, ttl: Duration) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_idle(ttl))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
