// Re-export modules for testing and external use
pub mod client {
    pub mod registry;
    pub mod tfe;

    pub use registry::RegistryError;
    pub use tfe::{TfeClient, TfeError};
}

pub mod mcp {
    pub mod context;
    pub mod handler;
    pub mod http;
    pub mod ratelimit;
    pub mod security;
    pub mod session;
    pub mod stdio;
    pub mod types;
}

pub mod tools {
    pub mod dynamic;
    pub mod registry;
    pub mod tfe;
}

pub mod shared {
    pub mod utils;
}

pub mod config;
pub mod resources;
pub mod version;

// Re-export commonly used types for easier testing and external use
pub use config::ServerConfig;
pub use mcp::handler::McpServer;
pub use mcp::http::{build_router, serve_http, HttpState};
pub use mcp::ratelimit::RateLimiter;
pub use mcp::session::{BackendContext, SessionManager};
pub use mcp::stdio::serve_stdio;
pub use tools::dynamic::DynamicToolRegistry;
