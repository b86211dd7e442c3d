//! Origin validation for the HTTP transport.
//!
//! Runs before any MCP work. Browser clients send an `Origin` header; the
//! gate matches it against the configured policy and answers CORS preflight
//! without ever reaching a handler. Requests without an `Origin` header are
//! non-browser clients and pass through untouched.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::config::{CorsConfig, CorsMode};
use crate::mcp::http::HttpState;

const LOCALHOST_PREFIXES: &[&str] = &[
    "http://localhost:",
    "https://localhost:",
    "http://127.0.0.1:",
    "https://127.0.0.1:",
    "http://[::1]:",
    "https://[::1]:",
];

/// Whether `origin` is admitted under the given policy.
pub fn is_origin_allowed(origin: &str, config: &CorsConfig) -> bool {
    if config.mode == CorsMode::Disabled {
        return true;
    }

    if config
        .allowed_origins
        .iter()
        .any(|allowed| allowed == origin)
    {
        return true;
    }

    if config.mode == CorsMode::Development {
        return LOCALHOST_PREFIXES
            .iter()
            .any(|prefix| origin.starts_with(prefix));
    }

    false
}

/// axum middleware enforcing the origin policy on the MCP endpoint.
pub async fn origin_gate_middleware(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut cors_headers = None;
    if let Some(origin) = origin {
        if !is_origin_allowed(&origin, &state.cors) {
            warn!(%origin, mode = state.cors.mode.as_str(), "rejected request from unauthorized origin");
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
        debug!(%origin, "allowed request from origin");
        cors_headers = Some(origin);
    }

    // Preflight never reaches the handlers.
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        if let Some(origin) = &cors_headers {
            apply_cors_headers(&mut response, origin);
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Some(origin) = &cors_headers {
        apply_cors_headers(&mut response, origin);
    }
    response
}

fn apply_cors_headers(response: &mut Response, origin: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Mcp-Session-Id"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("3600"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: CorsMode, origins: &[&str]) -> CorsConfig {
        CorsConfig {
            mode,
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn strict_mode_requires_exact_match() {
        let cfg = config(CorsMode::Strict, &["https://example.com"]);
        assert!(is_origin_allowed("https://example.com", &cfg));
        assert!(!is_origin_allowed("https://evil.com", &cfg));
        assert!(!is_origin_allowed("http://example.com", &cfg));
        assert!(!is_origin_allowed("https://example.com:8443", &cfg));
    }

    #[test]
    fn strict_mode_with_empty_list_rejects_everything() {
        let cfg = config(CorsMode::Strict, &[]);
        assert!(!is_origin_allowed("https://example.com", &cfg));
        assert!(!is_origin_allowed("http://localhost:3000", &cfg));
    }

    #[test]
    fn development_mode_admits_localhost_variants() {
        let cfg = config(CorsMode::Development, &[]);
        assert!(is_origin_allowed("http://localhost:3000", &cfg));
        assert!(is_origin_allowed("https://localhost:8443", &cfg));
        assert!(is_origin_allowed("http://127.0.0.1:8080", &cfg));
        assert!(is_origin_allowed("https://[::1]:3000", &cfg));
        assert!(!is_origin_allowed("https://evil.com", &cfg));
        // No port means no localhost prefix match.
        assert!(!is_origin_allowed("http://localhost", &cfg));
    }

    #[test]
    fn development_mode_still_honors_allowlist() {
        let cfg = config(CorsMode::Development, &["https://app.example.com"]);
        assert!(is_origin_allowed("https://app.example.com", &cfg));
        assert!(is_origin_allowed("http://localhost:3000", &cfg));
    }

    #[test]
    fn disabled_mode_admits_everything() {
        let cfg = config(CorsMode::Disabled, &[]);
        assert!(is_origin_allowed("https://evil.com", &cfg));
        assert!(is_origin_allowed("anything", &cfg));
    }

    #[test]
    fn decision_depends_only_on_origin_and_config() {
        let cfg = config(CorsMode::Strict, &["https://example.com"]);
        for _ in 0..3 {
            assert!(is_origin_allowed("https://example.com", &cfg));
            assert!(!is_origin_allowed("https://other.com", &cfg));
        }
    }
}
