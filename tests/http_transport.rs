//! HTTP transport behavior driven through the real router: origin gate,
//! context enricher, session threading and the health endpoint.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use terraform_mcp_server::config::{
    BackendDefaults, CorsConfig, CorsMode, RateLimitConfig, ServerConfig,
};
use terraform_mcp_server::mcp::http::{build_router, HttpState, MCP_SESSION_ID_HEADER};
use terraform_mcp_server::McpServer;
use tokio_util::sync::CancellationToken;

fn test_config(cors_mode: CorsMode, origins: &[&str], stateless: bool) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        endpoint: "/mcp".to_string(),
        stateless,
        cors: CorsConfig {
            mode: cors_mode,
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
        },
        rate_limit: RateLimitConfig::default(),
        backend: BackendDefaults {
            address: "https://app.terraform.io".to_string(),
            token: String::new(),
            skip_tls_verify: false,
        },
    }
}

fn router_for(config: &ServerConfig) -> axum::Router {
    let server = McpServer::new(config);
    build_router(HttpState {
        server: server.clone(),
        cors: config.cors.clone(),
        backend_defaults: server.backend_defaults(),
        stateless: config.stateless,
        endpoint: config.endpoint.clone(),
        shutdown: CancellationToken::new(),
    })
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn initialize_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "e2e", "version": "0.0.1"}
        }
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service_identity() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "terraform-mcp-server");
    assert_eq!(body["transport"], "streamable-http");
    assert_eq!(body["endpoint"], "/mcp");
}

#[tokio::test]
async fn preflight_from_unlisted_origin_is_forbidden() {
    let config = test_config(CorsMode::Strict, &["https://example.com"], false);
    let router = router_for(&config);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/mcp")
                .header(header::ORIGIN, "https://evil.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn preflight_from_allowed_origin_echoes_cors_headers() {
    let config = test_config(CorsMode::Strict, &["https://example.com"], false);
    let router = router_for(&config);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/mcp")
                .header(header::ORIGIN, "https://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://example.com"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        "GET, POST, OPTIONS"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
        "Content-Type, Mcp-Session-Id"
    );
    assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "3600");
}

#[tokio::test]
async fn development_mode_admits_localhost_origins() {
    let config = test_config(CorsMode::Development, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/mcp")
                .header(header::ORIGIN, "http://localhost:6274")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_without_origin_pass_the_gate() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(json_request("/mcp", initialize_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_in_query_is_rejected_before_any_handler() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(json_request("/mcp?tfe_token=secret", initialize_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&bytes);
    assert!(body.contains("query parameters"));
    // The secret never comes back.
    assert!(!body.contains("secret"));
}

#[tokio::test]
async fn initialize_opens_a_session_and_threads_it() {
    let config = test_config(CorsMode::Strict, &[], false);
    let server = McpServer::new(&config);
    let state = HttpState {
        server: server.clone(),
        cors: config.cors.clone(),
        backend_defaults: server.backend_defaults(),
        stateless: false,
        endpoint: config.endpoint.clone(),
        shutdown: CancellationToken::new(),
    };
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(json_request("/mcp", initialize_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let session_id = response
        .headers()
        .get(MCP_SESSION_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(session_id.starts_with("mcp-"));
    assert!(server.sessions.exists(&session_id));

    let body = body_json(response).await;
    assert_eq!(body["result"]["serverInfo"]["name"], "terraform-mcp-server");
    assert!(!body["result"]["serverInfo"]["version"]
        .as_str()
        .unwrap()
        .is_empty());

    // Follow-up request on the same session.
    let list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(MCP_SESSION_ID_HEADER, &session_id)
                .body(Body::from(list.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["result"]["tools"].as_array().unwrap().len() >= 8);

    // DELETE tears the session down.
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/mcp")
                .header(MCP_SESSION_ID_HEADER, &session_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!server.sessions.exists(&session_id));
}

#[tokio::test]
async fn non_initialize_requests_require_a_session() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let response = router
        .clone()
        .oneshot(json_request("/mcp", list.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(MCP_SESSION_ID_HEADER, "mcp-00000000-0000-4000-8000-000000000000")
                .body(Body::from(list.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trailing_slash_alias_serves_the_endpoint() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(json_request("/mcp/", initialize_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn sse_accept_returns_an_event_stream() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "text/event-stream")
                .body(Body::from(initialize_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&bytes);
    assert!(body.contains("event: message"));
    assert!(body.contains("terraform-mcp-server"));
}

#[tokio::test]
async fn stateless_mode_ignores_session_headers() {
    let config = test_config(CorsMode::Strict, &[], true);
    let server = McpServer::new(&config);
    let router = build_router(HttpState {
        server: server.clone(),
        cors: config.cors.clone(),
        backend_defaults: server.backend_defaults(),
        stateless: true,
        endpoint: config.endpoint.clone(),
        shutdown: CancellationToken::new(),
    });

    // tools/list works without initialize or a session header.
    let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let response = router.clone().oneshot(json_request("/mcp", list)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["result"]["tools"].is_array());

    // The ephemeral session is gone afterwards.
    assert_eq!(server.sessions.session_count(), 0);

    // The standalone notification stream does not exist in stateless mode.
    let response = router
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/mcp")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn malformed_json_is_a_parse_error() {
    let config = test_config(CorsMode::Strict, &[], false);
    let router = router_for(&config);

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!(-32700));
}
