//! Protocol-level integration: the dispatch core drives both transports, so
//! most behavior is pinned here once and the transport files only check
//! framing.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use terraform_mcp_server::config::{
    BackendDefaults, CorsConfig, CorsMode, RateLimitConfig, ServerConfig,
};
use terraform_mcp_server::mcp::http::{build_router, HttpState, MCP_SESSION_ID_HEADER};
use terraform_mcp_server::mcp::types::{JsonRpcRequest, RequestId};
use terraform_mcp_server::{BackendContext, McpServer};

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        endpoint: "/mcp".to_string(),
        stateless: false,
        cors: CorsConfig {
            mode: CorsMode::Strict,
            allowed_origins: vec![],
        },
        rate_limit: RateLimitConfig::default(),
        backend: BackendDefaults {
            address: "https://app.terraform.io".to_string(),
            token: String::new(),
            skip_tls_verify: false,
        },
    }
}

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(RequestId::Number(id)),
        method: method.to_string(),
        params,
    }
}

fn backend_context() -> BackendContext {
    BackendContext {
        address: "https://app.terraform.io".to_string(),
        token: "tok-test".to_string(),
        skip_tls_verify: false,
    }
}

async fn dispatch(server: &Arc<McpServer>, session: &str, req: JsonRpcRequest) -> Value {
    let response = server
        .handle_message(session, req, CancellationToken::new())
        .await
        .expect("requests get responses");
    serde_json::to_value(&response).unwrap()
}

#[tokio::test]
async fn initialize_returns_the_server_identity() {
    let server = McpServer::new(&test_config());
    server.open_session("s1", BackendContext::default());

    let response = dispatch(
        &server,
        "s1",
        request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "e2e", "version": "0.0.1"}
            }),
        ),
    )
    .await;

    assert_eq!(response["result"]["serverInfo"]["name"], "terraform-mcp-server");
    assert!(!response["result"]["serverInfo"]["version"]
        .as_str()
        .unwrap()
        .is_empty());
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["resources"].is_object());
}

#[tokio::test]
async fn ping_answers_with_an_empty_result() {
    let server = McpServer::new(&test_config());
    let response = dispatch(&server, "s1", request(1, "ping", Value::Null)).await;
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn tfe_tools_appear_after_the_first_credentialed_session() {
    let server = McpServer::new(&test_config());
    server.open_session("plain", BackendContext::default());

    let before = dispatch(&server, "plain", request(1, "tools/list", Value::Null)).await;
    let names_before: Vec<String> = before["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names_before.contains(&"search_providers".to_string()));
    assert!(names_before.contains(&"get_policy_details".to_string()));
    assert!(!names_before.contains(&"list_workspaces".to_string()));

    // A session with a token publishes the credentialed set once.
    server.open_session("rich", backend_context());

    let after = dispatch(&server, "plain", request(2, "tools/list", Value::Null)).await;
    let names_after: Vec<String> = after["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names_after.contains(&"list_workspaces".to_string()));
    assert!(names_after.contains(&"create_run".to_string()));
    assert_eq!(names_after.len(), names_before.len() + 12);

    // The descriptors survive the credentialed session ending.
    server.close_session("rich");
    let final_list = dispatch(&server, "plain", request(3, "tools/list", Value::Null)).await;
    assert_eq!(
        final_list["result"]["tools"].as_array().unwrap().len(),
        names_after.len()
    );
}

#[tokio::test]
async fn credentialed_call_without_backend_is_a_tool_level_error() {
    let server = McpServer::new(&test_config());
    server.open_session("rich", backend_context());
    server.open_session("plain", BackendContext::default());

    let response = dispatch(
        &server,
        "plain",
        request(
            1,
            "tools/call",
            json!({"name": "list_terraform_orgs", "arguments": {}}),
        ),
    )
    .await;

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], json!(true));
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("TFE_TOKEN"));
    assert!(text.contains("TFE_ADDRESS"));
}

#[tokio::test]
async fn session_teardown_is_observable_everywhere() {
    let server = McpServer::new(&test_config());
    server.open_session("s1", backend_context());
    assert!(server.sessions.exists("s1"));
    assert!(server.sessions.has_tfe_client("s1"));
    assert!(server.tools.session_has_tfe("s1"));

    server.close_session("s1");
    assert!(!server.sessions.exists("s1"));
    assert!(!server.sessions.has_tfe_client("s1"));
    assert!(!server.tools.session_has_tfe("s1"));
    assert!(server.sessions.http_client("s1").is_none());
}

#[tokio::test]
async fn resource_listings_are_stable() {
    let server = McpServer::new(&test_config());

    let resources = dispatch(&server, "s1", request(1, "resources/list", Value::Null)).await;
    let uris: Vec<&str> = resources["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert_eq!(uris, vec!["/terraform/style-guide", "/terraform/module-development"]);

    let templates = dispatch(
        &server,
        "s1",
        request(2, "resources/templates/list", Value::Null),
    )
    .await;
    assert_eq!(
        templates["result"]["resourceTemplates"][0]["uriTemplate"],
        "registry://providers/{namespace}/name/{name}/version/{version}"
    );
    assert_eq!(
        templates["result"]["resourceTemplates"][0]["mimeType"],
        "application/json"
    );
}

/// The same frame produces the same result body whether it is dispatched
/// directly (the stdio path) or through the HTTP endpoint.
#[tokio::test]
async fn transports_agree_on_results() {
    let config = test_config();

    // Direct dispatch, as the stdio driver does it.
    let direct_server = McpServer::new(&config);
    direct_server.open_session("stdio-session", BackendContext::default());
    let direct = dispatch(
        &direct_server,
        "stdio-session",
        request(7, "tools/list", Value::Null),
    )
    .await;

    // The identical frame over HTTP.
    let http_server = McpServer::new(&config);
    let router = build_router(HttpState {
        server: http_server.clone(),
        cors: config.cors.clone(),
        backend_defaults: http_server.backend_defaults(),
        stateless: false,
        endpoint: config.endpoint.clone(),
        shutdown: CancellationToken::new(),
    });

    let init = json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {"protocolVersion": "2025-03-26", "capabilities": {},
                    "clientInfo": {"name": "e2e", "version": "0.0.1"}}
    });
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/mcp")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(init.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let session_id = response
        .headers()
        .get(MCP_SESSION_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let list = json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"});
    let response = router
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
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let over_http: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(direct["result"], over_http["result"]);
    assert_eq!(direct["id"], over_http["id"]);
}

#[tokio::test]
async fn tool_descriptors_carry_schemas_and_annotations() {
    let server = McpServer::new(&test_config());
    server.open_session("rich", backend_context());

    let listing = dispatch(&server, "rich", request(1, "tools/list", Value::Null)).await;
    for tool in listing["result"]["tools"].as_array().unwrap() {
        assert!(tool["name"].is_string());
        assert!(tool["description"].is_string());
        assert!(tool["inputSchema"].is_object());
        assert!(tool["annotations"]["title"].is_string());
    }

    let delete_tool = listing["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "delete_workspace_safely")
        .unwrap();
    assert_eq!(delete_tool["annotations"]["destructiveHint"], json!(true));
}
