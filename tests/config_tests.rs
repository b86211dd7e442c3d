//! Configuration resolution from the environment. These tests mutate the
//! process environment, so they all serialize on one lock.

use std::sync::Mutex;

use once_cell::sync::Lazy;
use terraform_mcp_server::config;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Clears every variable the resolver reads, runs the test body, then
/// clears them again.
fn with_clean_env<F: FnOnce()>(f: F) {
    let _guard = ENV_LOCK.lock().unwrap();
    let keys = [
        config::ENV_TRANSPORT_MODE,
        config::ENV_TRANSPORT_HOST,
        config::ENV_TRANSPORT_PORT,
        config::ENV_MCP_ENDPOINT,
        config::ENV_SESSION_MODE,
        config::ENV_CORS_MODE,
        config::ENV_ALLOWED_ORIGINS,
        config::ENV_RATE_LIMIT_GLOBAL,
        config::ENV_RATE_LIMIT_SESSION,
        config::ENV_TFE_ADDRESS,
        config::ENV_TFE_TOKEN,
        config::ENV_TFE_SKIP_TLS_VERIFY,
    ];
    for key in keys {
        std::env::remove_var(key);
    }
    f();
    for key in keys {
        std::env::remove_var(key);
    }
}

#[test]
fn http_host_defaults_and_overrides() {
    with_clean_env(|| {
        assert_eq!(config::http_host(), "127.0.0.1");

        std::env::set_var(config::ENV_TRANSPORT_HOST, "0.0.0.0");
        assert_eq!(config::http_host(), "0.0.0.0");

        std::env::set_var(config::ENV_TRANSPORT_HOST, "192.168.1.100");
        assert_eq!(config::http_host(), "192.168.1.100");
    });
}

#[test]
fn http_port_defaults_and_overrides() {
    with_clean_env(|| {
        assert_eq!(config::http_port(), 8080);

        std::env::set_var(config::ENV_TRANSPORT_PORT, "9090");
        assert_eq!(config::http_port(), 9090);

        std::env::set_var(config::ENV_TRANSPORT_PORT, "not-a-port");
        assert_eq!(config::http_port(), 8080);
    });
}

#[test]
fn endpoint_path_defaults_env_and_flag() {
    with_clean_env(|| {
        assert_eq!(config::endpoint_path(None), "/mcp");

        std::env::set_var(config::ENV_MCP_ENDPOINT, "/terraform");
        assert_eq!(config::endpoint_path(None), "/terraform");

        std::env::set_var(config::ENV_MCP_ENDPOINT, "/api/v1/terraform-mcp");
        assert_eq!(config::endpoint_path(None), "/api/v1/terraform-mcp");

        // Environment wins over an explicit flag.
        assert_eq!(config::endpoint_path(Some("/flagged")), "/api/v1/terraform-mcp");

        std::env::remove_var(config::ENV_MCP_ENDPOINT);
        assert_eq!(config::endpoint_path(Some("/flagged")), "/flagged");
        assert_eq!(config::endpoint_path(Some("unrooted")), "/unrooted");
    });
}

#[test]
fn streamable_http_mode_forced_by_any_transport_variable() {
    with_clean_env(|| {
        assert!(!config::streamable_http_forced());

        std::env::set_var(config::ENV_TRANSPORT_MODE, "http");
        assert!(config::streamable_http_forced());
        std::env::remove_var(config::ENV_TRANSPORT_MODE);

        std::env::set_var(config::ENV_TRANSPORT_MODE, "streamable-http");
        assert!(config::streamable_http_forced());
        std::env::remove_var(config::ENV_TRANSPORT_MODE);

        std::env::set_var(config::ENV_TRANSPORT_MODE, "stdio");
        assert!(!config::streamable_http_forced());
        std::env::remove_var(config::ENV_TRANSPORT_MODE);

        std::env::set_var(config::ENV_TRANSPORT_PORT, "9090");
        assert!(config::streamable_http_forced());
        std::env::remove_var(config::ENV_TRANSPORT_PORT);

        std::env::set_var(config::ENV_TRANSPORT_HOST, "0.0.0.0");
        assert!(config::streamable_http_forced());
        std::env::remove_var(config::ENV_TRANSPORT_HOST);

        std::env::set_var(config::ENV_MCP_ENDPOINT, "/mcp");
        assert!(config::streamable_http_forced());
    });
}

#[test]
fn session_mode_is_case_insensitive_and_defaults_to_stateful() {
    with_clean_env(|| {
        assert!(!config::stateless_mode());

        std::env::set_var(config::ENV_SESSION_MODE, "stateful");
        assert!(!config::stateless_mode());

        std::env::set_var(config::ENV_SESSION_MODE, "stateless");
        assert!(config::stateless_mode());

        std::env::set_var(config::ENV_SESSION_MODE, "STATELESS");
        assert!(config::stateless_mode());

        std::env::set_var(config::ENV_SESSION_MODE, "StAtElEsS");
        assert!(config::stateless_mode());

        std::env::set_var(config::ENV_SESSION_MODE, "invalid-value");
        assert!(!config::stateless_mode());
    });
}

#[test]
fn cors_config_parses_mode_and_origins() {
    with_clean_env(|| {
        let cors = config::CorsConfig::from_env();
        assert_eq!(cors.mode, config::CorsMode::Strict);
        assert!(cors.allowed_origins.is_empty());

        std::env::set_var(config::ENV_CORS_MODE, "development");
        std::env::set_var(
            config::ENV_ALLOWED_ORIGINS,
            " https://example.com , https://app.example.com ",
        );
        let cors = config::CorsConfig::from_env();
        assert_eq!(cors.mode, config::CorsMode::Development);
        assert_eq!(
            cors.allowed_origins,
            vec!["https://example.com", "https://app.example.com"]
        );

        std::env::set_var(config::ENV_CORS_MODE, "disabled");
        assert_eq!(config::CorsConfig::from_env().mode, config::CorsMode::Disabled);

        // Unknown values fall back to strict.
        std::env::set_var(config::ENV_CORS_MODE, "wide-open");
        assert_eq!(config::CorsConfig::from_env().mode, config::CorsMode::Strict);
    });
}

#[test]
fn rate_limit_config_defaults_and_parsing() {
    with_clean_env(|| {
        let limits = config::RateLimitConfig::from_env();
        assert_eq!(limits.global.rps, 10.0);
        assert_eq!(limits.global.burst, 20);
        assert_eq!(limits.session.rps, 5.0);
        assert_eq!(limits.session.burst, 10);

        std::env::set_var(config::ENV_RATE_LIMIT_GLOBAL, "2.5:7");
        std::env::set_var(config::ENV_RATE_LIMIT_SESSION, "1:3");
        let limits = config::RateLimitConfig::from_env();
        assert_eq!(limits.global.rps, 2.5);
        assert_eq!(limits.global.burst, 7);
        assert_eq!(limits.session.rps, 1.0);
        assert_eq!(limits.session.burst, 3);

        // Malformed specs fall back to the defaults.
        std::env::set_var(config::ENV_RATE_LIMIT_GLOBAL, "banana");
        std::env::set_var(config::ENV_RATE_LIMIT_SESSION, "0:0");
        let limits = config::RateLimitConfig::from_env();
        assert_eq!(limits.global.rps, 10.0);
        assert_eq!(limits.global.burst, 20);
        assert_eq!(limits.session.rps, 5.0);
        assert_eq!(limits.session.burst, 10);
    });
}

#[test]
fn backend_defaults_resolve_from_env() {
    with_clean_env(|| {
        let backend = config::BackendDefaults::from_env();
        assert_eq!(backend.address, config::DEFAULT_TFE_ADDRESS);
        assert!(backend.token.is_empty());
        assert!(!backend.skip_tls_verify);

        std::env::set_var(config::ENV_TFE_ADDRESS, "https://tfe.internal.example.com");
        std::env::set_var(config::ENV_TFE_TOKEN, "tok-123");
        std::env::set_var(config::ENV_TFE_SKIP_TLS_VERIFY, "true");
        let backend = config::BackendDefaults::from_env();
        assert_eq!(backend.address, "https://tfe.internal.example.com");
        assert_eq!(backend.token, "tok-123");
        assert!(backend.skip_tls_verify);

        std::env::set_var(config::ENV_TFE_SKIP_TLS_VERIFY, "definitely");
        assert!(!config::BackendDefaults::from_env().skip_tls_verify);
    });
}

#[test]
fn full_server_config_assembles() {
    with_clean_env(|| {
        std::env::set_var(config::ENV_TRANSPORT_HOST, "0.0.0.0");
        std::env::set_var(config::ENV_TRANSPORT_PORT, "9191");
        std::env::set_var(config::ENV_MCP_ENDPOINT, "custom");

        let server_config = config::ServerConfig::from_env();
        assert_eq!(server_config.bind_address(), "0.0.0.0:9191");
        // Endpoint is forced to start with '/'.
        assert_eq!(server_config.endpoint, "/custom");
        assert!(!server_config.stateless);
    });
}
