//! Server configuration resolved from the environment at process start.
//!
//! Environment variables always win over command-line flags for transport
//! selection: the mere presence of `TRANSPORT_HOST`, `TRANSPORT_PORT` or
//! `MCP_ENDPOINT` forces HTTP mode regardless of `TRANSPORT_MODE`.

use tracing::warn;

pub const ENV_TRANSPORT_MODE: &str = "TRANSPORT_MODE";
pub const ENV_TRANSPORT_HOST: &str = "TRANSPORT_HOST";
pub const ENV_TRANSPORT_PORT: &str = "TRANSPORT_PORT";
pub const ENV_MCP_ENDPOINT: &str = "MCP_ENDPOINT";
pub const ENV_SESSION_MODE: &str = "MCP_SESSION_MODE";
pub const ENV_CORS_MODE: &str = "MCP_CORS_MODE";
pub const ENV_ALLOWED_ORIGINS: &str = "MCP_ALLOWED_ORIGINS";
pub const ENV_RATE_LIMIT_GLOBAL: &str = "MCP_RATE_LIMIT_GLOBAL";
pub const ENV_RATE_LIMIT_SESSION: &str = "MCP_RATE_LIMIT_SESSION";

pub const ENV_TFE_ADDRESS: &str = "TFE_ADDRESS";
pub const ENV_TFE_TOKEN: &str = "TFE_TOKEN";
pub const ENV_TFE_SKIP_TLS_VERIFY: &str = "TFE_SKIP_TLS_VERIFY";

/// Canonical Terraform Cloud address used when no per-request or
/// per-process backend address is configured.
pub const DEFAULT_TFE_ADDRESS: &str = "https://app.terraform.io";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ENDPOINT: &str = "/mcp";

/// CORS validation policy for the HTTP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsMode {
    /// Only origins from the configured allowlist are admitted.
    Strict,
    /// Allowlist plus any localhost/127.0.0.1/[::1] origin.
    Development,
    /// Every origin is admitted.
    Disabled,
}

impl CorsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorsMode::Strict => "strict",
            CorsMode::Development => "development",
            CorsMode::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub mode: CorsMode,
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn from_env() -> Self {
        let mode = match std::env::var(ENV_CORS_MODE).unwrap_or_default().as_str() {
            "development" => CorsMode::Development,
            "disabled" => CorsMode::Disabled,
            // Default to strict, including for unknown values.
            _ => CorsMode::Strict,
        };

        let allowed_origins = std::env::var(ENV_ALLOWED_ORIGINS)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            mode,
            allowed_origins,
        }
    }
}

/// One token-bucket specification: sustained rate and burst capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSpec {
    pub rps: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub global: RateLimitSpec,
    pub session: RateLimitSpec,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: RateLimitSpec {
                rps: 10.0,
                burst: 20,
            },
            session: RateLimitSpec { rps: 5.0, burst: 10 },
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_RATE_LIMIT_GLOBAL) {
            match parse_rate_limit(&raw) {
                Some(spec) => config.global = spec,
                None => warn!(
                    value = %raw,
                    "invalid {} format, using default {}:{}",
                    ENV_RATE_LIMIT_GLOBAL, config.global.rps, config.global.burst
                ),
            }
        }

        if let Ok(raw) = std::env::var(ENV_RATE_LIMIT_SESSION) {
            match parse_rate_limit(&raw) {
                Some(spec) => config.session = spec,
                None => warn!(
                    value = %raw,
                    "invalid {} format, using default {}:{}",
                    ENV_RATE_LIMIT_SESSION, config.session.rps, config.session.burst
                ),
            }
        }

        config
    }
}

/// Parses the `rps:burst` format. Both halves must be present and positive.
pub fn parse_rate_limit(raw: &str) -> Option<RateLimitSpec> {
    let (rps, burst) = raw.split_once(':')?;
    let rps: f64 = rps.trim().parse().ok()?;
    let burst: u32 = burst.trim().parse().ok()?;
    if rps > 0.0 && burst > 0 {
        Some(RateLimitSpec { rps, burst })
    } else {
        None
    }
}

/// Backend configuration fallbacks used when a request does not carry its
/// own address/token/TLS headers.
#[derive(Debug, Clone, Default)]
pub struct BackendDefaults {
    pub address: String,
    pub token: String,
    pub skip_tls_verify: bool,
}

impl BackendDefaults {
    pub fn from_env() -> Self {
        Self {
            address: env_or(ENV_TFE_ADDRESS, DEFAULT_TFE_ADDRESS),
            token: std::env::var(ENV_TFE_TOKEN).unwrap_or_default(),
            skip_tls_verify: std::env::var(ENV_TFE_SKIP_TLS_VERIFY)
                .ok()
                .and_then(|v| v.trim().parse::<bool>().ok())
                .unwrap_or(false),
        }
    }
}

/// Immutable process configuration assembled once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub stateless: bool,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub backend: BackendDefaults,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: http_host(),
            port: http_port(),
            endpoint: endpoint_path(None),
            stateless: stateless_mode(),
            cors: CorsConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            backend: BackendDefaults::from_env(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Whether the environment forces the streamable HTTP transport. Setting any
/// of the transport variables is treated as an explicit opt-in, even when
/// `TRANSPORT_MODE` itself is absent.
pub fn streamable_http_forced() -> bool {
    let mode = std::env::var(ENV_TRANSPORT_MODE).unwrap_or_default();
    mode == "http"
        || mode == "streamable-http"
        || env_present(ENV_TRANSPORT_PORT)
        || env_present(ENV_TRANSPORT_HOST)
        || env_present(ENV_MCP_ENDPOINT)
}

/// `MCP_SESSION_MODE=stateless` (case-insensitive) selects stateless HTTP
/// handling; every other value, including garbage, means stateful.
pub fn stateless_mode() -> bool {
    std::env::var(ENV_SESSION_MODE)
        .map(|mode| mode.to_lowercase() == "stateless")
        .unwrap_or(false)
}

pub fn http_host() -> String {
    env_or(ENV_TRANSPORT_HOST, DEFAULT_HOST)
}

pub fn http_port() -> u16 {
    match std::env::var(ENV_TRANSPORT_PORT) {
        Ok(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "invalid {} value, using {}", ENV_TRANSPORT_PORT, DEFAULT_PORT);
            DEFAULT_PORT
        }),
        _ => DEFAULT_PORT,
    }
}

/// Resolves the MCP endpoint path: environment first, then an explicit flag
/// value, then the default. The result always starts with `/`.
pub fn endpoint_path(flag: Option<&str>) -> String {
    let path = match std::env::var(ENV_MCP_ENDPOINT) {
        Ok(env_path) if !env_path.is_empty() => env_path,
        _ => match flag {
            Some(flag_path) if !flag_path.is_empty() => flag_path.to_string(),
            _ => DEFAULT_ENDPOINT.to_string(),
        },
    };

    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

fn env_present(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

fn env_or(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rate_limit_accepts_rps_burst() {
        let spec = parse_rate_limit("10:20").unwrap();
        assert_eq!(spec.rps, 10.0);
        assert_eq!(spec.burst, 20);

        let spec = parse_rate_limit(" 2.5 : 7 ").unwrap();
        assert_eq!(spec.rps, 2.5);
        assert_eq!(spec.burst, 7);
    }

    #[test]
    fn parse_rate_limit_rejects_malformed_input() {
        assert!(parse_rate_limit("").is_none());
        assert!(parse_rate_limit("10").is_none());
        assert!(parse_rate_limit("10:").is_none());
        assert!(parse_rate_limit(":20").is_none());
        assert!(parse_rate_limit("a:b").is_none());
        assert!(parse_rate_limit("0:20").is_none());
        assert!(parse_rate_limit("10:0").is_none());
        assert!(parse_rate_limit("-1:5").is_none());
    }

    #[test]
    fn endpoint_path_is_rooted() {
        assert_eq!(endpoint_path(Some("mcp")), "/mcp");
        assert_eq!(endpoint_path(Some("/custom")), "/custom");
    }
}
