//! Per-request backend configuration resolution.
//!
//! Each HTTP request may carry the backend address, token and TLS-skip flag
//! as headers or (token excepted) query parameters. Precedence per value:
//! header, then query parameter, then process environment, then empty. A
//! token in the query string is rejected outright so it can never land in
//! access logs.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use crate::config::{ENV_TFE_ADDRESS, ENV_TFE_SKIP_TLS_VERIFY, ENV_TFE_TOKEN};
use crate::mcp::http::HttpState;
use crate::mcp::session::BackendContext;

pub const TOKEN_IN_QUERY_MESSAGE: &str = "Terraform token should not be provided in query \
     parameters for security reasons, use the TFE_TOKEN header";

/// Raised when the token shows up in the query string.
#[derive(Debug, PartialEq, Eq)]
pub struct TokenInQuery;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    // HeaderMap lookups are case-insensitive, which covers the canonical
    // `Tfe-Address`/`TFE_ADDRESS` spellings alike.
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn query_value(query: &str, name: &str) -> Option<String> {
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.eq_ignore_ascii_case(name) && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

fn resolve(headers: &HeaderMap, query: &str, name: &str) -> Option<String> {
    if let Some(value) = header_value(headers, name) {
        return Some(value.to_string());
    }
    if let Some(value) = query_value(query, name) {
        return Some(value);
    }
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Resolves the backend triple for one request against the configured
/// fallbacks. Fails if the token appears in the query string, regardless of
/// whether a header also supplies one.
pub fn resolve_backend_context(
    headers: &HeaderMap,
    query: &str,
    defaults: &BackendContext,
) -> Result<BackendContext, TokenInQuery> {
    if query_value(query, ENV_TFE_TOKEN).is_some() {
        return Err(TokenInQuery);
    }

    let address = resolve(headers, query, ENV_TFE_ADDRESS).unwrap_or_else(|| defaults.address.clone());
    let token = header_value(headers, ENV_TFE_TOKEN)
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_TFE_TOKEN).ok().filter(|t| !t.is_empty()))
        .unwrap_or_else(|| defaults.token.clone());
    let skip_tls_verify = resolve(headers, query, ENV_TFE_SKIP_TLS_VERIFY)
        .and_then(|value| value.trim().parse::<bool>().ok())
        .unwrap_or(defaults.skip_tls_verify);

    Ok(BackendContext {
        address,
        token,
        skip_tls_verify,
    })
}

/// axum middleware binding the resolved context into the request extensions.
pub async fn terraform_context_middleware(
    State(state): State<HttpState>,
    mut request: Request,
    next: Next,
) -> Response {
    let query = request.uri().query().unwrap_or("").to_string();

    let context = match resolve_backend_context(request.headers(), &query, &state.backend_defaults)
    {
        Ok(context) => context,
        Err(TokenInQuery) => {
            info!("Terraform token was provided in query parameters, terminating request");
            return (StatusCode::BAD_REQUEST, TOKEN_IN_QUERY_MESSAGE).into_response();
        }
    };

    if !context.token.is_empty() {
        debug!("Terraform token provided via request context");
    }
    if !context.address.is_empty() {
        debug!("Terraform address configured via request context");
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn defaults() -> BackendContext {
        BackendContext {
            address: "https://app.terraform.io".to_string(),
            token: String::new(),
            skip_tls_verify: false,
        }
    }

    #[test]
    fn falls_back_to_defaults() {
        let headers = HeaderMap::new();
        let context = resolve_backend_context(&headers, "", &defaults()).unwrap();
        assert_eq!(context.address, "https://app.terraform.io");
        assert!(context.token.is_empty());
        assert!(!context.skip_tls_verify);
    }

    #[test]
    fn header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert("TFE_ADDRESS", HeaderValue::from_static("https://from-header"));
        let context = resolve_backend_context(
            &headers,
            "TFE_ADDRESS=https://from-query",
            &defaults(),
        )
        .unwrap();
        assert_eq!(context.address, "https://from-header");
    }

    #[test]
    fn query_supplies_non_token_values() {
        let headers = HeaderMap::new();
        let context = resolve_backend_context(
            &headers,
            "tfe_address=https://from-query&tfe_skip_tls_verify=true",
            &defaults(),
        )
        .unwrap();
        assert_eq!(context.address, "https://from-query");
        assert!(context.skip_tls_verify);
    }

    #[test]
    fn token_comes_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("TFE_TOKEN", HeaderValue::from_static("secret"));
        let context = resolve_backend_context(&headers, "", &defaults()).unwrap();
        assert_eq!(context.token, "secret");
    }

    #[test]
    fn token_in_query_is_rejected() {
        let headers = HeaderMap::new();
        let err = resolve_backend_context(&headers, "tfe_token=secret", &defaults()).unwrap_err();
        assert_eq!(err, TokenInQuery);

        // Rejected even when a header token is also present.
        let mut headers = HeaderMap::new();
        headers.insert("TFE_TOKEN", HeaderValue::from_static("header-secret"));
        assert!(resolve_backend_context(&headers, "TFE_TOKEN=query-secret", &defaults()).is_err());
    }

    #[test]
    fn malformed_tls_flag_defaults_to_false() {
        let headers = HeaderMap::new();
        let context =
            resolve_backend_context(&headers, "tfe_skip_tls_verify=yes-please", &defaults())
                .unwrap();
        assert!(!context.skip_tls_verify);
    }
}
