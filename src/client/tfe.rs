//! Credentialed Terraform Cloud/Enterprise client.
//!
//! A thin JSON:API client over reqwest covering the slice of the TFE v2 API
//! the credentialed tools use: organizations, projects, workspaces, runs and
//! the private registry listings. One instance is owned per session; it is
//! only built when the session supplies a non-empty token.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::client::registry::{build_http_client, UPSTREAM_TIMEOUT_SECS};
use crate::shared::utils::Pagination;

#[derive(Error, Debug)]
pub enum TfeError {
    #[error("no Terraform token provided")]
    MissingToken,

    #[error("invalid Terraform address: {0}")]
    InvalidAddress(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Terraform Cloud/Enterprise returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("JSON parsing failed: {0}")]
    Json(String),
}

impl From<reqwest::Error> for TfeError {
    // `without_url` keeps credential-bearing URLs out of error text.
    fn from(error: reqwest::Error) -> Self {
        TfeError::Http(error.without_url().to_string())
    }
}

impl From<serde_json::Error> for TfeError {
    fn from(error: serde_json::Error) -> Self {
        TfeError::Json(error.to_string())
    }
}

/// One resource object out of a JSON:API document.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonApiResource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub attributes: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct JsonApiList {
    #[serde(default)]
    data: Vec<JsonApiResource>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonApiSingle {
    data: JsonApiResource,
}

/// Per-session TFE client. Never logs or surfaces the token.
#[derive(Clone)]
pub struct TfeClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    token: String,
}

impl std::fmt::Debug for TfeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfeClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TfeClient {
    /// Builds a client for `address` (e.g. `https://app.terraform.io`).
    /// Fails on an empty token or an unparseable address.
    pub fn new(address: &str, token: &str, skip_tls_verify: bool) -> Result<Self, TfeError> {
        if token.is_empty() {
            return Err(TfeError::MissingToken);
        }

        let base_url = reqwest::Url::parse(address)
            .map_err(|e| TfeError::InvalidAddress(format!("{address}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TfeError::InvalidAddress(format!(
                "{address}: unsupported scheme"
            )));
        }

        Ok(Self {
            http: build_http_client(skip_tls_verify)
                .map_err(|e| TfeError::Http(e.to_string()))?,
            base_url,
            token: token.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        self.base_url.as_str()
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<u8>, TfeError> {
        let url = self
            .base_url
            .join(&format!("api/v2/{path}"))
            .map_err(|e| TfeError::InvalidAddress(e.to_string()))?;
        debug!(%path, method = %method, "TFE request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/vnd.api+json")
            .timeout(std::time::Duration::from_secs(UPSTREAM_TIMEOUT_SECS));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TfeError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_list(&self, path: &str) -> Result<Vec<JsonApiResource>, TfeError> {
        let body = self.request(reqwest::Method::GET, path, None).await?;
        let list: JsonApiList = serde_json::from_slice(&body)?;
        Ok(list.data)
    }

    async fn get_single(&self, path: &str) -> Result<JsonApiResource, TfeError> {
        let body = self.request(reqwest::Method::GET, path, None).await?;
        let single: JsonApiSingle = serde_json::from_slice(&body)?;
        Ok(single.data)
    }

    // -- organizations / projects -------------------------------------------

    pub async fn list_organizations(
        &self,
        page: Pagination,
    ) -> Result<Vec<JsonApiResource>, TfeError> {
        self.get_list(&format!(
            "organizations?page[number]={}&page[size]={}",
            page.page, page.page_size
        ))
        .await
    }

    pub async fn list_projects(
        &self,
        org: &str,
        page: Pagination,
    ) -> Result<Vec<JsonApiResource>, TfeError> {
        self.get_list(&format!(
            "organizations/{org}/projects?page[number]={}&page[size]={}",
            page.page, page.page_size
        ))
        .await
    }

    // -- workspaces ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn list_workspaces(
        &self,
        org: &str,
        search: Option<&str>,
        project_id: Option<&str>,
        tags: Option<&str>,
        exclude_tags: Option<&str>,
        wildcard_name: Option<&str>,
        page: Pagination,
    ) -> Result<Vec<JsonApiResource>, TfeError> {
        let mut path = format!(
            "organizations/{org}/workspaces?page[number]={}&page[size]={}",
            page.page, page.page_size
        );
        if let Some(search) = search {
            path.push_str(&format!("&search[name]={}", urlencode(search)));
        }
        if let Some(project_id) = project_id {
            path.push_str(&format!("&filter[project][id]={}", urlencode(project_id)));
        }
        if let Some(tags) = tags {
            path.push_str(&format!("&search[tags]={}", urlencode(tags)));
        }
        if let Some(exclude) = exclude_tags {
            path.push_str(&format!("&search[exclude-tags]={}", urlencode(exclude)));
        }
        if let Some(wildcard) = wildcard_name {
            path.push_str(&format!("&search[wildcard-name]={}", urlencode(wildcard)));
        }
        self.get_list(&path).await
    }

    pub async fn get_workspace(
        &self,
        org: &str,
        workspace: &str,
    ) -> Result<JsonApiResource, TfeError> {
        self.get_single(&format!("organizations/{org}/workspaces/{workspace}"))
            .await
    }

    /// Creates a workspace from pre-assembled JSON:API attributes.
    pub async fn create_workspace(
        &self,
        org: &str,
        attributes: Value,
    ) -> Result<JsonApiResource, TfeError> {
        let payload = json!({"data": {"type": "workspaces", "attributes": attributes}});
        let body = self
            .request(
                reqwest::Method::POST,
                &format!("organizations/{org}/workspaces"),
                Some(payload),
            )
            .await?;
        let single: JsonApiSingle = serde_json::from_slice(&body)?;
        Ok(single.data)
    }

    pub async fn update_workspace(
        &self,
        org: &str,
        workspace: &str,
        attributes: Value,
    ) -> Result<JsonApiResource, TfeError> {
        let payload = json!({"data": {"type": "workspaces", "attributes": attributes}});
        let body = self
            .request(
                reqwest::Method::PATCH,
                &format!("organizations/{org}/workspaces/{workspace}"),
                Some(payload),
            )
            .await?;
        let single: JsonApiSingle = serde_json::from_slice(&body)?;
        Ok(single.data)
    }

    /// Safe delete: refuses server-side when the workspace still manages
    /// resources.
    pub async fn safe_delete_workspace(&self, org: &str, workspace: &str) -> Result<(), TfeError> {
        self.request(
            reqwest::Method::POST,
            &format!("organizations/{org}/workspaces/{workspace}/actions/safe-delete"),
            None,
        )
        .await?;
        Ok(())
    }

    // -- runs ---------------------------------------------------------------

    pub async fn list_runs(
        &self,
        workspace_id: &str,
        page: Pagination,
    ) -> Result<Vec<JsonApiResource>, TfeError> {
        self.get_list(&format!(
            "workspaces/{workspace_id}/runs?page[number]={}&page[size]={}",
            page.page, page.page_size
        ))
        .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<JsonApiResource, TfeError> {
        self.get_single(&format!("runs/{run_id}")).await
    }

    /// Creates a run in the given workspace. `plan_only` maps the
    /// `plan_and_apply` / `plan_only` run types.
    pub async fn create_run(
        &self,
        workspace_id: &str,
        message: &str,
        plan_only: bool,
    ) -> Result<JsonApiResource, TfeError> {
        let payload = json!({
            "data": {
                "type": "runs",
                "attributes": {
                    "message": message,
                    "plan-only": plan_only,
                },
                "relationships": {
                    "workspace": {
                        "data": {"type": "workspaces", "id": workspace_id}
                    }
                }
            }
        });
        let body = self
            .request(reqwest::Method::POST, "runs", Some(payload))
            .await?;
        let single: JsonApiSingle = serde_json::from_slice(&body)?;
        Ok(single.data)
    }

    // -- private registry ---------------------------------------------------

    pub async fn list_registry_modules(
        &self,
        org: &str,
        search: Option<&str>,
        page: Pagination,
    ) -> Result<Vec<JsonApiResource>, TfeError> {
        let mut path = format!(
            "organizations/{org}/registry-modules?page[number]={}&page[size]={}",
            page.page, page.page_size
        );
        if let Some(search) = search {
            path.push_str(&format!("&q={}", urlencode(search)));
        }
        self.get_list(&path).await
    }

    pub async fn list_registry_providers(
        &self,
        org: &str,
        search: Option<&str>,
        page: Pagination,
    ) -> Result<Vec<JsonApiResource>, TfeError> {
        let mut path = format!(
            "organizations/{org}/registry-providers?page[number]={}&page[size]={}",
            page.page, page.page_size
        );
        if let Some(search) = search {
            path.push_str(&format!("&q={}", urlencode(search)));
        }
        self.get_list(&path).await
    }
}

fn urlencode(value: &str) -> String {
    // Percent-encodes everything outside the unreserved set.
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
