//! Public Terraform Registry client.
//!
//! All calls go through the session's general HTTP client; this module never
//! owns a client of its own. Retries are delegated to the upstream service
//! (429 handling and the like live outside the core).

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::version;

pub const DEFAULT_PUBLIC_REGISTRY_URL: &str = "https://registry.terraform.io";

/// Upstream request timeout for per-session clients.
pub const UPSTREAM_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("registry returned status {status} for {uri}")]
    Status { status: u16, uri: String },

    #[error("JSON parsing failed: {0}")]
    Json(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(error: reqwest::Error) -> Self {
        // reqwest error displays never include request bodies or auth material.
        RegistryError::Http(error.without_url().to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(error: serde_json::Error) -> Self {
        RegistryError::Json(error.to_string())
    }
}

/// Builds the general-purpose HTTP client owned by a session.
pub fn build_http_client(skip_tls_verify: bool) -> Result<reqwest::Client, RegistryError> {
    reqwest::Client::builder()
        .user_agent(version::user_agent())
        .timeout(std::time::Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
        .danger_accept_invalid_certs(skip_tls_verify)
        .build()
        .map_err(RegistryError::from)
}

/// Issues one call against the public registry. `api_version` selects the
/// `v1` or `v2` API surface.
pub async fn send_registry_call(
    client: &reqwest::Client,
    method: reqwest::Method,
    uri: &str,
    api_version: &str,
) -> Result<Vec<u8>, RegistryError> {
    let url = format!("{DEFAULT_PUBLIC_REGISTRY_URL}/{api_version}/{uri}");
    debug!(%url, "registry request");

    let response = client.request(method, &url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::Status {
            status: status.as_u16(),
            uri: uri.to_string(),
        });
    }

    let body = response.bytes().await?;
    debug!(status = status.as_u16(), bytes = body.len(), "registry response");
    Ok(body.to_vec())
}

/// Walks a paginated v2 listing (`page[number]=N`) until an empty page.
pub async fn send_paginated_registry_call(
    client: &reqwest::Client,
    uri_prefix: &str,
) -> Result<Vec<ProviderDocData>, RegistryError> {
    let mut results = Vec::new();
    let mut page = 1u32;

    loop {
        let uri = format!("{uri_prefix}&page[number]={page}");
        let body = send_registry_call(client, reqwest::Method::GET, &uri, "v2").await?;

        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(default)]
            data: Vec<ProviderDocData>,
        }
        let wrapper: Wrapper = serde_json::from_slice(&body)?;
        if wrapper.data.is_empty() {
            break;
        }
        results.extend(wrapper.data);
        page += 1;
    }

    Ok(results)
}

// ---------------------------------------------------------------------------
// Wire types (fields default so partial registry answers still parse)
// ---------------------------------------------------------------------------

/// `GET /v1/providers/{namespace}/{name}` latest-version answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderVersionLatest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub downloads: i64,
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// One documentation index entry from `/v1/providers/.../{version}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderDoc {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderDocs {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub docs: Vec<ProviderDoc>,
}

/// JSON:API document entry from the v2 `provider-docs` listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderDocData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: ProviderDocAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderDocAttributes {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderVersionList {
    #[serde(default)]
    included: Vec<ProviderVersionIncluded>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderVersionIncluded {
    #[serde(default)]
    id: String,
    #[serde(default)]
    attributes: ProviderVersionAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderVersionAttributes {
    #[serde(default)]
    version: String,
}

/// `GET /v2/provider-docs/{id}` single-document answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderResourceDetails {
    #[serde(default)]
    pub data: ProviderResourceData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderResourceData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: ProviderResourceAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderResourceAttributes {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub content: String,
}

/// Module search/list answer from `/v1/modules`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformModules {
    #[serde(default)]
    pub modules: Vec<TerraformModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformModule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub downloads: i64,
    #[serde(default)]
    pub verified: bool,
}

/// Module version details from `/v1/modules/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformModuleVersionDetails {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub downloads: i64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub root: ModulePart,
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModulePart {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub inputs: Vec<ModuleInput>,
    #[serde(default)]
    pub outputs: Vec<ModuleOutput>,
    #[serde(default)]
    pub dependencies: Vec<Value>,
    #[serde(default)]
    pub resources: Vec<ModuleResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleOutput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub r#type: String,
}

// ---------------------------------------------------------------------------
// Calls shared by tools and the resource template
// ---------------------------------------------------------------------------

/// Resolves the latest released version of a provider.
pub async fn get_latest_provider_version(
    client: &reqwest::Client,
    namespace: &str,
    name: &str,
) -> Result<String, RegistryError> {
    let uri = format!("providers/{namespace}/{name}");
    let body = send_registry_call(client, reqwest::Method::GET, &uri, "v1").await?;
    let latest: ProviderVersionLatest = serde_json::from_slice(&body)?;
    debug!(version = %latest.version, "fetched latest provider version");
    Ok(latest.version)
}

/// Every provider version has a unique ID used to address its documentation
/// in the v2 API.
pub async fn get_provider_version_id(
    client: &reqwest::Client,
    namespace: &str,
    name: &str,
    version: &str,
) -> Result<String, RegistryError> {
    let uri = format!("providers/{namespace}/{name}?include=provider-versions");
    let body = send_registry_call(client, reqwest::Method::GET, &uri, "v2").await?;
    let list: ProviderVersionList = serde_json::from_slice(&body)?;

    list.included
        .into_iter()
        .find(|included| included.attributes.version == version)
        .map(|included| included.id)
        .ok_or_else(|| RegistryError::NotFound(format!("provider version {version} not found")))
}

/// Fetches the overview documentation pages for a provider version,
/// concatenated in registry order.
pub async fn get_provider_overview_docs(
    client: &reqwest::Client,
    provider_version_id: &str,
) -> Result<String, RegistryError> {
    let uri = format!(
        "provider-docs?filter[provider-version]={provider_version_id}&filter[category]=overview&filter[slug]=index"
    );
    let body = send_registry_call(client, reqwest::Method::GET, &uri, "v2").await?;

    #[derive(Deserialize)]
    struct Overview {
        #[serde(default)]
        data: Vec<ProviderDocData>,
    }
    let overview: Overview = serde_json::from_slice(&body)?;

    let mut content = String::new();
    for page in overview.data {
        content.push_str(&get_provider_resource_docs(client, &page.id).await?);
    }
    Ok(content)
}

/// Fetches the rendered content of one provider documentation page.
pub async fn get_provider_resource_docs(
    client: &reqwest::Client,
    doc_id: &str,
) -> Result<String, RegistryError> {
    let uri = format!("provider-docs/{doc_id}");
    let body = send_registry_call(client, reqwest::Method::GET, &uri, "v2").await?;
    let details: ProviderResourceDetails = serde_json::from_slice(&body)?;
    Ok(details.data.attributes.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_latest_provider_version_payload() {
        let body = r#"{"id":"hashicorp/aws","namespace":"hashicorp","name":"aws",
            "version":"5.31.0","downloads":12345,"versions":["5.30.0","5.31.0"]}"#;
        let latest: ProviderVersionLatest = serde_json::from_str(body).unwrap();
        assert_eq!(latest.version, "5.31.0");
        assert_eq!(latest.versions.len(), 2);
    }

    #[test]
    fn parses_module_listing_with_missing_fields() {
        let body = r#"{"modules":[{"id":"terraform-aws-modules/vpc/aws/5.0.0",
            "name":"vpc","downloads":9000,"verified":true}]}"#;
        let modules: TerraformModules = serde_json::from_str(body).unwrap();
        assert_eq!(modules.modules.len(), 1);
        assert_eq!(modules.modules[0].name, "vpc");
        assert!(modules.modules[0].description.is_empty());
    }

    #[test]
    fn parses_v2_doc_data() {
        let body = r#"{"id":"8862001","attributes":{"title":"aws_instance",
            "category":"resources","slug":"instance","language":"hcl"}}"#;
        let doc: ProviderDocData = serde_json::from_str(body).unwrap();
        assert_eq!(doc.id, "8862001");
        assert_eq!(doc.attributes.category, "resources");
    }

    #[test]
    fn build_http_client_succeeds_for_both_tls_modes() {
        assert!(build_http_client(false).is_ok());
        assert!(build_http_client(true).is_ok());
    }
}
