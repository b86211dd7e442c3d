//! MCP resources: two static documentation guides and a templated provider
//! details resource. Reads go through the calling session's general HTTP
//! client; nothing is cached server-side.

use thiserror::Error;
use tracing::debug;

use crate::client::registry;
use crate::mcp::types::{ResourceDescriptor, ResourceTemplateDescriptor, TextResourceContents};
use crate::shared::utils;

/// Upstream mirror for the Terraform language documentation markdown.
const GUIDE_RAW_URL: &str =
    "https://raw.githubusercontent.com/hashicorp/web-unified-docs/main/content/terraform/v1.12.x/docs/language";

pub const STYLE_GUIDE_URI: &str = "/terraform/style-guide";
pub const MODULE_DEV_GUIDE_URI: &str = "/terraform/module-development";

/// `{namespace}`, `{name}` and `{version}` are filled by the client.
pub const PROVIDER_TEMPLATE_URI: &str =
    "registry://providers/{namespace}/name/{name}/version/{version}";

/// Documents stitched together for the module development guide, in order.
const MODULE_DEV_PAGES: &[&str] = &[
    "index",
    "composition",
    "structure",
    "providers",
    "publish",
    "refactoring",
];

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("unknown resource: {0}")]
    NotFound(String),

    #[error("fetching {context}: {message}")]
    Upstream { context: String, message: String },
}

/// Static resource descriptors, in advertisement order.
pub fn list_resources() -> Vec<ResourceDescriptor> {
    vec![
        ResourceDescriptor {
            uri: STYLE_GUIDE_URI.to_string(),
            name: "Terraform Style Guide".to_string(),
            description: Some("Terraform Style Guide".to_string()),
            mime_type: Some("text/markdown".to_string()),
        },
        ResourceDescriptor {
            uri: MODULE_DEV_GUIDE_URI.to_string(),
            name: "Terraform Module Development Guide".to_string(),
            description: Some("Terraform Module Development Guide".to_string()),
            mime_type: Some("text/markdown".to_string()),
        },
    ]
}

pub fn list_resource_templates() -> Vec<ResourceTemplateDescriptor> {
    vec![ResourceTemplateDescriptor {
        uri_template: PROVIDER_TEMPLATE_URI.to_string(),
        name: "Provider details".to_string(),
        description: Some("Describes details for a Terraform provider".to_string()),
        mime_type: Some("application/json".to_string()),
    }]
}

/// Resolves a `resources/read` URI against the static set, then the
/// template.
pub async fn read_resource(
    client: &reqwest::Client,
    uri: &str,
) -> Result<Vec<TextResourceContents>, ResourceError> {
    match uri {
        STYLE_GUIDE_URI => read_style_guide(client).await,
        MODULE_DEV_GUIDE_URI => read_module_dev_guide(client).await,
        _ if uri.starts_with(utils::PROVIDER_BASE_PATH) => read_provider_details(client, uri).await,
        _ => Err(ResourceError::NotFound(uri.to_string())),
    }
}

async fn fetch_markdown(
    client: &reqwest::Client,
    url: &str,
    context: &str,
) -> Result<String, ResourceError> {
    let upstream = |message: String| ResourceError::Upstream {
        context: context.to_string(),
        message,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| upstream(e.without_url().to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(upstream(format!("status: {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| upstream(e.without_url().to_string()))
}

async fn read_style_guide(
    client: &reqwest::Client,
) -> Result<Vec<TextResourceContents>, ResourceError> {
    let text = fetch_markdown(
        client,
        &format!("{GUIDE_RAW_URL}/style.mdx"),
        "Terraform Style Guide markdown",
    )
    .await?;
    Ok(vec![TextResourceContents {
        uri: STYLE_GUIDE_URI.to_string(),
        mime_type: "text/markdown".to_string(),
        text,
    }])
}

async fn read_module_dev_guide(
    client: &reqwest::Client,
) -> Result<Vec<TextResourceContents>, ResourceError> {
    let mut contents = Vec::with_capacity(MODULE_DEV_PAGES.len());
    for page in MODULE_DEV_PAGES {
        let text = fetch_markdown(
            client,
            &format!("{GUIDE_RAW_URL}/modules/develop/{page}.mdx"),
            &format!("{page} markdown"),
        )
        .await?;
        contents.push(TextResourceContents {
            uri: format!("{MODULE_DEV_GUIDE_URI}/{page}"),
            mime_type: "text/markdown".to_string(),
            text,
        });
    }
    Ok(contents)
}

/// Reads the templated provider resource. A missing, `latest` or non-semver
/// version slot resolves to the latest released version before fetching the
/// overview documentation.
async fn read_provider_details(
    client: &reqwest::Client,
    uri: &str,
) -> Result<Vec<TextResourceContents>, ResourceError> {
    let (namespace, name, version) =
        utils::extract_provider_name_and_version(uri).map_err(ResourceError::NotFound)?;
    debug!(namespace, name, version, "provider resource template read");

    let version = normalize_template_version(client, &namespace, &name, &version).await?;

    let version_id = registry::get_provider_version_id(client, &namespace, &name, &version)
        .await
        .map_err(|e| ResourceError::Upstream {
            context: format!("provider-version-id for {namespace}/{name}"),
            message: e.to_string(),
        })?;

    let docs = registry::get_provider_overview_docs(client, &version_id)
        .await
        .map_err(|e| ResourceError::Upstream {
            context: format!("provider overview docs for {namespace}/{name}"),
            message: e.to_string(),
        })?;

    Ok(vec![TextResourceContents {
        uri: format!("{}/{namespace}/name/{name}/version/{version}", utils::PROVIDER_BASE_PATH),
        mime_type: "text/markdown".to_string(),
        text: docs,
    }])
}

async fn normalize_template_version(
    client: &reqwest::Client,
    namespace: &str,
    name: &str,
    version: &str,
) -> Result<String, ResourceError> {
    if !version.is_empty() && version != "latest" && utils::is_valid_provider_version(version) {
        return Ok(version.to_string());
    }

    registry::get_latest_provider_version(client, namespace, name)
        .await
        .map_err(|e| ResourceError::Upstream {
            context: format!("{namespace}/{name} latest provider version"),
            message: e.to_string(),
        })
}
