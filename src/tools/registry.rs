//! Always-available tools backed by the public Terraform Registry.
//!
//! These run through the calling session's general HTTP client and need no
//! credentials. Output is Markdown aimed at a model: each list entry names
//! the identifier the follow-up tool expects.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::client::registry::{
    self, ProviderDocs, TerraformModuleVersionDetails, TerraformModules,
};
use crate::mcp::types::{
    input_schema, CallToolResult, ToolAnnotations, ToolCategory, ToolDescriptor,
};
use crate::shared::utils;
use crate::tools::dynamic::{ServerTool, ToolContext, ToolError, ToolHandler};

const MODULE_BASE_PATH: &str = "registry://modules";

/// Hint appended to lookup failures that are usually model hallucinations.
const NAMESPACE_GUIDE: &str = "please check the provider name, provider namespace or the provider \
     version you're looking for, perhaps the provider is published under a different namespace or \
     company name";

/// The full always-available tool set, in advertisement order.
pub fn all() -> Vec<ServerTool> {
    vec![
        search_providers(),
        get_provider_details(),
        get_latest_provider_version(),
        search_modules(),
        get_module_details(),
        get_latest_module_version(),
        search_policies(),
        get_policy_details(),
    ]
}

fn read_only(title: &str) -> ToolAnnotations {
    ToolAnnotations {
        title: Some(title.to_string()),
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        open_world_hint: Some(true),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidParams(format!("invalid input: {e}")))
}

// ---------------------------------------------------------------------------
// search_providers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchProvidersInput {
    /// The name of the Terraform provider to perform the read or deployment operation
    pub provider_name: String,
    /// The publisher of the provider, typically the company or GitHub organization that created it
    pub provider_namespace: Option<String>,
    /// The slug of the service you want to deploy or read; use a single word, underscores for multiple words
    pub service_slug: String,
    /// One of "resources", "data-sources", "functions", "guides", "overview"
    pub provider_data_type: Option<String>,
    /// Provider version in 'x.y.z' form, or 'latest'
    pub provider_version: Option<String>,
}

struct SearchProviders;

pub fn search_providers() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "search_providers".to_string(),
            description: "Retrieves a list of potential provider documents based on the \
                service_slug and provider_data_type provided. You MUST call this function before \
                'get_provider_details' to obtain a valid tfprovider-compatible provider_doc_id. \
                Use the most relevant single word as the search query for service_slug; if unsure, \
                use the provider_name for its value. When selecting the best match consider title \
                similarity to the query and category relevance. Return the selected \
                provider_doc_id and explain your choice."
                .to_string(),
            input_schema: input_schema::<SearchProvidersInput>(),
            annotations: read_only(
                "Identify the most relevant provider document ID for a Terraform service",
            ),
            category: ToolCategory::Always,
        },
        SearchProviders,
    )
}

/// Resolved provider coordinates used by the documentation lookups.
struct ProviderCoordinates {
    namespace: String,
    name: String,
    version: String,
}

async fn resolve_provider(
    client: &reqwest::Client,
    input: &SearchProvidersInput,
) -> Result<ProviderCoordinates, ToolError> {
    let name = input.provider_name.to_lowercase();
    if name.is_empty() {
        return Err(ToolError::InvalidParams(
            "required input: provider_name is required".to_string(),
        ));
    }

    let mut namespace = input
        .provider_namespace
        .as_deref()
        .unwrap_or("hashicorp")
        .to_lowercase();
    if namespace.is_empty() {
        namespace = "hashicorp".to_string();
    }

    let requested_version = input
        .provider_version
        .as_deref()
        .unwrap_or("latest")
        .to_lowercase();

    let mut version = if utils::is_valid_provider_version(&requested_version) {
        requested_version.clone()
    } else {
        registry::get_latest_provider_version(client, &namespace, &name)
            .await
            .unwrap_or_default()
    };

    // A provider that does not resolve in the requested namespace is often
    // published under hashicorp; try that before giving up.
    if version.is_empty() {
        version = registry::get_latest_provider_version(client, "hashicorp", &name)
            .await
            .map_err(|_| {
                ToolError::InvalidParams(format!(
                    "getting the \"{name}\" provider, with version \"{requested_version}\" in \
                     the \"{namespace}\" namespace, {NAMESPACE_GUIDE}"
                ))
            })?;
        namespace = "hashicorp".to_string();
    }

    Ok(ProviderCoordinates {
        namespace,
        name,
        version,
    })
}

/// Pulls the `description: |-` block out of rendered provider doc content.
fn description_snippet(content: &str) -> String {
    const MARKER: &str = "description: |-";
    let Some(start) = content.find(MARKER) else {
        return String::new();
    };
    let after = &content[start + MARKER.len()..];
    let block = match after.find("\n---") {
        Some(end) => &after[..end],
        None => after,
    };
    let mut snippet = block.trim().replace('\n', " ");
    if snippet.len() > 300 {
        let mut cut = 300;
        while !snippet.is_char_boundary(cut) {
            cut -= 1;
        }
        snippet.truncate(cut);
        snippet.push_str("...");
    }
    snippet
}

fn doc_list_header(data_type: &str, coordinates: &ProviderCoordinates) -> String {
    format!(
        "Available Documentation (top matches) for {data_type} in Terraform provider \
         {}/{} version: {}\n\nEach result includes:\n\
         - providerDocID: tfprovider-compatible identifier\n\
         - Title: Service or resource name\n\
         - Category: Type of document\n\
         - Description: Brief summary of the document\n\
         For best results, select libraries based on the service_slug match and category of \
         information requested.\n\n---\n\n",
        coordinates.namespace, coordinates.name, coordinates.version
    )
}

#[async_trait]
impl ToolHandler for SearchProviders {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: SearchProvidersInput = parse_args(args)?;
        let client = ctx.http_client()?;

        let coordinates = resolve_provider(&client, &input).await?;
        let service_slug = input.service_slug.to_lowercase();
        if service_slug.is_empty() {
            return Err(ToolError::InvalidParams(
                "required input: service_slug cannot be empty".to_string(),
            ));
        }

        let data_type = input
            .provider_data_type
            .as_deref()
            .filter(|t| utils::is_valid_provider_data_type(t))
            .unwrap_or("resources")
            .to_string();

        // guides/functions/overview only exist in the v2 API.
        if utils::is_v2_provider_data_type(&data_type) {
            let content = provider_docs_v2(&client, &coordinates, &data_type)
                .await
                .map_err(|e| {
                    ToolError::Internal(format!(
                        "finding {data_type} documentation for provider '{}' in the '{}' \
                         namespace, {NAMESPACE_GUIDE}: {e}",
                        coordinates.name, coordinates.namespace
                    ))
                })?;
            return Ok(CallToolResult::success(format!(
                "# {} provider docs\n\n{content}",
                coordinates.name
            )));
        }

        let uri = format!(
            "providers/{}/{}/{}",
            coordinates.namespace, coordinates.name, coordinates.version
        );
        let body = registry::send_registry_call(&client, reqwest::Method::GET, &uri, "v1")
            .await
            .map_err(|_| {
                ToolError::Internal(format!(
                    "getting the \"{}\" provider, with version \"{}\" in the {} namespace, \
                     {NAMESPACE_GUIDE}",
                    coordinates.name, coordinates.version, coordinates.namespace
                ))
            })?;
        let docs: ProviderDocs = serde_json::from_slice(&body)
            .map_err(|e| ToolError::Internal(format!("unmarshalling provider docs: {e}")))?;

        let mut out = doc_list_header(&data_type, &coordinates);
        let mut found = false;
        for doc in &docs.docs {
            if doc.language != "hcl" || doc.category != data_type {
                continue;
            }
            let prefixed = format!("{}_{}", coordinates.name, doc.slug);
            if !doc.slug.contains(&service_slug) && !prefixed.contains(&service_slug) {
                continue;
            }
            found = true;
            let snippet = match registry::get_provider_resource_docs(&client, &doc.id).await {
                Ok(content) => description_snippet(&content),
                Err(e) => {
                    warn!(doc_id = %doc.id, error = %e, "error fetching content snippet");
                    String::new()
                }
            };
            out.push_str(&format!(
                "- providerDocID: {}\n- Title: {}\n- Category: {}\n- Description: {}\n---\n",
                doc.id, doc.title, doc.category, snippet
            ));
        }

        if !found {
            return Err(ToolError::Internal(format!(
                "finding documentation for service_slug {service_slug}, provide a more relevant \
                 service_slug if unsure, use the provider_name for its value"
            )));
        }
        Ok(CallToolResult::success(out))
    }
}

async fn provider_docs_v2(
    client: &reqwest::Client,
    coordinates: &ProviderCoordinates,
    category: &str,
) -> Result<String, ToolError> {
    let version_id = registry::get_provider_version_id(
        client,
        &coordinates.namespace,
        &coordinates.name,
        &coordinates.version,
    )
    .await
    .map_err(|e| ToolError::Internal(format!("getting provider version ID: {e}")))?;

    if category == "overview" {
        return registry::get_provider_overview_docs(client, &version_id)
            .await
            .map_err(|e| ToolError::Internal(format!("getting provider overview docs: {e}")));
    }

    let uri_prefix = format!(
        "provider-docs?filter[provider-version]={version_id}&filter[category]={category}&filter[language]=hcl"
    );
    let docs = registry::send_paginated_registry_call(client, &uri_prefix)
        .await
        .map_err(|e| ToolError::Internal(format!("getting provider documentation: {e}")))?;
    if docs.is_empty() {
        return Err(ToolError::Internal(format!(
            "no {category} documentation found for provider version {version_id}"
        )));
    }

    let mut out = doc_list_header(category, coordinates);
    for doc in docs {
        let snippet = match registry::get_provider_resource_docs(client, &doc.id).await {
            Ok(content) => description_snippet(&content),
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "error fetching content snippet");
                String::new()
            }
        };
        out.push_str(&format!(
            "- providerDocID: {}\n- Title: {}\n- Category: {}\n- Description: {}\n---\n",
            doc.id, doc.attributes.title, doc.attributes.category, snippet
        ));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// get_provider_details
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetProviderDetailsInput {
    /// Exact tfprovider-compatible provider_doc_id retrieved from 'search_providers'
    pub provider_doc_id: String,
}

struct GetProviderDetails;

pub fn get_provider_details() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_provider_details".to_string(),
            description: "Fetches up-to-date documentation for a specific service from a \
                Terraform provider. You must call 'search_providers' first to obtain the exact \
                tfprovider-compatible provider_doc_id required to use this tool."
                .to_string(),
            input_schema: input_schema::<GetProviderDetailsInput>(),
            annotations: read_only(
                "Fetch detailed Terraform provider documentation using a document ID",
            ),
            category: ToolCategory::Always,
        },
        GetProviderDetails,
    )
}

#[async_trait]
impl ToolHandler for GetProviderDetails {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: GetProviderDetailsInput = parse_args(args)?;
        if input.provider_doc_id.parse::<u64>().is_err() {
            return Err(ToolError::InvalidParams(
                "required input: provider_doc_id must be a valid number".to_string(),
            ));
        }

        let client = ctx.http_client()?;
        let content = registry::get_provider_resource_docs(&client, &input.provider_doc_id)
            .await
            .map_err(|e| {
                ToolError::Internal(format!(
                    "fetching provider-docs/{}, please make sure provider_doc_id is valid and \
                     the search_providers tool has run prior: {e}",
                    input.provider_doc_id
                ))
            })?;
        Ok(CallToolResult::success(content))
    }
}

// ---------------------------------------------------------------------------
// get_latest_provider_version
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LatestProviderVersionInput {
    /// Name of the provider, e.g. "aws"
    pub provider_name: String,
    /// Provider namespace; defaults to "hashicorp"
    pub provider_namespace: Option<String>,
}

struct GetLatestProviderVersion;

pub fn get_latest_provider_version() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_latest_provider_version".to_string(),
            description: "Fetches the latest released version of a Terraform provider from the \
                public registry."
                .to_string(),
            input_schema: input_schema::<LatestProviderVersionInput>(),
            annotations: read_only("Get the latest Terraform provider version"),
            category: ToolCategory::Always,
        },
        GetLatestProviderVersion,
    )
}

#[async_trait]
impl ToolHandler for GetLatestProviderVersion {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: LatestProviderVersionInput = parse_args(args)?;
        let namespace = input
            .provider_namespace
            .as_deref()
            .unwrap_or("hashicorp")
            .to_lowercase();
        let name = input.provider_name.to_lowercase();

        let client = ctx.http_client()?;
        let version = registry::get_latest_provider_version(&client, &namespace, &name)
            .await
            .map_err(|e| {
                ToolError::Internal(format!(
                    "getting the latest version of the \"{namespace}/{name}\" provider, \
                     {NAMESPACE_GUIDE}: {e}"
                ))
            })?;
        Ok(CallToolResult::success(format!(
            "The latest version of the {namespace}/{name} provider is {version}"
        )))
    }
}

// ---------------------------------------------------------------------------
// search_modules
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchModulesInput {
    /// The query to search for Terraform modules
    pub module_query: String,
    /// Current offset for pagination
    pub current_offset: Option<u32>,
}

struct SearchModules;

pub fn search_modules() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "search_modules".to_string(),
            description: "Resolves a Terraform module name to obtain a compatible module_id for \
                the get_module_details tool and returns a list of matching Terraform modules. You \
                MUST call this function before 'get_module_details' to obtain a valid and \
                compatible module_id. When selecting the best match, consider name similarity to \
                the query, description relevance, verification status and download counts. Return \
                the selected module_id and explain your choice. If no modules were found, \
                reattempt the search with a new module_query."
                .to_string(),
            input_schema: input_schema::<SearchModulesInput>(),
            annotations: read_only(
                "Search and match Terraform modules based on name and relevance",
            ),
            category: ToolCategory::Always,
        },
        SearchModules,
    )
}

#[async_trait]
impl ToolHandler for SearchModules {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: SearchModulesInput = parse_args(args)?;
        let query = input.module_query.to_lowercase();
        let offset = input.current_offset.unwrap_or(0);

        let uri = if query.is_empty() {
            format!("modules?offset={offset}")
        } else {
            format!("modules/search?q='{}'&offset={offset}", urlescape(&query))
        };

        let client = ctx.http_client()?;
        let body = registry::send_registry_call(&client, reqwest::Method::GET, &uri, "v1")
            .await
            .map_err(|e| {
                ToolError::Internal(format!(
                    "finding module(s): none found for module_query: {query}: {e}"
                ))
            })?;

        let mut modules: TerraformModules = serde_json::from_slice(&body)
            .map_err(|e| ToolError::Internal(format!("unmarshalling modules: {e}")))?;
        if modules.modules.is_empty() {
            return Err(ToolError::Internal(format!(
                "no modules found for query: {query}"
            )));
        }
        modules.modules.sort_by(|a, b| b.downloads.cmp(&a.downloads));

        let mut out = format!(
            "Available Terraform Modules (top matches) for {query}\n\n Each result includes:\n\
             - module_id: The module ID (format: namespace/name/provider-name/module-version)\n\
             - Name: The name of the module\n\
             - Description: A short description of the module\n\
             - Downloads: The total number of times the module has been downloaded\n\
             - Verified: Verification status of the module\n\
             - Published: The date and time when the module was published\n\n\n---\n\n"
        );
        for module in &modules.modules {
            out.push_str(&format!(
                "- module_id: {}\n- Name: {}\n- Description: {}\n- Downloads: {}\n\
                 - Verified: {}\n- Published: {}\n---\n\n",
                module.id,
                module.name,
                module.description,
                module.downloads,
                module.verified,
                module.published_at
            ));
        }
        Ok(CallToolResult::success(out))
    }
}

// ---------------------------------------------------------------------------
// get_module_details
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetModuleDetailsInput {
    /// Exact module_id retrieved from search_modules, e.g. "terraform-aws-modules/vpc/aws/5.5.0"
    pub module_id: String,
}

struct GetModuleDetails;

pub fn get_module_details() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_module_details".to_string(),
            description: "Fetches up-to-date documentation on how to use a Terraform module. You \
                must call 'search_modules' first to obtain the exact valid and compatible \
                module_id required to use this tool."
                .to_string(),
            input_schema: input_schema::<GetModuleDetailsInput>(),
            annotations: read_only("Retrieve documentation for a specific Terraform module"),
            category: ToolCategory::Always,
        },
        GetModuleDetails,
    )
}

fn render_module_details(module: &TerraformModuleVersionDetails) -> String {
    let mut out = format!(
        "# {MODULE_BASE_PATH}/{}/{}\n\n**Description:** {}\n\n**Module Version:** {}\n\n\
         **Namespace:** {}\n\n**Source:** {}\n\n",
        module.namespace, module.name, module.description, module.version, module.namespace,
        module.source
    );

    if !module.root.inputs.is_empty() {
        out.push_str("### Inputs\n\n| Name | Type | Description | Default | Required |\n|---|---|---|---|---|\n");
        for input in &module.root.inputs {
            out.push_str(&format!(
                "| {} | {} | {} | `{}` | {} |\n",
                input.name, input.r#type, input.description, input.default, input.required
            ));
        }
        out.push('\n');
    }

    if !module.root.outputs.is_empty() {
        out.push_str("### Outputs\n\n| Name | Description |\n|---|---|\n");
        for output in &module.root.outputs {
            out.push_str(&format!("| {} | {} |\n", output.name, output.description));
        }
        out.push('\n');
    }

    if !module.root.readme.is_empty() {
        out.push_str("### Readme\n\n");
        out.push_str(&utils::extract_readme(&module.root.readme));
        out.push('\n');
    }

    out
}

#[async_trait]
impl ToolHandler for GetModuleDetails {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: GetModuleDetailsInput = parse_args(args)?;
        let module_id = input.module_id.to_lowercase();

        let client = ctx.http_client()?;
        let uri = format!("modules/{module_id}?offset=0");
        let body = registry::send_registry_call(&client, reqwest::Method::GET, &uri, "v1")
            .await
            .map_err(|_| {
                ToolError::Internal(format!(
                    "getting module(s), none found! module_id: {module_id}"
                ))
            })?;

        let module: TerraformModuleVersionDetails = serde_json::from_slice(&body)
            .map_err(|e| ToolError::Internal(format!("unmarshalling module details: {e}")))?;
        Ok(CallToolResult::success(render_module_details(&module)))
    }
}

// ---------------------------------------------------------------------------
// get_latest_module_version
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LatestModuleVersionInput {
    /// Module namespace, e.g. "terraform-aws-modules"
    pub module_namespace: String,
    /// Module name, e.g. "vpc"
    pub module_name: String,
    /// Target provider of the module, e.g. "aws"
    pub module_provider: String,
}

struct GetLatestModuleVersion;

pub fn get_latest_module_version() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_latest_module_version".to_string(),
            description: "Fetches the latest published version of a Terraform module from the \
                public registry."
                .to_string(),
            input_schema: input_schema::<LatestModuleVersionInput>(),
            annotations: read_only("Get the latest Terraform module version"),
            category: ToolCategory::Always,
        },
        GetLatestModuleVersion,
    )
}

#[async_trait]
impl ToolHandler for GetLatestModuleVersion {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: LatestModuleVersionInput = parse_args(args)?;
        let module_id = format!(
            "{}/{}/{}",
            input.module_namespace.to_lowercase(),
            input.module_name.to_lowercase(),
            input.module_provider.to_lowercase()
        );

        let client = ctx.http_client()?;
        let body = registry::send_registry_call(
            &client,
            reqwest::Method::GET,
            &format!("modules/{module_id}"),
            "v1",
        )
        .await
        .map_err(|e| {
            ToolError::Internal(format!("getting latest version for module {module_id}: {e}"))
        })?;

        #[derive(Deserialize)]
        struct ModuleVersion {
            #[serde(default)]
            version: String,
        }
        let module: ModuleVersion = serde_json::from_slice(&body)
            .map_err(|e| ToolError::Internal(format!("unmarshalling module version: {e}")))?;
        Ok(CallToolResult::success(format!(
            "The latest version of module {module_id} is {}",
            module.version
        )))
    }
}

// ---------------------------------------------------------------------------
// search_policies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchPoliciesInput {
    /// The query to search for Terraform policies
    pub policy_query: String,
}

struct SearchPolicies;

pub fn search_policies() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "search_policies".to_string(),
            description: "Searches for Terraform policies based on a query string and returns a \
                list of matching policies. You MUST call this function before \
                'get_policy_details' to obtain a valid terraform_policy_id. When selecting the \
                best match consider name similarity, title relevance and download counts. If no \
                policies were found, reattempt the search with a new policy_query."
                .to_string(),
            input_schema: input_schema::<SearchPoliciesInput>(),
            annotations: read_only(
                "Search and match Terraform policies based on name and relevance",
            ),
            category: ToolCategory::Always,
        },
        SearchPolicies,
    )
}

#[derive(Debug, Default, Deserialize)]
struct PolicyListDocument {
    #[serde(default)]
    data: Vec<PolicyListEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyListEntry {
    #[serde(default)]
    attributes: PolicyListAttributes,
    #[serde(default)]
    relationships: PolicyRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyListAttributes {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    downloads: i64,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyRelationships {
    #[serde(default, rename = "latest-version")]
    latest_version: PolicyLatestVersion,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyLatestVersion {
    #[serde(default)]
    links: PolicyLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyLinks {
    #[serde(default)]
    related: String,
}

#[async_trait]
impl ToolHandler for SearchPolicies {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: SearchPoliciesInput = parse_args(args)?;
        let query = input.policy_query.to_lowercase();
        if query.is_empty() {
            return Err(ToolError::InvalidParams(
                "required input: policy_query cannot be empty".to_string(),
            ));
        }

        let client = ctx.http_client()?;
        let body = registry::send_registry_call(
            &client,
            reqwest::Method::GET,
            "policies?include=latest-version&page%5Bsize%5D=100",
            "v2",
        )
        .await
        .map_err(|e| {
            ToolError::Internal(format!(
                "fetching policies: registry API did not return a successful response: {e}"
            ))
        })?;

        let policies: PolicyListDocument = serde_json::from_slice(&body)
            .map_err(|e| ToolError::Internal(format!("unmarshalling policy list: {e}")))?;

        let mut out = format!(
            "Matching Terraform Policies for query: {query}\n\nEach result includes:\n\
             - terraform_policy_id: Unique identifier to be used with get_policy_details tool\n\
             - Name: Policy name\n- Title: Policy description\n- Downloads: Policy downloads\n---\n\n"
        );
        let mut found = false;
        for policy in &policies.data {
            let name = policy.attributes.name.to_lowercase();
            let title = policy.attributes.title.to_lowercase();
            if !name.contains(&query) && !title.contains(&query) {
                continue;
            }
            found = true;
            let policy_id = policy
                .relationships
                .latest_version
                .links
                .related
                .replace("/v2/", "");
            out.push_str(&format!(
                "- terraform_policy_id: {policy_id}\n- Name: {}\n- Title: {}\n- Downloads: {}\n---\n",
                policy.attributes.name, policy.attributes.title, policy.attributes.downloads
            ));
        }

        if !found {
            return Err(ToolError::Internal(format!(
                "finding policies, none found matching the query: {query}. Try a different \
                 policy_query."
            )));
        }
        Ok(CallToolResult::success(out))
    }
}

// ---------------------------------------------------------------------------
// get_policy_details
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPolicyDetailsInput {
    /// Matching terraform_policy_id retrieved from 'search_policies'
    pub terraform_policy_id: String,
}

struct GetPolicyDetails;

pub fn get_policy_details() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_policy_details".to_string(),
            description: "Fetches up-to-date documentation for a specific policy from the \
                Terraform registry. You must call 'search_policies' first to obtain the exact \
                terraform_policy_id required to use this tool."
                .to_string(),
            input_schema: input_schema::<GetPolicyDetailsInput>(),
            annotations: read_only(
                "Fetch detailed Terraform policy documentation using a terraform_policy_id",
            ),
            category: ToolCategory::Always,
        },
        GetPolicyDetails,
    )
}

#[derive(Debug, Default, Deserialize)]
struct PolicyDetailsDocument {
    #[serde(default)]
    data: PolicyDetailsData,
    #[serde(default)]
    included: Vec<PolicyIncluded>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyDetailsData {
    #[serde(default)]
    attributes: PolicyDetailsAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyDetailsAttributes {
    #[serde(default)]
    readme: String,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyIncluded {
    #[serde(default, rename = "type")]
    included_type: String,
    #[serde(default)]
    attributes: PolicyIncludedAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyIncludedAttributes {
    #[serde(default)]
    name: String,
    #[serde(default)]
    shasum: String,
}

#[async_trait]
impl ToolHandler for GetPolicyDetails {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: GetPolicyDetailsInput = parse_args(args)?;
        let policy_id = input.terraform_policy_id;

        let client = ctx.http_client()?;
        let uri = format!("{policy_id}?include=policies%2Cpolicy-modules%2Cpolicy-library");
        let body = registry::send_registry_call(&client, reqwest::Method::GET, &uri, "v2")
            .await
            .map_err(|e| {
                ToolError::Internal(format!(
                    "fetching policy details: registry API did not return a successful \
                     response: {e}"
                ))
            })?;

        let details: PolicyDetailsDocument = serde_json::from_slice(&body).map_err(|e| {
            ToolError::Internal(format!("unmarshalling policy details for {policy_id}: {e}"))
        })?;

        let readme = utils::extract_readme(&details.data.attributes.readme);
        let mut out = format!("## Policy details about {policy_id}\n\n{readme}\n---\n## Usage\n\n");
        out.push_str(
            "Generate the content for a HashiCorp Configuration Language (HCL) file named \
             policies.hcl. For each policy listed below, create a distinct policy block using \
             this template.\n\n```hcl\n",
        );

        for module in details
            .included
            .iter()
            .filter(|i| i.included_type == "policy-modules")
        {
            out.push_str(&format!(
                "module \"{name}\" {{\n  source = \"https://registry.terraform.io/v2{policy_id}/policy-module/{name}.sentinel?checksum=sha256:{shasum}\"\n}}\n\n",
                name = module.attributes.name,
                shasum = module.attributes.shasum,
            ));
        }
        out.push_str(&format!(
            "policy \"<<POLICY_NAME>>\" {{\n  source = \"https://registry.terraform.io/v2{policy_id}/policy/<<POLICY_NAME>>.sentinel?checksum=<<POLICY_CHECKSUM>>\"\n  enforcement_level = \"advisory\"\n}}\n```\n",
        ));

        out.push_str(&format!(
            "Available policies with SHA for {policy_id} are: \n\n"
        ));
        for policy in details
            .included
            .iter()
            .filter(|i| i.included_type == "policies")
        {
            out.push_str(&format!(
                "- POLICY_NAME: {}\n- POLICY_CHECKSUM: sha256:{}\n\n---\n",
                policy.attributes.name, policy.attributes.shasum
            ));
        }

        Ok(CallToolResult::success(out))
    }
}

fn urlescape(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace(' ', "%20")
        .replace('&', "%26")
        .replace('?', "%3F")
        .replace('#', "%23")
}
