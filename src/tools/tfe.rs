//! Credentialed tools backed by the session's Terraform Cloud/Enterprise
//! client. Every handler here is registered behind the credential gate; the
//! availability diagnostic lives in `tools::dynamic`.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::client::tfe::{JsonApiResource, TfeClient};
use crate::mcp::types::{
    input_schema, CallToolResult, ToolAnnotations, ToolCategory, ToolDescriptor,
};
use crate::shared::utils::Pagination;
use crate::tools::dynamic::{ServerTool, ToolContext, ToolError, ToolHandler, TFE_UNAVAILABLE};

/// The full credentialed tool set, in advertisement order.
pub fn all() -> Vec<ServerTool> {
    vec![
        list_terraform_orgs(),
        list_terraform_projects(),
        list_workspaces(),
        get_workspace_details(),
        create_workspace(),
        update_workspace(),
        delete_workspace_safely(),
        search_private_providers(),
        search_private_modules(),
        list_runs(),
        create_run(),
        get_run_details(),
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

fn mutating(title: &str, destructive: bool) -> ToolAnnotations {
    ToolAnnotations {
        title: Some(title.to_string()),
        read_only_hint: Some(false),
        destructive_hint: Some(destructive),
        open_world_hint: Some(true),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidParams(format!("invalid input: {e}")))
}

fn require_tfe(ctx: &ToolContext) -> Result<std::sync::Arc<TfeClient>, CallToolResult> {
    ctx.tfe_client().ok_or_else(|| CallToolResult::error(TFE_UNAVAILABLE))
}

fn internal(context: &str, error: impl std::fmt::Display) -> ToolError {
    ToolError::Internal(format!("{context}: {error}"))
}

/// Renders JSON:API resources as pretty JSON with only the stable fields.
fn render_resources(resources: &[JsonApiResource]) -> String {
    let items: Vec<Value> = resources
        .iter()
        .map(|resource| {
            json!({
                "id": resource.id,
                "type": resource.resource_type,
                "attributes": resource.attributes,
            })
        })
        .collect();
    serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
}

fn render_resource(resource: &JsonApiResource) -> String {
    serde_json::to_string_pretty(&json!({
        "id": resource.id,
        "type": resource.resource_type,
        "attributes": resource.attributes,
    }))
    .unwrap_or_else(|_| "{}".to_string())
}

/// Optional pagination slice reused by the list-shaped TFE inputs.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct PaginationArgs {
    /// Page number to fetch (1-based)
    pub page_number: Option<u32>,
    /// Results per page (max 100)
    pub page_size: Option<u32>,
}

impl PaginationArgs {
    fn window(&self) -> Result<Pagination, ToolError> {
        Pagination::from_args(self.page_number, self.page_size).map_err(ToolError::InvalidParams)
    }
}

// ---------------------------------------------------------------------------
// organizations & projects
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListOrgsInput {
    #[serde(flatten)]
    pub pagination: PaginationArgs,
}

struct ListTerraformOrgs;

pub fn list_terraform_orgs() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "list_terraform_orgs".to_string(),
            description: "Fetches a list of all Terraform organizations.".to_string(),
            input_schema: input_schema::<ListOrgsInput>(),
            annotations: read_only("List all Terraform organizations"),
            category: ToolCategory::Credentialed,
        },
        ListTerraformOrgs,
    )
}

#[async_trait]
impl ToolHandler for ListTerraformOrgs {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: ListOrgsInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let orgs = tfe
            .list_organizations(input.pagination.window()?)
            .await
            .map_err(|e| internal("listing Terraform organizations", e))?;

        let names: Vec<&str> = orgs
            .iter()
            .filter_map(|org| org.attributes.get("name").and_then(Value::as_str))
            .collect();
        let rendered = serde_json::to_string(&names)
            .map_err(|e| internal("marshalling organization names", e))?;
        Ok(CallToolResult::success(rendered))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListProjectsInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    #[serde(flatten)]
    pub pagination: PaginationArgs,
}

struct ListTerraformProjects;

pub fn list_terraform_projects() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "list_terraform_projects".to_string(),
            description: "Fetches a list of all projects in a Terraform organization."
                .to_string(),
            input_schema: input_schema::<ListProjectsInput>(),
            annotations: read_only("List Terraform projects in an organization"),
            category: ToolCategory::Credentialed,
        },
        ListTerraformProjects,
    )
}

#[async_trait]
impl ToolHandler for ListTerraformProjects {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: ListProjectsInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let projects = tfe
            .list_projects(input.terraform_org_name.trim(), input.pagination.window()?)
            .await
            .map_err(|e| internal("listing Terraform projects", e))?;
        Ok(CallToolResult::success(render_resources(&projects)))
    }
}

// ---------------------------------------------------------------------------
// workspaces
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWorkspacesInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    /// Optional search query to filter workspaces by name
    pub search_query: Option<String>,
    /// Optional project ID to filter workspaces
    pub project_id: Option<String>,
    /// Optional comma-separated list of tags to filter workspaces
    pub tags: Option<String>,
    /// Optional comma-separated list of tags to exclude from results
    pub exclude_tags: Option<String>,
    /// Optional wildcard pattern to match workspace names
    pub wildcard_name: Option<String>,
    #[serde(flatten)]
    pub pagination: PaginationArgs,
}

struct ListWorkspaces;

pub fn list_workspaces() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "list_workspaces".to_string(),
            description: "Search and list Terraform workspaces within a specified organization. \
                Returns all workspaces when no filters are applied, or filters results based on \
                name patterns, tags, or search queries. Supports pagination for large result sets."
                .to_string(),
            input_schema: input_schema::<ListWorkspacesInput>(),
            annotations: read_only("List Terraform workspaces with queries"),
            category: ToolCategory::Credentialed,
        },
        ListWorkspaces,
    )
}

#[async_trait]
impl ToolHandler for ListWorkspaces {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: ListWorkspacesInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let workspaces = tfe
            .list_workspaces(
                input.terraform_org_name.trim(),
                input.search_query.as_deref(),
                input.project_id.as_deref(),
                input.tags.as_deref(),
                input.exclude_tags.as_deref(),
                input.wildcard_name.as_deref(),
                input.pagination.window()?,
            )
            .await
            .map_err(|e| internal("listing Terraform workspaces", e))?;
        Ok(CallToolResult::success(render_resources(&workspaces)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkspaceDetailsInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    /// The workspace name
    pub workspace_name: String,
}

struct GetWorkspaceDetails;

pub fn get_workspace_details() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_workspace_details".to_string(),
            description: "Fetches detailed information about a specific Terraform workspace."
                .to_string(),
            input_schema: input_schema::<WorkspaceDetailsInput>(),
            annotations: read_only("Get Terraform workspace details"),
            category: ToolCategory::Credentialed,
        },
        GetWorkspaceDetails,
    )
}

#[async_trait]
impl ToolHandler for GetWorkspaceDetails {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: WorkspaceDetailsInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let workspace = tfe
            .get_workspace(
                input.terraform_org_name.trim(),
                input.workspace_name.trim(),
            )
            .await
            .map_err(|e| internal("getting workspace details", e))?;
        Ok(CallToolResult::success(render_resource(&workspace)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateWorkspaceInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    /// Name for the new workspace
    pub workspace_name: String,
    /// Optional workspace description
    pub description: Option<String>,
    /// Optional Terraform version, e.g. "1.9.0"
    pub terraform_version: Option<String>,
    /// Optional working directory relative to the repository root
    pub working_directory: Option<String>,
    /// Whether runs auto-apply after a successful plan
    pub auto_apply: Option<bool>,
    /// Optional execution mode: "remote", "local" or "agent"
    pub execution_mode: Option<String>,
    /// Optional project ID to place the workspace in
    pub project_id: Option<String>,
}

struct CreateWorkspace;

pub fn create_workspace() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "create_workspace".to_string(),
            description: "Creates a new Terraform workspace in the given organization."
                .to_string(),
            input_schema: input_schema::<CreateWorkspaceInput>(),
            annotations: mutating("Create a Terraform workspace", false),
            category: ToolCategory::Credentialed,
        },
        CreateWorkspace,
    )
}

fn workspace_attributes(
    name: Option<&str>,
    description: Option<&str>,
    terraform_version: Option<&str>,
    working_directory: Option<&str>,
    auto_apply: Option<bool>,
    execution_mode: Option<&str>,
    project_id: Option<&str>,
) -> Value {
    let mut attributes = Map::new();
    if let Some(name) = name {
        attributes.insert("name".to_string(), json!(name));
    }
    if let Some(description) = description {
        attributes.insert("description".to_string(), json!(description));
    }
    if let Some(version) = terraform_version {
        attributes.insert("terraform-version".to_string(), json!(version));
    }
    if let Some(dir) = working_directory {
        attributes.insert("working-directory".to_string(), json!(dir));
    }
    if let Some(auto_apply) = auto_apply {
        attributes.insert("auto-apply".to_string(), json!(auto_apply));
    }
    if let Some(mode) = execution_mode {
        attributes.insert("execution-mode".to_string(), json!(mode));
    }
    if let Some(project_id) = project_id {
        attributes.insert("project-id".to_string(), json!(project_id));
    }
    Value::Object(attributes)
}

#[async_trait]
impl ToolHandler for CreateWorkspace {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: CreateWorkspaceInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let attributes = workspace_attributes(
            Some(input.workspace_name.trim()),
            input.description.as_deref(),
            input.terraform_version.as_deref(),
            input.working_directory.as_deref(),
            input.auto_apply,
            input.execution_mode.as_deref(),
            input.project_id.as_deref(),
        );

        let workspace = tfe
            .create_workspace(input.terraform_org_name.trim(), attributes)
            .await
            .map_err(|e| internal("creating Terraform workspace", e))?;
        Ok(CallToolResult::success(render_resource(&workspace)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateWorkspaceInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    /// Name of the workspace to update
    pub workspace_name: String,
    /// Optional new workspace name
    pub new_workspace_name: Option<String>,
    /// Optional new description
    pub description: Option<String>,
    /// Optional Terraform version
    pub terraform_version: Option<String>,
    /// Optional working directory
    pub working_directory: Option<String>,
    /// Whether runs auto-apply after a successful plan
    pub auto_apply: Option<bool>,
    /// Optional execution mode: "remote", "local" or "agent"
    pub execution_mode: Option<String>,
}

struct UpdateWorkspace;

pub fn update_workspace() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "update_workspace".to_string(),
            description: "Updates settings of an existing Terraform workspace.".to_string(),
            input_schema: input_schema::<UpdateWorkspaceInput>(),
            annotations: mutating("Update a Terraform workspace", false),
            category: ToolCategory::Credentialed,
        },
        UpdateWorkspace,
    )
}

#[async_trait]
impl ToolHandler for UpdateWorkspace {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: UpdateWorkspaceInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let attributes = workspace_attributes(
            input.new_workspace_name.as_deref(),
            input.description.as_deref(),
            input.terraform_version.as_deref(),
            input.working_directory.as_deref(),
            input.auto_apply,
            input.execution_mode.as_deref(),
            None,
        );

        let workspace = tfe
            .update_workspace(
                input.terraform_org_name.trim(),
                input.workspace_name.trim(),
                attributes,
            )
            .await
            .map_err(|e| internal("updating Terraform workspace", e))?;
        Ok(CallToolResult::success(render_resource(&workspace)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteWorkspaceInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    /// Name of the workspace to delete
    pub workspace_name: String,
}

struct DeleteWorkspaceSafely;

pub fn delete_workspace_safely() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "delete_workspace_safely".to_string(),
            description: "Deletes a Terraform workspace only if it is not managing any \
                resources. The request fails when the workspace still tracks infrastructure."
                .to_string(),
            input_schema: input_schema::<DeleteWorkspaceInput>(),
            annotations: mutating("Safely delete a Terraform workspace", true),
            category: ToolCategory::Credentialed,
        },
        DeleteWorkspaceSafely,
    )
}

#[async_trait]
impl ToolHandler for DeleteWorkspaceSafely {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: DeleteWorkspaceInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let org = input.terraform_org_name.trim();
        let workspace = input.workspace_name.trim();
        match tfe.safe_delete_workspace(org, workspace).await {
            Ok(()) => Ok(CallToolResult::success(format!(
                "Workspace {workspace} in organization {org} was deleted"
            ))),
            Err(e) => Ok(CallToolResult::error(format!(
                "deleting workspace {workspace}: {e}; the workspace may still be managing \
                 resources"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// private registry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchPrivateInput {
    /// The Terraform organization name
    pub terraform_org_name: String,
    /// Optional search query
    pub search_query: Option<String>,
    #[serde(flatten)]
    pub pagination: PaginationArgs,
}

struct SearchPrivateProviders;

pub fn search_private_providers() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "search_private_providers".to_string(),
            description: "Searches the organization's private registry for providers."
                .to_string(),
            input_schema: input_schema::<SearchPrivateInput>(),
            annotations: read_only("Search private Terraform providers"),
            category: ToolCategory::Credentialed,
        },
        SearchPrivateProviders,
    )
}

#[async_trait]
impl ToolHandler for SearchPrivateProviders {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: SearchPrivateInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let providers = tfe
            .list_registry_providers(
                input.terraform_org_name.trim(),
                input.search_query.as_deref(),
                input.pagination.window()?,
            )
            .await
            .map_err(|e| internal("searching private providers", e))?;
        Ok(CallToolResult::success(render_resources(&providers)))
    }
}

struct SearchPrivateModules;

pub fn search_private_modules() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "search_private_modules".to_string(),
            description: "Searches the organization's private registry for modules.".to_string(),
            input_schema: input_schema::<SearchPrivateInput>(),
            annotations: read_only("Search private Terraform modules"),
            category: ToolCategory::Credentialed,
        },
        SearchPrivateModules,
    )
}

#[async_trait]
impl ToolHandler for SearchPrivateModules {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: SearchPrivateInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let modules = tfe
            .list_registry_modules(
                input.terraform_org_name.trim(),
                input.search_query.as_deref(),
                input.pagination.window()?,
            )
            .await
            .map_err(|e| internal("searching private modules", e))?;
        Ok(CallToolResult::success(render_resources(&modules)))
    }
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListRunsInput {
    /// The workspace ID (e.g. "ws-abc123") whose runs to list
    pub workspace_id: String,
    #[serde(flatten)]
    pub pagination: PaginationArgs,
}

struct ListRuns;

pub fn list_runs() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "list_runs".to_string(),
            description: "Lists runs for a Terraform workspace, most recent first.".to_string(),
            input_schema: input_schema::<ListRunsInput>(),
            annotations: read_only("List Terraform runs in a workspace"),
            category: ToolCategory::Credentialed,
        },
        ListRuns,
    )
}

#[async_trait]
impl ToolHandler for ListRuns {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: ListRunsInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let runs = tfe
            .list_runs(input.workspace_id.trim(), input.pagination.window()?)
            .await
            .map_err(|e| internal("listing Terraform runs", e))?;
        Ok(CallToolResult::success(render_resources(&runs)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRunInput {
    /// The workspace ID (e.g. "ws-abc123") to run in
    pub workspace_id: String,
    /// Run type: "plan_and_apply" (default) or "plan_only"
    pub run_type: Option<String>,
    /// Message attached to the run
    pub message: Option<String>,
}

struct CreateRun;

pub fn create_run() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "create_run".to_string(),
            description: "Creates a new Terraform run (plan, and optionally apply) in a \
                workspace."
                .to_string(),
            input_schema: input_schema::<CreateRunInput>(),
            annotations: mutating("Create a Terraform run", true),
            category: ToolCategory::Credentialed,
        },
        CreateRun,
    )
}

#[async_trait]
impl ToolHandler for CreateRun {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: CreateRunInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let run_type = input.run_type.as_deref().unwrap_or("plan_and_apply");
        let plan_only = match run_type {
            "plan_only" => true,
            "plan_and_apply" => false,
            other => {
                return Err(ToolError::InvalidParams(format!(
                    "run_type must be 'plan_and_apply' or 'plan_only', got '{other}'"
                )))
            }
        };
        let message = input
            .message
            .as_deref()
            .unwrap_or("Triggered via Terraform MCP Server");

        let run = tfe
            .create_run(input.workspace_id.trim(), message, plan_only)
            .await
            .map_err(|e| internal("creating Terraform run", e))?;
        Ok(CallToolResult::success(render_resource(&run)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunDetailsInput {
    /// The run ID (e.g. "run-abc123")
    pub run_id: String,
}

struct GetRunDetails;

pub fn get_run_details() -> ServerTool {
    ServerTool::new(
        ToolDescriptor {
            name: "get_run_details".to_string(),
            description: "Fetches the status and details of a specific Terraform run."
                .to_string(),
            input_schema: input_schema::<RunDetailsInput>(),
            annotations: read_only("Get Terraform run details"),
            category: ToolCategory::Credentialed,
        },
        GetRunDetails,
    )
}

#[async_trait]
impl ToolHandler for GetRunDetails {
    async fn call(&self, ctx: ToolContext, args: Value) -> Result<CallToolResult, ToolError> {
        let input: RunDetailsInput = parse_args(args)?;
        let tfe = match require_tfe(&ctx) {
            Ok(tfe) => tfe,
            Err(result) => return Ok(result),
        };

        let run = tfe
            .get_run(input.run_id.trim())
            .await
            .map_err(|e| internal("getting Terraform run details", e))?;
        Ok(CallToolResult::success(render_resource(&run)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tools_are_credentialed_and_unique() {
        let tools = all();
        assert_eq!(tools.len(), 12);

        let mut names: Vec<&str> = tools
            .iter()
            .map(|t| t.descriptor.name.as_str())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 12);

        for tool in &tools {
            assert_eq!(tool.descriptor.category, ToolCategory::Credentialed);
            assert!(tool.descriptor.annotations.title.is_some());
        }
    }

    #[test]
    fn destructive_hints_cover_delete_and_run_creation() {
        let tools = all();
        let destructive: Vec<&str> = tools
            .iter()
            .filter(|t| t.descriptor.annotations.destructive_hint == Some(true))
            .map(|t| t.descriptor.name.as_str())
            .collect();
        assert_eq!(destructive, vec!["delete_workspace_safely", "create_run"]);
    }

    #[test]
    fn workspace_attributes_skip_absent_fields() {
        let attributes = workspace_attributes(
            Some("prod"),
            None,
            Some("1.9.0"),
            None,
            Some(true),
            None,
            None,
        );
        assert_eq!(attributes["name"], "prod");
        assert_eq!(attributes["terraform-version"], "1.9.0");
        assert_eq!(attributes["auto-apply"], true);
        assert!(attributes.get("description").is_none());
        assert!(attributes.get("execution-mode").is_none());
    }

    #[test]
    fn pagination_args_flatten_into_window() {
        let input: ListRunsInput = serde_json::from_value(serde_json::json!({
            "workspace_id": "ws-1",
            "page_number": 2,
            "page_size": 5
        }))
        .unwrap();
        let window = input.pagination.window().unwrap();
        assert_eq!(window.page, 2);
        assert_eq!(window.page_size, 5);
    }

    #[test]
    fn render_resources_is_stable_json() {
        let resources = vec![JsonApiResource {
            id: "ws-1".to_string(),
            resource_type: "workspaces".to_string(),
            attributes: serde_json::json!({"name": "prod"}),
        }];
        let rendered = render_resources(&resources);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed[0]["id"], "ws-1");
        assert_eq!(parsed[0]["attributes"]["name"], "prod");
    }
}
