//! Per-role prompts and context slices for the generation service

use serde_json::{json, Value};

use crate::pipeline::planner::ArtifactRole;
use crate::request::Request;

const DEFAULT_APP_SLUG: &str = "default";
const DEFAULT_EXTERNAL_USER_ID: &str = "test-user-123";
const MAX_REGISTRY_ENTRIES: usize = 10;
const MAX_EXAMPLES: usize = 3;

/// App slug the generated project talks to by default
pub fn default_app_slug(request: &Request) -> &str {
    request.primary_tool_slug().unwrap_or(DEFAULT_APP_SLUG)
}

/// External account id bound to the default app
pub fn default_external_user_id(request: &Request) -> &str {
    request
        .primary_tool_slug()
        .and_then(|slug| request.external_user_id(slug))
        .unwrap_or(DEFAULT_EXTERNAL_USER_ID)
}

fn action_names(request: &Request) -> String {
    request
        .agent_spec
        .actions
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Structured context slice sent alongside the prompt for one role
pub fn build_context(role: ArtifactRole, request: &Request) -> Value {
    let spec = &request.agent_spec;
    let registry: Vec<_> = spec
        .tools_required
        .iter()
        .filter_map(|binding| request.registry_entry(&binding.tool_slug))
        .take(MAX_REGISTRY_ENTRIES)
        .collect();

    let mut context = json!({
        "role": role.as_str(),
        "path": role.path(),
        "agent_name": spec.name,
        "agent_identifier": request.agent_identifier(),
        "agent_description": spec.description,
        "model": spec.runtime.model,
        "user_query": request.user_query,
        "tools_required": spec.tools_required,
        "actions": spec.actions,
        "tool_registry": registry,
        "account_binding": {
            "tool_slug": default_app_slug(request),
            "external_user_id": default_external_user_id(request),
        },
    });

    if matches!(
        role,
        ArtifactRole::Entrypoint
            | ArtifactRole::Config
            | ArtifactRole::ToolBindings
            | ArtifactRole::Documentation
    ) {
        let examples: Vec<_> = spec.examples.iter().take(MAX_EXAMPLES).collect();
        context["examples"] = json!(examples);
    }

    context
}

fn role_requirements(role: ArtifactRole, request: &Request) -> String {
    let spec = &request.agent_spec;
    let ident = request.agent_identifier();
    let model = &spec.runtime.model;
    let app_slug = default_app_slug(request);
    let user_id = default_external_user_id(request);
    let actions = action_names(request);

    match role {
        ArtifactRole::Entrypoint => format!(
            "Generate agent.py for a Google ADK agent.\n\
             Requirements:\n\
             - Import Agent from google.adk\n\
             - Import get_agent_config from .config and get_agent_tools from .tools\n\
             - Define _get_model() returning \"{model}\"\n\
             - Assign a module-level root_agent = Agent(...) using name, model, tools and instruction from the config\n\
             - Add a module docstring: {name} using Google ADK with Pipedream MCP tools",
            name = spec.name,
        ),
        ArtifactRole::Config => format!(
            "Generate config/agent_config.py.\n\
             Requirements:\n\
             - Define get_agent_config() returning a dict with keys 'model' (\"{model}\"), \
               'name' (\"{ident}\"), 'description' and 'instruction'\n\
             - The instruction describes the agent, lists the actions ({actions}), \
               explains execute_{ident}_action and list_pipedream_tools"
        ),
        ArtifactRole::ToolsInit => "Generate tools/__init__.py.\n\
             Requirements:\n\
             - Import _init_tools_sync from .pipedream_tools\n\
             - Define get_agent_tools() calling _init_tools_sync(), falling back to \
               create_smart_pipedream_tool and create_list_pipedream_tools_tool on error\n\
             - Export __all__ = ['get_agent_tools']"
            .to_string(),
        ArtifactRole::ToolClient => format!(
            "Generate tools/pipedream_client.py.\n\
             Requirements:\n\
             - Guard optional mcp and pipedream imports (MCP_AVAILABLE, PIPEDREAM_AVAILABLE)\n\
             - Define class PipedreamMCPClient with __init__(project_id, client_id, client_secret, \
               project_environment, external_user_id, app_slug, mcp_server_url), _get_access_token(), \
               async connect(), async list_tools(), async execute_tool(tool_name, arguments), async close()\n\
             - Default app_slug \"{app_slug}\" and mcp_server_url \"https://remote.mcp.pipedream.net\"\n\
             - Read credentials from the environment, never hardcode them"
        ),
        ArtifactRole::ToolBindings => format!(
            "Generate tools/pipedream_tools.py.\n\
             Requirements:\n\
             - Import PipedreamMCPClient from .pipedream_client\n\
             - Define initialize_pipedream_client(), create_pipedream_tool_function(tool_info), \
               get_pipedream_tool_functions(), create_smart_pipedream_tool() returning \
               execute_{ident}_action, create_list_pipedream_tools_tool(), _init_tools_async() \
               and _init_tools_sync()\n\
             - Default app_slug \"{app_slug}\" and external user id \"{user_id}\"\n\
             - Map action keywords for: {actions}"
        ),
        ArtifactRole::Dependencies => "Generate requirements.txt.\n\
             Requirements: google-adk, mcp>=0.1.0, pipedream>=1.0.0, python-dotenv>=1.0.0"
            .to_string(),
        ArtifactRole::EnvTemplate => format!(
            "Generate .env.example.\n\
             Requirements: commented GOOGLE_API_KEY, PIPEDREAM_PROJECT_ID, PIPEDREAM_CLIENT_ID, \
             PIPEDREAM_CLIENT_SECRET placeholders, PIPEDREAM_ENVIRONMENT=development, \
             EXTERNAL_USER_ID={user_id}, APP_SLUG={app_slug}. Placeholders only, no real values."
        ),
        ArtifactRole::Documentation => format!(
            "Generate README.md.\n\
             Requirements:\n\
             - Title: {name}\n\
             - Explain the agent is built with Google's Agent Development Kit and Pipedream MCP tools\n\
             - Setup, running (adk run, adk web), usage examples and troubleshooting sections\n\
             - Document the available actions: {actions}\n\
             - Default EXTERNAL_USER_ID {user_id} and APP_SLUG {app_slug}",
            name = spec.name,
        ),
        ArtifactRole::PackageInit
        | ArtifactRole::ConfigInit
        | ArtifactRole::SetupScript
        | ArtifactRole::RunScript
        | ArtifactRole::TestSuite => format!("Generate {} for this agent.", role.path()),
    }
}

/// Prompt text for one role
pub fn build_prompt(role: ArtifactRole, request: &Request) -> String {
    let spec = &request.agent_spec;
    let output_kind = if role.is_python() {
        "the Python code"
    } else {
        "the file content"
    };

    format!(
        "{requirements}\n\n\
         Agent: {name} ({ident})\n\
         Description: {description}\n\
         User query: {query}\n\
         Runtime model: {model}\n\n\
         Generate ONLY {output_kind}, no markdown formatting and no explanations. \
         Use real values instead of template placeholders.",
        requirements = role_requirements(role, request),
        name = spec.name,
        ident = request.agent_identifier(),
        description = spec.description,
        query = request.user_query,
        model = spec.runtime.model,
    )
}
