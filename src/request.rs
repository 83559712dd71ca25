//! Pipeline input: the agent specification and its tool environment
//!
//! Every field is defaulted on deserialization so that an incomplete request
//! still parses and the validator can report all of its problems at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::PipelineError;

/// Agent specification version understood by the planner and prompts
pub const SUPPORTED_SPEC_VERSION: &str = "v1";

/// Provider name of tools reached through the Pipedream MCP bridge
pub const PIPEDREAM_PROVIDER: &str = "pipedream";

/// Full input to one pipeline run. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub pipeline_id: String,
    #[serde(default = "default_spec_version")]
    pub agent_spec_version: String,
    #[serde(default)]
    pub user_query: String,
    #[serde(default)]
    pub agent_spec: AgentSpec,
    #[serde(default)]
    pub tool_registry: Vec<RegistryEntry>,
    #[serde(default)]
    pub integrations: Integrations,
}

fn default_spec_version() -> String {
    SUPPORTED_SPEC_VERSION.to_string()
}

impl Default for Request {
    fn default() -> Self {
        Self {
            pipeline_id: String::new(),
            agent_spec_version: default_spec_version(),
            user_query: String::new(),
            agent_spec: AgentSpec::default(),
            tool_registry: Vec::new(),
            integrations: Integrations::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub runtime: RuntimeSpec,
    #[serde(default)]
    pub tools_required: Vec<ToolBinding>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub examples: Vec<UsageExample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Model the generated agent will run on
    #[serde(default = "default_runtime_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

fn default_runtime_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self {
            model: default_runtime_model(),
            framework: None,
        }
    }
}

/// A tool the agent needs, bound by slug to the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolBinding {
    #[serde(default)]
    pub tool_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl ToolBinding {
    pub fn is_pipedream(&self) -> bool {
        self.provider.as_deref() == Some(PIPEDREAM_PROVIDER)
    }
}

/// A named action bound to exactly one tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tool_slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageExample {
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_behavior: Option<String>,
}

/// Capabilities of a known tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub tool_slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Integrations {
    #[serde(default)]
    pub pipedream: PipedreamIntegration,
}

/// External-account bindings per tool slug
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipedreamIntegration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub external_user_ids: BTreeMap<String, String>,
}

impl Request {
    /// Parse a request from JSON, assigning a fresh pipeline id when none is given
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let request: Request = serde_json::from_str(json)?;
        Ok(request.with_pipeline_id())
    }

    /// Same as [`Request::from_json`] for an already decoded body
    pub fn from_value(value: serde_json::Value) -> Result<Self, PipelineError> {
        let request: Request = serde_json::from_value(value)?;
        Ok(request.with_pipeline_id())
    }

    fn with_pipeline_id(mut self) -> Self {
        if self.pipeline_id.trim().is_empty() {
            self.pipeline_id = Uuid::new_v4().to_string();
        }
        self
    }

    pub fn load_from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Snake-case identifier of the agent used in generated code
    pub fn agent_identifier(&self) -> String {
        let name = self.agent_spec.name.trim();
        if name.is_empty() {
            return "generated_agent".to_string();
        }
        name.to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn registry_entry(&self, tool_slug: &str) -> Option<&RegistryEntry> {
        self.tool_registry.iter().find(|e| e.tool_slug == tool_slug)
    }

    pub fn external_user_id(&self, tool_slug: &str) -> Option<&str> {
        self.integrations
            .pipedream
            .external_user_ids
            .get(tool_slug)
            .map(String::as_str)
    }

    pub fn uses_pipedream(&self) -> bool {
        self.agent_spec.tools_required.iter().any(ToolBinding::is_pipedream)
    }

    /// Slug of the first bound tool, used as the default app in generated env files
    pub fn primary_tool_slug(&self) -> Option<&str> {
        self.agent_spec
            .tools_required
            .first()
            .map(|t| t.tool_slug.as_str())
            .filter(|s| !s.is_empty())
    }
}
