//! Artifact planning
//!
//! Maps a validated request onto the closed set of artifact roles. The plan is
//! a pure function of the request and the planner settings, so a retry can
//! address artifacts by path and get the same plan every time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PlannerSection;
use crate::pipeline::prompts;
use crate::request::Request;

/// How an artifact's content is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactStrategy {
    /// Requested from the generation service
    LlmGenerated,
    /// Rendered locally from a built-in template
    StaticTemplate,
    /// Fixed content copied verbatim
    Copy,
}

/// Conceptual role an artifact plays in the generated agent project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    PackageInit,
    Entrypoint,
    ConfigInit,
    Config,
    ToolsInit,
    ToolClient,
    ToolBindings,
    Dependencies,
    EnvTemplate,
    Documentation,
    SetupScript,
    RunScript,
    TestSuite,
}

impl ArtifactRole {
    /// Every role, in plan order
    pub const ALL: [ArtifactRole; 13] = [
        ArtifactRole::PackageInit,
        ArtifactRole::Entrypoint,
        ArtifactRole::ConfigInit,
        ArtifactRole::Config,
        ArtifactRole::ToolsInit,
        ArtifactRole::ToolClient,
        ArtifactRole::ToolBindings,
        ArtifactRole::Dependencies,
        ArtifactRole::EnvTemplate,
        ArtifactRole::Documentation,
        ArtifactRole::SetupScript,
        ArtifactRole::RunScript,
        ArtifactRole::TestSuite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::PackageInit => "package_init",
            ArtifactRole::Entrypoint => "entrypoint",
            ArtifactRole::ConfigInit => "config_init",
            ArtifactRole::Config => "config",
            ArtifactRole::ToolsInit => "tools_init",
            ArtifactRole::ToolClient => "tool_client",
            ArtifactRole::ToolBindings => "tool_bindings",
            ArtifactRole::Dependencies => "dependencies",
            ArtifactRole::EnvTemplate => "env_template",
            ArtifactRole::Documentation => "documentation",
            ArtifactRole::SetupScript => "setup_script",
            ArtifactRole::RunScript => "run_script",
            ArtifactRole::TestSuite => "test_suite",
        }
    }

    /// Output path relative to the project root
    pub fn path(&self) -> &'static str {
        match self {
            ArtifactRole::PackageInit => "__init__.py",
            ArtifactRole::Entrypoint => "agent.py",
            ArtifactRole::ConfigInit => "config/__init__.py",
            ArtifactRole::Config => "config/agent_config.py",
            ArtifactRole::ToolsInit => "tools/__init__.py",
            ArtifactRole::ToolClient => "tools/pipedream_client.py",
            ArtifactRole::ToolBindings => "tools/pipedream_tools.py",
            ArtifactRole::Dependencies => "requirements.txt",
            ArtifactRole::EnvTemplate => ".env.example",
            ArtifactRole::Documentation => "README.md",
            ArtifactRole::SetupScript => "setup.sh",
            ArtifactRole::RunScript => "run.sh",
            ArtifactRole::TestSuite => "test_agent.py",
        }
    }

    pub fn strategy(&self) -> ArtifactStrategy {
        match self {
            ArtifactRole::PackageInit | ArtifactRole::ConfigInit => ArtifactStrategy::Copy,
            ArtifactRole::SetupScript | ArtifactRole::RunScript | ArtifactRole::TestSuite => {
                ArtifactStrategy::StaticTemplate
            }
            _ => ArtifactStrategy::LlmGenerated,
        }
    }

    pub fn from_path(path: &str) -> Option<ArtifactRole> {
        Self::ALL.into_iter().find(|role| role.path() == path)
    }

    pub fn is_python(&self) -> bool {
        self.path().ends_with(".py")
    }

    /// Roles only planned when a tool binding goes through the Pipedream bridge
    pub fn requires_pipedream(&self) -> bool {
        matches!(self, ArtifactRole::ToolClient | ArtifactRole::ToolBindings)
    }

    pub fn is_script(&self) -> bool {
        matches!(self, ArtifactRole::SetupScript | ArtifactRole::RunScript)
    }
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file to produce. Read-only once planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    pub path: String,
    pub role: ArtifactRole,
    pub strategy: ArtifactStrategy,
    /// Structured context passed to the generation service (null for local strategies)
    pub context: Value,
}

impl ArtifactPlan {
    pub fn for_role(role: ArtifactRole, request: &Request) -> Self {
        let context = match role.strategy() {
            ArtifactStrategy::LlmGenerated => prompts::build_context(role, request),
            ArtifactStrategy::StaticTemplate | ArtifactStrategy::Copy => Value::Null,
        };

        Self {
            path: role.path().to_string(),
            role,
            strategy: role.strategy(),
            context,
        }
    }
}

/// Derives the artifact list for a validated request
pub trait ArtifactPlanner: Send + Sync {
    fn plan(&self, request: &Request) -> Vec<ArtifactPlan>;
}

/// Default planner driven by the static role table
#[derive(Debug, Clone)]
pub struct RolePlanner {
    include_scripts: bool,
    include_tests: bool,
}

impl Default for RolePlanner {
    fn default() -> Self {
        Self::new(&PlannerSection::default())
    }
}

impl RolePlanner {
    pub fn new(config: &PlannerSection) -> Self {
        Self {
            include_scripts: config.include_scripts,
            include_tests: config.include_tests,
        }
    }

    fn includes(&self, role: ArtifactRole, request: &Request) -> bool {
        if role.requires_pipedream() && !request.uses_pipedream() {
            return false;
        }
        if role.is_script() && !self.include_scripts {
            return false;
        }
        if role == ArtifactRole::TestSuite && !self.include_tests {
            return false;
        }
        true
    }
}

impl ArtifactPlanner for RolePlanner {
    fn plan(&self, request: &Request) -> Vec<ArtifactPlan> {
        ArtifactRole::ALL
            .into_iter()
            .filter(|role| self.includes(*role, request))
            .map(|role| ArtifactPlan::for_role(role, request))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ToolBinding;

    fn request(provider: Option<&str>) -> Request {
        let mut request = Request::default();
        request.agent_spec.name = "Inbox Helper".to_string();
        request.agent_spec.tools_required.push(ToolBinding {
            tool_slug: "gmail".to_string(),
            provider: provider.map(str::to_string),
            ..Default::default()
        });
        request
    }

    fn paths(plans: &[ArtifactPlan]) -> Vec<&str> {
        plans.iter().map(|p| p.path.as_str()).collect()
    }

    #[test]
    fn test_full_plan_for_pipedream_request() {
        let plans = RolePlanner::default().plan(&request(Some("pipedream")));

        assert_eq!(
            paths(&plans),
            vec![
                "__init__.py",
                "agent.py",
                "config/__init__.py",
                "config/agent_config.py",
                "tools/__init__.py",
                "tools/pipedream_client.py",
                "tools/pipedream_tools.py",
                "requirements.txt",
                ".env.example",
                "README.md",
                "setup.sh",
                "run.sh",
                "test_agent.py",
            ]
        );
    }

    #[test]
    fn test_pipedream_roles_are_conditional() {
        let plans = RolePlanner::default().plan(&request(None));
        assert!(plans.iter().all(|p| !p.role.requires_pipedream()));
        assert_eq!(plans.len(), 11);
    }

    #[test]
    fn test_scripts_and_tests_can_be_switched_off() {
        let planner = RolePlanner::new(&PlannerSection {
            include_scripts: false,
            include_tests: false,
        });
        let plans = planner.plan(&request(Some("pipedream")));

        assert!(!paths(&plans).contains(&"setup.sh"));
        assert!(!paths(&plans).contains(&"run.sh"));
        assert!(!paths(&plans).contains(&"test_agent.py"));
    }

    #[test]
    fn test_strategies_follow_role_table() {
        let plans = RolePlanner::default().plan(&request(Some("pipedream")));
        for plan in &plans {
            assert_eq!(plan.strategy, plan.role.strategy());
            assert_eq!(
                plan.context.is_null(),
                plan.strategy != ArtifactStrategy::LlmGenerated
            );
        }
    }

    #[test]
    fn test_role_lookup_by_path() {
        for role in ArtifactRole::ALL {
            assert_eq!(ArtifactRole::from_path(role.path()), Some(role));
        }
        assert_eq!(ArtifactRole::from_path("nope.py"), None);
    }

    #[test]
    fn test_strategy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ArtifactStrategy::LlmGenerated).unwrap(),
            "\"llm-generated\""
        );
        assert_eq!(
            serde_json::to_string(&ArtifactStrategy::StaticTemplate).unwrap(),
            "\"static-template\""
        );
    }
}
