//! Mock implementations for testing
//!
//! Provides a scripted generation service, a scripted LLM provider and a
//! pass-through verifier so pipeline runs can be exercised without network
//! access.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::GenerationError;
use crate::issues::IssueSet;
use crate::llm::provider::{Completion, CompletionRequest, LlmError, LlmProvider};
use crate::llm::service::{GenerationRequest, GenerationService};
use crate::pipeline::planner::{ArtifactPlan, ArtifactRole};
use crate::request::{
    ActionSpec, Request, RegistryEntry, ToolBinding, UsageExample, PIPEDREAM_PROVIDER,
};
use crate::verify::ArtifactVerifier;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Valid request: one authorized Gmail tool with two actions
pub fn sample_request() -> Request {
    let mut request = Request::default();
    request.pipeline_id = "test-pipeline".to_string();
    request.user_query = "Summarise my unread email every morning".to_string();

    let spec = &mut request.agent_spec;
    spec.name = "Inbox Helper".to_string();
    spec.description = "Reads, searches and summarises Gmail messages".to_string();
    spec.tools_required.push(ToolBinding {
        tool_slug: "gmail".to_string(),
        provider: Some(PIPEDREAM_PROVIDER.to_string()),
        auth_required: true,
        scopes: vec!["gmail.readonly".to_string()],
    });
    spec.actions.push(ActionSpec {
        name: "list_emails".to_string(),
        tool_slug: "gmail".to_string(),
        description: "List recent messages".to_string(),
        ..Default::default()
    });
    spec.actions.push(ActionSpec {
        name: "search_emails".to_string(),
        tool_slug: "gmail".to_string(),
        description: "Search messages by query".to_string(),
        ..Default::default()
    });
    spec.examples.push(UsageExample {
        input: "What did I get from my bank today?".to_string(),
        expected_behavior: Some("Searches today's mail from the bank".to_string()),
    });

    request.tool_registry.push(RegistryEntry {
        tool_slug: "gmail".to_string(),
        name: "Gmail".to_string(),
        description: "Google mail".to_string(),
        capabilities: vec!["list".to_string(), "search".to_string()],
    });
    request
        .integrations
        .pipedream
        .external_user_ids
        .insert("gmail".to_string(), "user-42".to_string());

    request
}

/// Content for `role` that passes every static check
pub fn valid_content(role: ArtifactRole) -> String {
    match role {
        ArtifactRole::Entrypoint => "\"\"\"Inbox Helper agent.\"\"\"\n\
             from google.adk import Agent\n\n\
             from .config import get_agent_config\n\
             from .tools import get_agent_tools\n\n\
             _config = get_agent_config()\n\n\
             root_agent = Agent(\n    \
                 name=_config[\"name\"],\n    \
                 model=_config[\"model\"],\n    \
                 instruction=_config[\"instruction\"],\n    \
                 tools=get_agent_tools(),\n\
             )\n"
            .to_string(),
        ArtifactRole::Config => "def get_agent_config():\n    \
                 return {\n        \
                     \"name\": \"inbox_helper\",\n        \
                     \"model\": \"gemini-2.5-flash\",\n        \
                     \"description\": \"Reads Gmail\",\n        \
                     \"instruction\": \"Use execute_inbox_helper_action.\",\n    \
                 }\n"
            .to_string(),
        ArtifactRole::ToolsInit => "from .pipedream_tools import _init_tools_sync\n\n\n\
             def get_agent_tools():\n    \
                 return _init_tools_sync()\n\n\n\
             __all__ = ['get_agent_tools']\n"
            .to_string(),
        ArtifactRole::ToolClient => "import os\n\n\n\
             class PipedreamMCPClient:\n    \
                 def __init__(self, app_slug=\"gmail\"):\n        \
                     self.app_slug = app_slug\n        \
                     self.client_id = os.environ.get(\"PIPEDREAM_CLIENT_ID\")\n"
            .to_string(),
        ArtifactRole::ToolBindings => "from .pipedream_client import PipedreamMCPClient\n\n\n\
             def _init_tools_sync():\n    \
                 client = PipedreamMCPClient(app_slug=\"gmail\")\n    \
                 return [client]\n"
            .to_string(),
        ArtifactRole::Dependencies => "google-adk\nmcp\npython-dotenv\n".to_string(),
        ArtifactRole::EnvTemplate => {
            "GOOGLE_API_KEY=your-google-api-key\nPIPEDREAM_PROJECT_ID=your-project-id\n"
                .to_string()
        }
        ArtifactRole::Documentation => "# Inbox Helper\n\nRun `./setup.sh` then `./run.sh`.\n".to_string(),
        ArtifactRole::PackageInit
        | ArtifactRole::ConfigInit
        | ArtifactRole::SetupScript
        | ArtifactRole::RunScript
        | ArtifactRole::TestSuite => format!("# {}\n", role.path()),
    }
}

/// Scripted generation service
///
/// Per path, scripted results are consumed in order, then the fixed result
/// (if any) is returned, then [`valid_content`] for the role.
#[derive(Debug, Default)]
pub struct MockGenerationService {
    scripted: Mutex<HashMap<String, VecDeque<Result<String, GenerationError>>>>,
    fixed: HashMap<String, Result<String, GenerationError>>,
    delays: HashMap<String, Duration>,
    fail_all: Option<GenerationError>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `error`
    pub fn always_failing(error: GenerationError) -> Self {
        Self {
            fail_all: Some(error),
            ..Default::default()
        }
    }

    fn script(self, path: &str, result: Result<String, GenerationError>) -> Self {
        lock(&self.scripted)
            .entry(path.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Next call for `path` returns `content`
    pub fn with_response(self, path: &str, content: impl Into<String>) -> Self {
        self.script(path, Ok(content.into()))
    }

    /// Next call for `path` fails with `error`
    pub fn with_failure(self, path: &str, error: GenerationError) -> Self {
        self.script(path, Err(error))
    }

    /// Every unscripted call for `path` returns `content`
    pub fn with_fixed_response(mut self, path: &str, content: impl Into<String>) -> Self {
        self.fixed.insert(path.to_string(), Ok(content.into()));
        self
    }

    /// Every unscripted call for `path` fails with `error`
    pub fn with_fixed_failure(mut self, path: &str, error: GenerationError) -> Self {
        self.fixed.insert(path.to_string(), Err(error));
        self
    }

    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    /// Requests received so far, in arrival order
    pub fn calls(&self) -> Vec<GenerationRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.path == path).count()
    }

    /// Number of calls per path
    pub fn call_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for call in lock(&self.calls).iter() {
            *counts.entry(call.path.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        lock(&self.calls).push(request.clone());

        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = &self.fail_all {
            return Err(error.clone());
        }

        let scripted = lock(&self.scripted)
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => match self.fixed.get(&request.path) {
                Some(result) => result.clone(),
                None => Ok(valid_content(request.role)),
            },
        }
    }
}

/// Scripted LLM provider
///
/// Results are consumed in order and the last one repeats once the script
/// runs out.
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    truncated: bool,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![Ok(response.into())])
    }

    pub fn with_failure(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Report every completion as stopped at the token limit
    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    fn next_result(&self) -> Result<String, LlmError> {
        let mut responses = lock(&self.responses);
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        next.unwrap_or_else(|| Ok("Mock response".to_string()))
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let model = request.model.clone();
        lock(&self.requests).push(request);

        let text = self.next_result()?;
        Ok(Completion {
            output_tokens: text.split_whitespace().count() as u32,
            text,
            model,
            truncated: self.truncated,
        })
    }
}

/// Verifier that accepts everything
#[derive(Debug, Clone, Default)]
pub struct PassingVerifier;

impl ArtifactVerifier for PassingVerifier {
    fn verify(&self, _plans: &[ArtifactPlan], _files: &BTreeMap<String, String>, _issues: &mut IssueSet) {}
}
