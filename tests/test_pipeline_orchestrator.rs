//! Pipeline orchestrator behavior
//!
//! Covers the run-level contracts: fatal validation, no early abort during
//! generation, targeted regeneration, status computed from evidence, secret
//! reporting, event ordering, cancellation and bounded concurrency.

use agent_codegen::config::PipelineConfig;
use agent_codegen::error::GenerationError;
use agent_codegen::issues::Stage;
use agent_codegen::llm::service::{GenerationRequest, GenerationService};
use agent_codegen::llm::LlmError;
use agent_codegen::pipeline::{
    ArtifactPlan, ArtifactPlanner, ArtifactRole, ArtifactStrategy, Orchestrator, RolePlanner,
    RunStatus,
};
use agent_codegen::progress::{ProgressEventKind, ProgressLevel};
use agent_codegen::request::Request;
use agent_codegen::testing::{sample_request, valid_content, MockGenerationService, PassingVerifier};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.generation.retry_attempts = 0;
    config.generation.retry_backoff_ms = 1;
    config.generation.request_timeout_secs = 5;
    config
}

fn llm_paths(request: &Request) -> Vec<String> {
    RolePlanner::default()
        .plan(request)
        .into_iter()
        .filter(|p| p.strategy == ArtifactStrategy::LlmGenerated)
        .map(|p| p.path)
        .collect()
}

/// Planner with a fixed role list that counts its invocations
struct FixedPlanner {
    roles: Vec<ArtifactRole>,
    invocations: AtomicUsize,
}

impl FixedPlanner {
    fn new(roles: Vec<ArtifactRole>) -> Self {
        Self {
            roles,
            invocations: AtomicUsize::new(0),
        }
    }
}

impl ArtifactPlanner for FixedPlanner {
    fn plan(&self, request: &Request) -> Vec<ArtifactPlan> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.roles
            .iter()
            .map(|role| ArtifactPlan::for_role(*role, request))
            .collect()
    }
}

#[tokio::test]
async fn test_referential_violations_fail_without_planning() {
    let broken_requests = {
        let mut action_to_unknown_tool = sample_request();
        action_to_unknown_tool.agent_spec.actions[0].tool_slug = "slack".to_string();

        let mut tool_not_in_registry = sample_request();
        tool_not_in_registry.tool_registry.clear();
        tool_not_in_registry.tool_registry.push(Default::default());
        tool_not_in_registry.tool_registry[0].tool_slug = "notion".to_string();

        let mut missing_account_binding = sample_request();
        missing_account_binding
            .integrations
            .pipedream
            .external_user_ids
            .clear();

        vec![
            ("ACTION_TOOL_NOT_IN_SPEC", action_to_unknown_tool),
            ("TOOL_NOT_IN_REGISTRY", tool_not_in_registry),
            ("MISSING_ACCOUNT_BINDING", missing_account_binding),
        ]
    };

    for (code, request) in broken_requests {
        let service = Arc::new(MockGenerationService::new());
        let planner = Arc::new(FixedPlanner::new(vec![ArtifactRole::Entrypoint]));
        let orchestrator =
            Orchestrator::new(test_config(), service.clone()).with_planner(planner.clone());

        let result = orchestrator.run(request).await;

        assert_eq!(result.status, RunStatus::Error, "{code}");
        assert!(result.manifest.is_none());
        assert!(result.errors.iter().any(|e| e.code == code && e.stage == Stage::Validate));
        assert_eq!(planner.invocations.load(Ordering::SeqCst), 0);
        assert!(service.calls().is_empty());

        let kinds: Vec<_> = result.progress_events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProgressEventKind::ValidatingInput,
                ProgressEventKind::Error,
                ProgressEventKind::Done
            ]
        );
    }
}

#[tokio::test]
async fn test_generation_continues_after_failures() {
    let auth_failure = || GenerationError::Service(LlmError::AuthenticationFailed("bad key".into()));
    let service = Arc::new(
        MockGenerationService::new()
            .with_fixed_failure("agent.py", auth_failure())
            .with_fixed_failure("config/agent_config.py", auth_failure()),
    );
    let mut config = test_config();
    config.pipeline.max_verification_retries = 0;
    let orchestrator = Orchestrator::new(config, service.clone());

    let request = sample_request();
    let result = orchestrator.run(request.clone()).await;

    // Every planned artifact was attempted despite the first two failing
    let counts = service.call_counts();
    for path in llm_paths(&request) {
        assert_eq!(counts.get(&path), Some(&1), "{path} not attempted");
    }

    assert_eq!(result.status, RunStatus::Error);
    let failed: Vec<_> = result
        .errors
        .iter()
        .filter(|e| e.code == "GENERATION_FAILED")
        .filter_map(|e| e.path.as_deref())
        .collect();
    assert_eq!(failed, vec!["agent.py", "config/agent_config.py"]);
    assert!(result.generated_files.contains_key("README.md"));
    assert!(!result.generated_files.contains_key("agent.py"));
}

#[tokio::test]
async fn test_unreachable_service_fails_every_generated_artifact() {
    let service = Arc::new(MockGenerationService::always_failing(GenerationError::Service(
        LlmError::AuthenticationFailed("bad key".into()),
    )));
    let orchestrator = Orchestrator::new(test_config(), service.clone());
    let request = sample_request();

    let result = orchestrator.run(request.clone()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.attempts, 3);
    for path in llm_paths(&request) {
        assert_eq!(service.call_count(&path), 3, "{path}");
        assert!(!result.generated_files.contains_key(&path));
        assert!(result.errors.iter().any(|e| e.path.as_deref() == Some(path.as_str())));
    }
    // template artifacts do not depend on the service
    assert!(result.generated_files.contains_key("setup.sh"));
    assert!(result.generated_files.contains_key("test_agent.py"));
}

#[tokio::test]
async fn test_retry_regenerates_only_failing_artifacts() {
    let service = Arc::new(
        MockGenerationService::new()
            .with_response("agent.py", "def broken(:\n    pass\n")
            .with_response("README.md", "# Inbox Helper (first draft)\n"),
    );
    let orchestrator = Orchestrator::new(test_config(), service.clone());

    let request = sample_request();
    let result = orchestrator.run(request.clone()).await;

    assert!(result.is_success(), "errors: {:?}", result.errors);
    assert_eq!(result.attempts, 2);

    for path in llm_paths(&request) {
        let expected = if path == "agent.py" { 2 } else { 1 };
        assert_eq!(service.call_count(&path), expected, "{path}");
    }

    // Passing content from the first attempt survives untouched
    assert_eq!(
        result.generated_files["README.md"],
        "# Inbox Helper (first draft)\n"
    );
    assert_eq!(
        result.generated_files["agent.py"],
        valid_content(ArtifactRole::Entrypoint)
    );

    let checks: Vec<_> = result
        .progress_events
        .iter()
        .filter(|e| e.kind == ProgressEventKind::RunningSanityChecks)
        .map(|e| e.payload.clone().unwrap())
        .collect();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[1], json!({"attempt": 2, "count": 1}));

    let regenerated = result
        .progress_events
        .iter()
        .filter(|e| e.kind == ProgressEventKind::GeneratingFile && e.path() == Some("agent.py"))
        .count();
    assert_eq!(regenerated, 2);
}

#[tokio::test]
async fn test_exhausted_retries_package_with_errors() {
    let service = Arc::new(
        MockGenerationService::new().with_fixed_response("agent.py", "root_agent = (\n"),
    );
    let orchestrator = Orchestrator::new(test_config(), service.clone());

    let result = orchestrator.run(sample_request()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.attempts, 3);
    assert_eq!(service.call_count("agent.py"), 3);

    let manifest = result.manifest.expect("packaged despite errors");
    assert!(manifest.files.contains(&"agent.py".to_string()));
    assert!(manifest.issue_summary.errors >= 1);
    assert!(result
        .errors
        .iter()
        .all(|e| e.path.as_deref() == Some("agent.py")));
    assert!(result.errors.iter().any(|e| e.code == "SYNTAX_ERROR"));
}

#[tokio::test]
async fn test_missing_content_is_error_even_when_verification_passes() {
    let service = Arc::new(
        MockGenerationService::new()
            .with_fixed_failure("README.md", GenerationError::EmptyResponse),
    );
    let orchestrator =
        Orchestrator::new(test_config(), service).with_verifier(Arc::new(PassingVerifier));

    let result = orchestrator.run(sample_request()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert!(!result.generated_files.contains_key("README.md"));
    assert!(result
        .errors
        .iter()
        .any(|e| e.path.as_deref() == Some("README.md")));
    assert!(!result
        .manifest
        .unwrap()
        .files
        .contains(&"README.md".to_string()));
}

#[tokio::test]
async fn test_secret_is_reported_and_left_in_place() {
    let leaked = "import os\n\nAPI_KEY = \"sk-proj-Zx81mQ2pL0vN4bT7yR6wK3eH\"\n\n\
                  def get_agent_config():\n    return {\"name\": \"inbox_helper\"}\n";
    let service = Arc::new(
        MockGenerationService::new().with_fixed_response("config/agent_config.py", leaked),
    );
    let mut config = test_config();
    config.pipeline.max_verification_retries = 0;
    let orchestrator = Orchestrator::new(config, service);

    let result = orchestrator.run(sample_request()).await;

    assert_eq!(result.status, RunStatus::Error);
    let secret = result
        .errors
        .iter()
        .find(|e| e.code == "SECRET_DETECTED")
        .expect("secret reported");
    assert_eq!(secret.path.as_deref(), Some("config/agent_config.py"));
    assert_eq!(secret.stage, Stage::Verify);
    assert!(!secret.message.contains("Zx81mQ2pL0vN4bT7yR6wK3eH"));
    assert_eq!(result.generated_files["config/agent_config.py"], leaked);
}

const LEAKED_CONFIG: &str = "API_KEY = \"sk-proj-Zx81mQ2pL0vN4bT7yR6wK3eH\"\n\n\
                             def get_agent_config():\n    return {\"name\": \"inbox_helper\"}\n";

#[tokio::test]
async fn test_secret_is_not_regenerated_away() {
    // clean content is queued behind the leak but must never be requested
    let service = Arc::new(
        MockGenerationService::new()
            .with_response("config/agent_config.py", LEAKED_CONFIG)
            .with_response("config/agent_config.py", valid_content(ArtifactRole::Config)),
    );
    let orchestrator = Orchestrator::new(test_config(), service.clone());

    let result = orchestrator.run(sample_request()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.attempts, 1);
    assert_eq!(service.call_count("config/agent_config.py"), 1);
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == "SECRET_DETECTED" && e.path.as_deref() == Some("config/agent_config.py")));
    assert_eq!(result.generated_files["config/agent_config.py"], LEAKED_CONFIG);
}

#[tokio::test]
async fn test_secret_survives_retry_of_other_artifacts() {
    let service = Arc::new(
        MockGenerationService::new()
            .with_response("config/agent_config.py", LEAKED_CONFIG)
            .with_response("agent.py", "root_agent = (\n"),
    );
    let orchestrator = Orchestrator::new(test_config(), service.clone());

    let result = orchestrator.run(sample_request()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.attempts, 2);
    assert_eq!(service.call_count("agent.py"), 2);
    assert_eq!(service.call_count("config/agent_config.py"), 1);

    assert!(!result.errors.is_empty());
    assert!(result
        .errors
        .iter()
        .all(|e| e.code == "SECRET_DETECTED" && e.path.as_deref() == Some("config/agent_config.py")));
}

#[tokio::test]
async fn test_secret_survives_exhausted_retries() {
    let service = Arc::new(
        MockGenerationService::new()
            .with_response("config/agent_config.py", LEAKED_CONFIG)
            .with_fixed_response("agent.py", "root_agent = (\n"),
    );
    let orchestrator = Orchestrator::new(test_config(), service.clone());

    let result = orchestrator.run(sample_request()).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.attempts, 3);
    assert_eq!(service.call_count("config/agent_config.py"), 1);
    assert!(result.errors.iter().any(|e| e.code == "SECRET_DETECTED"));
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == "SYNTAX_ERROR" && e.path.as_deref() == Some("agent.py")));
}

#[tokio::test]
async fn test_event_order_for_three_artifacts() {
    let planner = Arc::new(FixedPlanner::new(vec![
        ArtifactRole::Entrypoint,
        ArtifactRole::Config,
        ArtifactRole::Dependencies,
    ]));
    let orchestrator = Orchestrator::new(test_config(), Arc::new(MockGenerationService::new()))
        .with_planner(planner);

    let result = orchestrator.run(sample_request()).await;
    assert!(result.is_success(), "errors: {:?}", result.errors);

    let trail: Vec<_> = result
        .progress_events
        .iter()
        .map(|e| (e.kind, e.path().map(str::to_string)))
        .collect();
    let file = |kind, path: &str| (kind, Some(path.to_string()));

    assert_eq!(
        trail,
        vec![
            (ProgressEventKind::ValidatingInput, None),
            (ProgressEventKind::PlanningProject, None),
            (ProgressEventKind::GeneratingFiles, None),
            file(ProgressEventKind::GeneratingFile, "agent.py"),
            file(ProgressEventKind::FileGenerated, "agent.py"),
            file(ProgressEventKind::GeneratingFile, "config/agent_config.py"),
            file(ProgressEventKind::FileGenerated, "config/agent_config.py"),
            file(ProgressEventKind::GeneratingFile, "requirements.txt"),
            file(ProgressEventKind::FileGenerated, "requirements.txt"),
            (ProgressEventKind::RunningSanityChecks, None),
            (ProgressEventKind::PackagingOutput, None),
            (ProgressEventKind::Done, None),
        ]
    );

    let timestamps: Vec<_> = result.progress_events.iter().map(|e| e.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_test_suite_generation_is_announced() {
    let planner = Arc::new(FixedPlanner::new(vec![ArtifactRole::TestSuite]));
    let orchestrator = Orchestrator::new(test_config(), Arc::new(MockGenerationService::new()))
        .with_planner(planner);

    let result = orchestrator.run(sample_request()).await;

    let kinds: Vec<_> = result.progress_events.iter().map(|e| e.kind).collect();
    let tests_at = kinds
        .iter()
        .position(|k| *k == ProgressEventKind::GeneratingTests)
        .expect("GENERATING_TESTS emitted");
    assert_eq!(kinds[tests_at + 1], ProgressEventKind::GeneratingFile);
    assert!(result.generated_files["test_agent.py"].contains("import"));
}

#[tokio::test]
async fn test_cancellation_during_generation_is_error() {
    let service = Arc::new(
        MockGenerationService::new().with_delay("agent.py", Duration::from_secs(30)),
    );
    let orchestrator = Orchestrator::new(test_config(), service);

    let run = orchestrator.start(sample_request());
    let canceller = run.canceller();
    let started = Instant::now();
    let handle = tokio::spawn(run.execute());

    tokio::time::sleep(Duration::from_millis(100)).await;
    canceller.cancel();
    let result = handle.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.status, RunStatus::Error);
    assert_ne!(result.status, RunStatus::Pending);
    assert!(result.errors.iter().any(|e| e.code == "CANCELLED"));

    let kinds: Vec<_> = result.progress_events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&ProgressEventKind::Error));
    assert!(!kinds.contains(&ProgressEventKind::RunningSanityChecks));
    assert_eq!(kinds.last(), Some(&ProgressEventKind::Done));
    assert_eq!(
        result.progress_events.last().unwrap().level,
        ProgressLevel::Error
    );
}

#[tokio::test]
async fn test_end_to_end_two_actions_on_one_tool() {
    let request = sample_request();
    assert_eq!(request.agent_spec.actions.len(), 2);
    assert_eq!(request.agent_spec.tools_required.len(), 1);

    let orchestrator = Orchestrator::new(test_config(), Arc::new(MockGenerationService::new()))
        .with_verifier(Arc::new(PassingVerifier));

    let result = orchestrator.run(request.clone()).await;

    assert_eq!(result.status, RunStatus::Success);
    assert!(result.errors.is_empty());

    let planned: Vec<String> = RolePlanner::default()
        .plan(&request)
        .into_iter()
        .map(|p| p.path)
        .collect();
    let manifest = result.manifest.unwrap();
    assert_eq!(manifest.files, planned);
    assert_eq!(manifest.pipeline_id, "test-pipeline");
    assert_eq!(result.generated_files.len(), planned.len());
}

#[tokio::test]
async fn test_live_subscription_sees_the_whole_run() {
    let orchestrator = Orchestrator::new(test_config(), Arc::new(MockGenerationService::new()));
    let run = orchestrator.start(sample_request());
    let mut live = run.progress().subscribe();

    let collector = tokio::spawn(async move {
        let mut kinds = Vec::new();
        while let Ok(event) = live.recv().await {
            kinds.push(event.kind);
            if event.kind == ProgressEventKind::Done {
                break;
            }
        }
        kinds
    });

    let result = run.execute().await;
    let streamed = collector.await.unwrap();

    let polled: Vec<_> = result.progress_events.iter().map(|e| e.kind).collect();
    assert_eq!(streamed, polled);
}

/// Service that tracks how many generation calls are in flight at once
#[derive(Default)]
struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl GenerationService for ConcurrencyGauge {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(valid_content(request.role))
    }
}

#[tokio::test]
async fn test_generation_respects_concurrency_limit() {
    let gauge = Arc::new(ConcurrencyGauge::default());
    let mut config = test_config();
    config.generation.max_concurrency = 2;
    let orchestrator = Orchestrator::new(config, gauge.clone());

    let result = orchestrator.run(sample_request()).await;

    assert!(result.is_success(), "errors: {:?}", result.errors);
    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency {peak}");
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let service = Arc::new(MockGenerationService::new());
    let orchestrator = Orchestrator::new(test_config(), service);

    let mut first = sample_request();
    first.pipeline_id = "run-a".to_string();
    let mut second = sample_request();
    second.pipeline_id = "run-b".to_string();
    second.agent_spec.actions[1].tool_slug = "unknown".to_string();

    let (a, b) = tokio::join!(orchestrator.run(first), orchestrator.run(second));

    assert!(a.is_success(), "errors: {:?}", a.errors);
    assert_eq!(b.status, RunStatus::Error);
    assert!(a.errors.is_empty());
    assert_eq!(a.pipeline_id, "run-a");
    assert_eq!(b.pipeline_id, "run-b");
    assert!(b.progress_events.len() < a.progress_events.len());
}
