//! HTTP API: synchronous and background runs, job polling and cancellation

use agent_codegen::config::PipelineConfig;
use agent_codegen::pipeline::{Orchestrator, RunStatus};
use agent_codegen::progress::ProgressEventKind;
use agent_codegen::server::{AcceptedResponse, CodegenServer, GenerateResponse, JobList, JobStatus};
use agent_codegen::testing::MockGenerationService;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use warp::http::StatusCode;

fn request_body(pipeline_id: &str) -> Value {
    json!({
        "pipeline_id": pipeline_id,
        "user_query": "Summarise my inbox",
        "agent_spec": {
            "name": "Inbox Helper",
            "description": "Reads and summarises email",
            "tools_required": [
                {"tool_slug": "gmail", "provider": "pipedream", "auth_required": true}
            ],
            "actions": [
                {"name": "list_emails", "tool_slug": "gmail"},
                {"name": "search_emails", "tool_slug": "gmail"}
            ]
        },
        "tool_registry": [{"tool_slug": "gmail", "name": "Gmail"}],
        "integrations": {"pipedream": {"external_user_ids": {"gmail": "user-42"}}}
    })
}

fn server(service: MockGenerationService, output_dir: Option<PathBuf>) -> Arc<CodegenServer> {
    let mut config = PipelineConfig::default();
    config.generation.retry_attempts = 0;
    Arc::new(CodegenServer::new(
        Orchestrator::new(config, Arc::new(service)),
        output_dir,
    ))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap()
}

/// Poll `/jobs/{id}` until the run leaves `pending`
async fn wait_for_job(server: &Arc<CodegenServer>, pipeline_id: &str) -> JobStatus {
    let api = Arc::clone(server).routes();
    for _ in 0..200 {
        let response = warp::test::request()
            .method("GET")
            .path(&format!("/jobs/{pipeline_id}"))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let status: JobStatus = decode(response.body());
        if status.status != RunStatus::Pending {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {pipeline_id} never finished");
}

#[tokio::test]
async fn test_health_and_documentation() {
    let api = server(MockGenerationService::new(), None).routes();

    let health = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(health.status(), StatusCode::OK);
    let body: Value = decode(health.body());
    assert_eq!(body["status"], "healthy");

    let root = warp::test::request().path("/").reply(&api).await;
    let body: Value = decode(root.body());
    assert!(body["endpoints"]["POST /generate/async"].is_string());
}

#[tokio::test]
async fn test_generate_runs_and_writes_project() {
    let out = TempDir::new().unwrap();
    let server = server(MockGenerationService::new(), Some(out.path().to_path_buf()));
    let api = Arc::clone(&server).routes();

    let response = warp::test::request()
        .method("POST")
        .path("/generate")
        .json(&request_body("http-1"))
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: GenerateResponse = decode(response.body());
    assert!(body.result.is_success(), "errors: {:?}", body.result.errors);
    assert_eq!(body.message, "Agent code generated successfully");

    let written = PathBuf::from(body.output_directory.expect("project written"));
    assert_eq!(written, out.path().join("http-1"));
    assert!(written.join("agent.py").is_file());

    let job = wait_for_job(&server, "http-1").await;
    assert_eq!(job.status, RunStatus::Success);
    assert_eq!(
        job.progress_events.last().map(|e| e.kind),
        Some(ProgressEventKind::Done)
    );

    let list = warp::test::request().path("/jobs").reply(&api).await;
    let list: JobList = decode(list.body());
    assert_eq!(list.jobs.len(), 1);
    assert_eq!(list.jobs[0].pipeline_id, "http-1");
}

#[tokio::test]
async fn test_generate_requires_agent_spec() {
    let api = server(MockGenerationService::new(), None).routes();

    let response = warp::test::request()
        .method("POST")
        .path("/generate")
        .json(&json!({"pipeline_id": "no-spec"}))
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = decode(response.body());
    assert!(body["error"].as_str().unwrap().contains("agent_spec"));
}

#[tokio::test]
async fn test_invalid_spec_reports_validation_errors() {
    let api = server(MockGenerationService::new(), None).routes();

    let response = warp::test::request()
        .method("POST")
        .path("/generate")
        .json(&json!({"pipeline_id": "bad-1", "agent_spec": {}}))
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: GenerateResponse = decode(response.body());
    assert_eq!(body.result.status, RunStatus::Error);
    assert_eq!(body.message, "Generation completed with errors");
    assert!(body.output_directory.is_none());
    assert!(body
        .result
        .errors
        .iter()
        .any(|e| e.code == "MISSING_AGENT_NAME"));
}

#[tokio::test]
async fn test_async_job_is_pollable_until_done() {
    let service =
        MockGenerationService::new().with_delay("agent.py", Duration::from_millis(200));
    let server = server(service, None);
    let api = Arc::clone(&server).routes();

    let response = warp::test::request()
        .method("POST")
        .path("/generate/async")
        .json(&request_body("async-1"))
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: AcceptedResponse = decode(response.body());
    assert_eq!(accepted.status, "accepted");
    assert_eq!(accepted.check_status_url, "/jobs/async-1");

    let pending = warp::test::request()
        .path("/jobs/async-1")
        .reply(&api)
        .await;
    let pending: JobStatus = decode(pending.body());
    assert_eq!(pending.status, RunStatus::Pending);
    assert!(pending.completed_at.is_none());

    let done = wait_for_job(&server, "async-1").await;
    assert_eq!(done.status, RunStatus::Success);
    assert!(done.completed_at.is_some());
    assert!(done.output_directory.is_none());
    assert_eq!(
        done.progress_events.first().map(|e| e.kind),
        Some(ProgressEventKind::ValidatingInput)
    );
}

#[tokio::test]
async fn test_running_job_id_cannot_be_reused() {
    let service = MockGenerationService::new().with_delay("agent.py", Duration::from_secs(5));
    let server = server(service, None);
    let api = Arc::clone(&server).routes();

    let start = || {
        warp::test::request()
            .method("POST")
            .path("/generate/async")
            .json(&request_body("dup-1"))
    };
    assert_eq!(start().reply(&api).await.status(), StatusCode::ACCEPTED);
    assert_eq!(start().reply(&api).await.status(), StatusCode::CONFLICT);

    let cancel = warp::test::request()
        .method("POST")
        .path("/jobs/dup-1/cancel")
        .reply(&api)
        .await;
    assert_eq!(cancel.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_cancelled_job_ends_in_error() {
    let service = MockGenerationService::new().with_delay("agent.py", Duration::from_secs(5));
    let server = server(service, None);
    let api = Arc::clone(&server).routes();

    warp::test::request()
        .method("POST")
        .path("/generate/async")
        .json(&request_body("cancel-1"))
        .reply(&api)
        .await;

    let cancel = warp::test::request()
        .method("POST")
        .path("/jobs/cancel-1/cancel")
        .reply(&api)
        .await;
    assert_eq!(cancel.status(), StatusCode::ACCEPTED);

    let done = wait_for_job(&server, "cancel-1").await;
    assert_eq!(done.status, RunStatus::Error);
    assert!(done.errors.iter().any(|e| e.code == "CANCELLED"));

    let again = warp::test::request()
        .method("POST")
        .path("/jobs/cancel-1/cancel")
        .reply(&api)
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let api = server(MockGenerationService::new(), None).routes();

    let response = warp::test::request().path("/jobs/missing").reply(&api).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cancel = warp::test::request()
        .method("POST")
        .path("/jobs/missing/cancel")
        .reply(&api)
        .await;
    assert_eq!(cancel.status(), StatusCode::NOT_FOUND);
}
