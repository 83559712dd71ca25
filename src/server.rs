//! HTTP API for the generation pipeline
//!
//! `POST /generate` runs a request to completion and returns the run result.
//! `POST /generate/async` starts a run in the background; its progress events
//! and final result are polled with `GET /jobs/{pipeline_id}` while it runs.

use crate::issues::IssueView;
use crate::output::write_generated_files;
use crate::pipeline::{Orchestrator, RunCanceller, RunResult, RunStatus};
use crate::progress::{ProgressEvent, ProgressLog};
use crate::request::Request;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Book-keeping for one run started through the API
struct Job {
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    progress: ProgressLog,
    canceller: RunCanceller,
    result: Option<RunResult>,
    output_directory: Option<String>,
}

impl Job {
    fn is_running(&self) -> bool {
        self.result.is_none()
    }

    fn status(&self, pipeline_id: &str) -> JobStatus {
        let (status, progress_events, errors, warnings) = match &self.result {
            Some(result) => (
                result.status,
                result.progress_events.clone(),
                result.errors.clone(),
                result.warnings.clone(),
            ),
            None => (RunStatus::Pending, self.progress.events(), Vec::new(), Vec::new()),
        };

        JobStatus {
            pipeline_id: pipeline_id.to_string(),
            status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            output_directory: self.output_directory.clone(),
            progress_events,
            errors,
            warnings,
        }
    }
}

/// `GET /jobs/{pipeline_id}` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub pipeline_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_directory: Option<String>,
    /// Events emitted so far; the full trail once the run is done
    pub progress_events: Vec<ProgressEvent>,
    pub errors: Vec<IssueView>,
    pub warnings: Vec<IssueView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub pipeline_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<JobSummary>,
}

/// `POST /generate` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub message: String,
    pub output_directory: Option<String>,
    #[serde(flatten)]
    pub result: RunResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub pipeline_id: String,
    pub status: String,
    pub message: String,
    pub check_status_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    service: &'static str,
    version: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_reply(status: StatusCode, error: impl Into<String>) -> WithStatus<Json> {
    let body = ErrorResponse {
        error: error.into(),
        timestamp: Utc::now(),
    };
    json_reply(&body, status)
}

/// Decode a request body. Bodies without an `agent_spec` are rejected outright.
fn parse_body(body: Value) -> Result<Request, WithStatus<Json>> {
    if body.get("agent_spec").map_or(true, Value::is_null) {
        return Err(error_reply(
            StatusCode::BAD_REQUEST,
            "Request body must include 'agent_spec'",
        ));
    }
    Request::from_value(body)
        .map_err(|e| error_reply(StatusCode::BAD_REQUEST, format!("Invalid request: {e}")))
}

/// Pipeline HTTP server with an in-memory job table
pub struct CodegenServer {
    orchestrator: Orchestrator,
    /// Where finished projects are written; `None` keeps them in memory only
    output_dir: Option<PathBuf>,
    jobs: RwLock<HashMap<String, Job>>,
}

impl CodegenServer {
    pub fn new(orchestrator: Orchestrator, output_dir: Option<PathBuf>) -> Self {
        Self {
            orchestrator,
            output_dir,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Every route of the API
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let with_server = warp::any().map(move || Arc::clone(&self));

        // GET / - API documentation
        let root = warp::path::end().and(warp::get()).map(|| {
            let endpoints = BTreeMap::from([
                ("POST /generate", "Generate an agent project and wait for the result"),
                ("POST /generate/async", "Start generation in the background"),
                ("GET /jobs", "List generation jobs"),
                ("GET /jobs/{pipeline_id}", "Progress and result of one job"),
                ("POST /jobs/{pipeline_id}/cancel", "Cancel a running job"),
                ("GET /health", "Health check"),
            ]);
            warp::reply::json(&ApiDocumentationResponse {
                service: "agent-codegen",
                version: env!("CARGO_PKG_VERSION"),
                endpoints,
            })
        });

        let health = warp::path!("health").and(warp::get()).map(|| {
            warp::reply::json(&HealthResponse {
                status: "healthy",
                timestamp: Utc::now(),
            })
        });

        let generate = warp::path!("generate")
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::json())
            .and(with_server.clone())
            .and_then(handle_generate);

        let generate_async = warp::path!("generate" / "async")
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::json())
            .and(with_server.clone())
            .and_then(handle_generate_async);

        let jobs = warp::path!("jobs")
            .and(warp::get())
            .and(with_server.clone())
            .and_then(handle_list_jobs);

        let job = warp::path!("jobs" / String)
            .and(warp::get())
            .and(with_server.clone())
            .and_then(handle_job_status);

        let cancel = warp::path!("jobs" / String / "cancel")
            .and(warp::post())
            .and(with_server)
            .and_then(handle_cancel);

        root.or(health)
            .or(generate)
            .or(generate_async)
            .or(jobs)
            .or(job)
            .or(cancel)
    }

    /// Serve until Ctrl-C, then cancel whatever is still running
    pub async fn run(self: Arc<Self>, addr: SocketAddr) -> Result<(), warp::Error> {
        let routes = Arc::clone(&self)
            .routes()
            .with(warp::cors().allow_any_origin());

        let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })?;

        info!(addr = %bound, "Starting code generation API");
        server.await;

        let cancelled = self.cancel_running().await;
        info!(cancelled, "Code generation API stopped");
        Ok(())
    }

    /// Claim `pipeline_id` for a new run. A finished job with the same id is replaced.
    async fn register(
        &self,
        pipeline_id: &str,
        progress: ProgressLog,
        canceller: RunCanceller,
    ) -> Result<(), WithStatus<Json>> {
        let mut jobs = self.jobs.write().await;
        if jobs.get(pipeline_id).is_some_and(Job::is_running) {
            return Err(error_reply(
                StatusCode::CONFLICT,
                format!("Job already running: {pipeline_id}"),
            ));
        }

        jobs.insert(
            pipeline_id.to_string(),
            Job {
                started_at: Utc::now(),
                completed_at: None,
                progress,
                canceller,
                result: None,
                output_directory: None,
            },
        );
        Ok(())
    }

    /// Write the project if configured and store the result on the job
    async fn finish(&self, result: RunResult) -> Option<String> {
        let output_directory = match &self.output_dir {
            Some(dir) if !result.generated_files.is_empty() => {
                match write_generated_files(&result.generated_files, dir, &result.pipeline_id).await
                {
                    Ok(path) => Some(path.display().to_string()),
                    Err(e) => {
                        error!(pipeline_id = %result.pipeline_id, error = %e, "Failed to write project");
                        None
                    }
                }
            }
            _ => None,
        };

        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&result.pipeline_id) {
            job.completed_at = Some(Utc::now());
            job.output_directory = output_directory.clone();
            job.result = Some(result);
        }
        output_directory
    }

    async fn cancel_running(&self) -> usize {
        let jobs = self.jobs.read().await;
        let running: Vec<&Job> = jobs.values().filter(|job| job.is_running()).collect();
        for job in &running {
            job.canceller.cancel();
        }
        running.len()
    }
}

async fn handle_generate(
    body: Value,
    server: Arc<CodegenServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let request = match parse_body(body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    let run = server.orchestrator.start(request);
    let pipeline_id = run.pipeline_id().to_string();
    if let Err(reply) = server
        .register(&pipeline_id, run.progress(), run.canceller())
        .await
    {
        return Ok(reply);
    }
    info!(pipeline_id = %pipeline_id, "Received generation request");

    let result = run.execute().await;
    let message = if result.is_success() {
        "Agent code generated successfully"
    } else {
        "Generation completed with errors"
    };
    let output_directory = server.finish(result.clone()).await;

    Ok(json_reply(
        &GenerateResponse {
            message: message.to_string(),
            output_directory,
            result,
        },
        StatusCode::OK,
    ))
}

async fn handle_generate_async(
    body: Value,
    server: Arc<CodegenServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let request = match parse_body(body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    let run = server.orchestrator.start(request);
    let pipeline_id = run.pipeline_id().to_string();
    if let Err(reply) = server
        .register(&pipeline_id, run.progress(), run.canceller())
        .await
    {
        return Ok(reply);
    }
    info!(pipeline_id = %pipeline_id, "Received async generation request");

    let background = Arc::clone(&server);
    tokio::spawn(async move {
        let result = run.execute().await;
        background.finish(result).await;
    });

    Ok(json_reply(
        &AcceptedResponse {
            check_status_url: format!("/jobs/{pipeline_id}"),
            pipeline_id,
            status: "accepted".to_string(),
            message: "Generation job started".to_string(),
        },
        StatusCode::ACCEPTED,
    ))
}

async fn handle_list_jobs(server: Arc<CodegenServer>) -> Result<WithStatus<Json>, Infallible> {
    let jobs = server.jobs.read().await;
    let mut summaries: Vec<JobSummary> = jobs
        .iter()
        .map(|(id, job)| {
            let status = job.status(id);
            JobSummary {
                pipeline_id: status.pipeline_id,
                status: status.status,
                started_at: status.started_at,
                completed_at: status.completed_at,
            }
        })
        .collect();
    summaries.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.pipeline_id.cmp(&b.pipeline_id))
    });

    Ok(json_reply(&JobList { jobs: summaries }, StatusCode::OK))
}

async fn handle_job_status(
    pipeline_id: String,
    server: Arc<CodegenServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let jobs = server.jobs.read().await;
    match jobs.get(&pipeline_id) {
        Some(job) => Ok(json_reply(&job.status(&pipeline_id), StatusCode::OK)),
        None => Ok(error_reply(
            StatusCode::NOT_FOUND,
            format!("Job not found: {pipeline_id}"),
        )),
    }
}

async fn handle_cancel(
    pipeline_id: String,
    server: Arc<CodegenServer>,
) -> Result<WithStatus<Json>, Infallible> {
    let jobs = server.jobs.read().await;
    let Some(job) = jobs.get(&pipeline_id) else {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            format!("Job not found: {pipeline_id}"),
        ));
    };
    if !job.is_running() {
        return Ok(error_reply(
            StatusCode::CONFLICT,
            format!("Job already finished: {pipeline_id}"),
        ));
    }

    warn!(pipeline_id = %pipeline_id, "Cancelling job on request");
    job.canceller.cancel();
    Ok(json_reply(&job.status(&pipeline_id), StatusCode::ACCEPTED))
}
