//! Generation coordinator
//!
//! Dispatches every planned artifact to the generation service under a
//! bounded number of permits, then collects the results in plan order. A
//! failing artifact is recorded and never stops the others.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GenerationSection;
use crate::error::{sanitize_error_message, GenerationError, PipelineError};
use crate::issues::{IssueSet, Stage};
use crate::llm::service::{GenerationRequest, GenerationService};
use crate::pipeline::planner::{ArtifactPlan, ArtifactRole, ArtifactStrategy};
use crate::pipeline::postprocess::{self, ProcessedContent};
use crate::pipeline::{prompts, templates};
use crate::progress::{ProgressEvent, ProgressEventKind, ProgressLevel, ProgressLog};
use crate::request::Request;

type ArtifactResult = Result<ProcessedContent, GenerationError>;

enum Pending {
    Ready(ArtifactResult),
    Spawned(JoinHandle<ArtifactResult>),
}

impl Pending {
    fn abort(&self) {
        if let Pending::Spawned(handle) = self {
            handle.abort();
        }
    }
}

/// Everything one spawned generation task needs
struct ArtifactJob {
    service: Arc<dyn GenerationService>,
    request: Arc<Request>,
    plan: ArtifactPlan,
    timeout: Duration,
    retry_attempts: usize,
    retry_backoff: Duration,
}

impl ArtifactJob {
    async fn run(self, semaphore: Arc<Semaphore>, cancel: watch::Receiver<bool>) -> ArtifactResult {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| GenerationError::Cancelled)?;

        let prompt = prompts::build_prompt(self.plan.role, &self.request);
        let mut retries = 0;

        loop {
            if *cancel.borrow() {
                return Err(GenerationError::Cancelled);
            }

            let result = self.attempt(&prompt).await;
            match result {
                Ok(processed) => return Ok(processed),
                Err(e) if e.is_transient() && retries < self.retry_attempts => {
                    retries += 1;
                    let delay = self.retry_backoff * retries as u32;
                    warn!(
                        path = %self.plan.path,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient generation failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, prompt: &str) -> ArtifactResult {
        let request = GenerationRequest {
            role: self.plan.role,
            path: self.plan.path.clone(),
            prompt: prompt.to_string(),
            context: self.plan.context.clone(),
        };

        let raw = match tokio::time::timeout(self.timeout, self.service.generate(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(GenerationError::Timeout(self.timeout)),
        };

        let processed = postprocess::process(&raw, &self.request);
        if processed.content.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(processed)
    }
}

fn render_locally(plan: &ArtifactPlan, request: &Request) -> ArtifactResult {
    templates::render(plan.role, request)
        .map(|content| ProcessedContent {
            content,
            unresolved: Vec::new(),
        })
        .ok_or_else(|| GenerationError::TaskFailed(format!("no local template for {}", plan.role)))
}

/// Resolves once the cancel flag is raised. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn issue_stage(role: ArtifactRole) -> Stage {
    if role == ArtifactRole::TestSuite {
        Stage::GenerateTests
    } else {
        Stage::Generate
    }
}

/// Drives the generation service over a list of planned artifacts
pub struct GenerationCoordinator {
    service: Arc<dyn GenerationService>,
    settings: GenerationSection,
}

impl GenerationCoordinator {
    pub fn new(service: Arc<dyn GenerationService>, settings: GenerationSection) -> Self {
        Self { service, settings }
    }

    fn dispatch(
        &self,
        request: &Arc<Request>,
        plans: &[ArtifactPlan],
        cancel: &watch::Receiver<bool>,
    ) -> Vec<Pending> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));

        plans
            .iter()
            .map(|plan| match plan.strategy {
                ArtifactStrategy::LlmGenerated => {
                    let job = ArtifactJob {
                        service: Arc::clone(&self.service),
                        request: Arc::clone(request),
                        plan: plan.clone(),
                        timeout: self.settings.request_timeout(),
                        retry_attempts: self.settings.retry_attempts,
                        retry_backoff: self.settings.retry_backoff(),
                    };
                    Pending::Spawned(tokio::spawn(job.run(Arc::clone(&semaphore), cancel.clone())))
                }
                ArtifactStrategy::StaticTemplate | ArtifactStrategy::Copy => {
                    Pending::Ready(render_locally(plan, request))
                }
            })
            .collect()
    }

    /// Generate `plans` into `files`
    ///
    /// Per-artifact failures are recorded in `issues`. The only error returned
    /// is cancellation, after the cancellation itself has been recorded.
    pub async fn generate(
        &self,
        request: &Arc<Request>,
        plans: &[ArtifactPlan],
        files: &mut BTreeMap<String, String>,
        issues: &mut IssueSet,
        progress: &ProgressLog,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        progress.emit_with(
            ProgressEventKind::GeneratingFiles,
            format!("Generating {} file(s)", plans.len()),
            json!({ "count": plans.len() }),
        );
        info!(
            service = self.service.name(),
            artifacts = plans.len(),
            max_concurrency = self.settings.max_concurrency,
            "Starting artifact generation"
        );

        let pending = self.dispatch(request, plans, &cancel);
        let mut remaining = plans.iter().zip(pending);

        while let Some((plan, slot)) = remaining.next() {
            if *cancel.borrow() {
                slot.abort();
                remaining.for_each(|(_, rest)| rest.abort());
                return Err(Self::record_cancellation(issues, progress));
            }

            if plan.role == ArtifactRole::TestSuite {
                progress.emit_with(
                    ProgressEventKind::GeneratingTests,
                    "Generating test suite",
                    json!({ "path": plan.path }),
                );
            }
            progress.emit_with(
                ProgressEventKind::GeneratingFile,
                format!("Generating {}", plan.path),
                json!({
                    "path": plan.path,
                    "role": plan.role,
                    "strategy": plan.strategy,
                }),
            );

            let result = match slot {
                Pending::Ready(result) => result,
                Pending::Spawned(mut handle) => {
                    let joined = tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => None,
                        joined = &mut handle => Some(joined),
                    };
                    match joined {
                        Some(joined) => joined
                            .unwrap_or_else(|e| Err(GenerationError::TaskFailed(e.to_string()))),
                        None => {
                            handle.abort();
                            remaining.for_each(|(_, rest)| rest.abort());
                            return Err(Self::record_cancellation(issues, progress));
                        }
                    }
                }
            };

            Self::record_result(plan, result, files, issues, progress);
        }

        Ok(())
    }

    fn record_result(
        plan: &ArtifactPlan,
        result: ArtifactResult,
        files: &mut BTreeMap<String, String>,
        issues: &mut IssueSet,
        progress: &ProgressLog,
    ) {
        let stage = issue_stage(plan.role);

        match result {
            Ok(processed) => {
                if !processed.unresolved.is_empty() {
                    issues.warning(
                        stage,
                        "UNRESOLVED_PLACEHOLDER",
                        format!(
                            "{} unresolved placeholder marker(s): {}",
                            processed.unresolved.len(),
                            processed.unresolved.join(", ")
                        ),
                        Some(&plan.path),
                    );
                }

                debug!(path = %plan.path, bytes = processed.content.len(), "Artifact generated");
                let level = if processed.unresolved.is_empty() {
                    ProgressLevel::Success
                } else {
                    ProgressLevel::Warning
                };
                progress.push(
                    ProgressEvent::new(
                        ProgressEventKind::FileGenerated,
                        format!("Generated {}", plan.path),
                    )
                    .with_payload(json!({
                        "path": plan.path,
                        "outcome": "generated",
                        "bytes": processed.content.len(),
                    }))
                    .with_level(level),
                );
                files.insert(plan.path.clone(), processed.content);
            }
            Err(e) => {
                let message = sanitize_error_message(&e.to_string());
                warn!(path = %plan.path, code = e.code(), error = %message, "Artifact generation failed");

                issues.error(stage, e.code(), message.clone(), Some(&plan.path));
                progress.emit_with(
                    ProgressEventKind::Error,
                    format!("Failed to generate {}: {}", plan.path, message),
                    json!({ "path": plan.path, "code": e.code() }),
                );
                progress.emit_with(
                    ProgressEventKind::FileGenerated,
                    format!("Gave up on {}", plan.path),
                    json!({ "path": plan.path, "outcome": "failed" }),
                );
            }
        }
    }

    fn record_cancellation(issues: &mut IssueSet, progress: &ProgressLog) -> PipelineError {
        warn!("Run cancelled during generation");
        issues.error(
            Stage::Generate,
            "CANCELLED",
            "Run cancelled while artifacts were being generated",
            None,
        );
        progress.emit_with(
            ProgressEventKind::Error,
            "Run cancelled",
            json!({ "code": "CANCELLED" }),
        );
        PipelineError::Cancelled
    }
}
