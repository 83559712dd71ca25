//! Pipeline orchestrator
//!
//! Sequences validation, planning, generation and verification for one
//! request, runs the bounded repair loop, and fixes the final status from
//! the recorded issues rather than from how control flow ended.
//!
//! ```text
//! Validating -> Planning -> Generating -> Verifying -> Packaging -> Done
//!     |                        ^              |
//!     v                        +- Retrying <--+   (failing artifacts only)
//!   Failed
//! ```

use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use crate::config::PipelineConfig;
use crate::issues::{IssueSet, Stage};
use crate::llm::service::GenerationService;
use crate::pipeline::generator::GenerationCoordinator;
use crate::pipeline::packager::{self, RunResult};
use crate::pipeline::planner::{ArtifactPlan, ArtifactPlanner, RolePlanner};
use crate::pipeline::state::{Phase, PipelineState, RunStatus};
use crate::pipeline::validator;
use crate::progress::{ProgressEventKind, ProgressLog};
use crate::request::Request;
use crate::run_span;
use crate::verify::{ArtifactVerifier, StaticVerifier};

/// Builds and drives pipeline runs. Cheap to share across concurrent runs.
#[derive(Clone)]
pub struct Orchestrator {
    config: PipelineConfig,
    service: Arc<dyn GenerationService>,
    planner: Arc<dyn ArtifactPlanner>,
    verifier: Arc<dyn ArtifactVerifier>,
}

impl Orchestrator {
    /// Create an orchestrator with the role planner and static verifier
    pub fn new(config: PipelineConfig, service: Arc<dyn GenerationService>) -> Self {
        let planner = Arc::new(RolePlanner::new(&config.planner));
        Self {
            config,
            service,
            planner,
            verifier: Arc::new(StaticVerifier::new()),
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn ArtifactPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ArtifactVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Prepare a run without executing it
    ///
    /// The returned run already exposes its progress log and canceller, so a
    /// caller can attach observers before calling [`PipelineRun::execute`].
    pub fn start(&self, request: Request) -> PipelineRun {
        let (cancel_tx, cancel_rx) = watch::channel(false);

        PipelineRun {
            state: PipelineState::new(request),
            coordinator: GenerationCoordinator::new(
                Arc::clone(&self.service),
                self.config.generation.clone(),
            ),
            planner: Arc::clone(&self.planner),
            verifier: Arc::clone(&self.verifier),
            max_retries: self.config.pipeline.max_verification_retries,
            output_dir: self.config.output.directory.clone(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// Start and execute a run to completion
    pub async fn run(&self, request: Request) -> RunResult {
        self.start(request).execute().await
    }
}

/// Handle that cancels an in-progress run
#[derive(Debug, Clone)]
pub struct RunCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl RunCanceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One prepared pipeline run
pub struct PipelineRun {
    state: PipelineState,
    coordinator: GenerationCoordinator,
    planner: Arc<dyn ArtifactPlanner>,
    verifier: Arc<dyn ArtifactVerifier>,
    max_retries: u32,
    output_dir: String,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl PipelineRun {
    pub fn pipeline_id(&self) -> &str {
        self.state.pipeline_id()
    }

    /// Shared handle to the run's progress log
    pub fn progress(&self) -> ProgressLog {
        self.state.progress.clone()
    }

    pub fn canceller(&self) -> RunCanceller {
        RunCanceller {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Execute every stage and return the packaged result
    pub async fn execute(mut self) -> RunResult {
        let span = run_span!(self.state.pipeline_id());
        async move {
            info!(
                agent = %self.state.request.agent_spec.name,
                max_retries = self.max_retries,
                "Starting pipeline run"
            );

            if !self.validate() {
                return packager::rejected(&self.state);
            }

            self.plan();
            self.generate_and_verify().await;

            self.state.phase = Phase::Packaging;
            let status = self.state.finalize_status();
            info!(
                status = %status,
                attempts = self.state.attempts,
                retries = self.state.retries,
                errors = self.state.issues.error_count(),
                warnings = self.state.issues.warning_count(),
                "Pipeline run finished"
            );

            let result = packager::package(&self.state, &self.output_dir);
            self.state.phase = Phase::Done;
            result
        }
        .instrument(span)
        .await
    }

    /// Returns false when the request was rejected
    fn validate(&mut self) -> bool {
        self.state.phase = Phase::Validating;
        let errors = validator::validate(
            &self.state.request,
            &mut self.state.issues,
            &self.state.progress,
        );
        if errors == 0 {
            return true;
        }

        warn!(errors, "Request rejected by validation");
        self.state.phase = Phase::Failed;
        self.state.status = RunStatus::Error;
        self.state.progress.emit_with(
            ProgressEventKind::Error,
            format!("Validation failed with {errors} error(s)"),
            json!({ "stage": Stage::Validate, "errors": errors }),
        );
        false
    }

    fn plan(&mut self) {
        self.state.phase = Phase::Planning;
        self.state
            .progress
            .emit(ProgressEventKind::PlanningProject, "Planning project");

        self.state.plans = self.planner.plan(&self.state.request);
        debug!(
            paths = ?self.state.plans.iter().map(|p| p.path.as_str()).collect::<Vec<_>>(),
            "Planned artifacts"
        );

        if self.state.plans.is_empty() {
            self.state.issues.warning(
                Stage::Plan,
                "EMPTY_PLAN",
                "No artifacts were planned for this request",
                None,
            );
        }
    }

    /// Generation and verification passes until clean, out of retries, or cancelled
    async fn generate_and_verify(&mut self) {
        let request = Arc::clone(&self.state.request);
        let mut subset: Vec<ArtifactPlan> = self.state.plans.clone();
        let mut attempt_issues = IssueSet::new();

        loop {
            self.state.phase = Phase::Generating;
            self.state.attempts += 1;

            let generated = self
                .coordinator
                .generate(
                    &request,
                    &subset,
                    &mut self.state.files,
                    &mut attempt_issues,
                    &self.state.progress,
                    self.cancel_rx.clone(),
                )
                .await;
            if let Err(e) = generated {
                warn!(attempt = self.state.attempts, error = %e, "Generation interrupted");
                break;
            }

            self.state.phase = Phase::Verifying;
            self.state.progress.emit_with(
                ProgressEventKind::RunningSanityChecks,
                format!("Running sanity checks on {} file(s)", subset.len()),
                json!({ "attempt": self.state.attempts, "count": subset.len() }),
            );

            let mut verified = IssueSet::new();
            self.verifier.verify(&subset, &self.state.files, &mut verified);
            let new_errors = verified.error_count();
            attempt_issues.extend(verified);

            if new_errors == 0 {
                debug!(attempt = self.state.attempts, "Verification passed");
                break;
            }
            if self.state.retries >= self.max_retries {
                warn!(
                    retries = self.state.retries,
                    errors = attempt_issues.error_count(),
                    "Verification retries exhausted, packaging with errors"
                );
                break;
            }

            // secret findings stand; only the rest is regenerated
            let failing = attempt_issues.retryable_paths();
            let retry: Vec<ArtifactPlan> = self
                .state
                .plans
                .iter()
                .filter(|plan| failing.contains(&plan.path))
                .cloned()
                .collect();
            if retry.is_empty() {
                debug!("No failing artifact can be repaired by regeneration");
                break;
            }

            self.state.phase = Phase::Retrying;
            self.state.retries += 1;
            info!(
                retry = self.state.retries,
                artifacts = retry.len(),
                "Regenerating artifacts that failed verification"
            );

            for plan in &retry {
                self.state.files.remove(&plan.path);
            }
            attempt_issues.discard_paths(&failing);
            subset = retry;
        }

        self.state.issues.extend(attempt_issues);
    }
}
