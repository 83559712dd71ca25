//! Final assembly of the run result
//!
//! Packaging performs no checks of its own. It renders whatever the
//! orchestrator settled on.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use crate::issues::{IssueSet, IssueView};
use crate::pipeline::planner::ArtifactRole;
use crate::pipeline::state::{PipelineState, RunStatus};
use crate::progress::{ProgressEvent, ProgressEventKind, ProgressLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueSummary {
    pub errors: usize,
    pub warnings: usize,
}

impl From<&IssueSet> for IssueSummary {
    fn from(issues: &IssueSet) -> Self {
        Self {
            errors: issues.error_count(),
            warnings: issues.warning_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub pipeline_id: String,
    /// Generated paths in plan order
    pub files: Vec<String>,
    pub run_instructions: String,
    pub expected_smoke_output: String,
    pub issue_summary: IssueSummary,
}

/// Everything a caller gets back from one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub pipeline_id: String,
    pub status: RunStatus,
    /// Absent when the request was rejected before planning
    pub manifest: Option<Manifest>,
    pub generated_files: BTreeMap<String, String>,
    pub progress_events: Vec<ProgressEvent>,
    pub errors: Vec<IssueView>,
    pub warnings: Vec<IssueView>,
    pub attempts: u32,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

fn run_instructions(state: &PipelineState, output_dir: &str) -> String {
    let has = |role: ArtifactRole| state.files.contains_key(role.path());
    let output_dir = output_dir.trim_end_matches('/');

    let mut steps = vec![format!(
        "Navigate to {}/{}/",
        output_dir,
        state.pipeline_id()
    )];
    if has(ArtifactRole::EnvTemplate) {
        steps.push("Copy .env.example to .env and fill in your credentials".to_string());
    }
    if has(ArtifactRole::SetupScript) {
        steps.push("Install dependencies: ./setup.sh".to_string());
    } else {
        steps.push("Install dependencies: pip install -r requirements.txt".to_string());
    }
    if has(ArtifactRole::RunScript) {
        steps.push("Run the agent: ./run.sh".to_string());
    } else {
        steps.push("Run the agent: adk run .".to_string());
    }
    steps.push("Or use the web UI: adk web (then select your agent from dropdown)".to_string());
    if has(ArtifactRole::TestSuite) {
        steps.push("Run the generated tests: python -m pytest test_agent.py".to_string());
    }

    steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

fn expected_smoke_output(state: &PipelineState) -> String {
    let mut lines = vec![
        "Agent should initialize successfully with:".to_string(),
        "- Google ADK agent created".to_string(),
    ];
    if state.request.uses_pipedream() {
        lines.push("- Pipedream MCP client configured".to_string());
        lines.push("- Tools loaded from Pipedream".to_string());
    }
    lines.join("\n")
}

fn issue_views(state: &PipelineState) -> (Vec<IssueView>, Vec<IssueView>) {
    let errors = state.issues.errors().into_iter().map(|r| r.view()).collect();
    let warnings = state.issues.warnings().into_iter().map(|r| r.view()).collect();
    (errors, warnings)
}

fn emit_done(state: &PipelineState) {
    let level = if state.status == RunStatus::Success {
        ProgressLevel::Success
    } else {
        ProgressLevel::Error
    };
    state.progress.push(
        ProgressEvent::new(
            ProgressEventKind::Done,
            format!("Code generation finished with status {}", state.status),
        )
        .with_level(level)
        .with_payload(json!({
            "status": state.status,
            "files_generated": state.files.len(),
            "pipeline_id": state.pipeline_id(),
        })),
    );
}

/// Assemble the manifest and run result, emitting `PACKAGING_OUTPUT` then `DONE`
pub fn package(state: &PipelineState, output_dir: &str) -> RunResult {
    state.progress.emit_with(
        ProgressEventKind::PackagingOutput,
        "Packaging output",
        json!({ "files": state.files.len() }),
    );

    let files: Vec<String> = state
        .plans
        .iter()
        .filter(|plan| state.files.contains_key(&plan.path))
        .map(|plan| plan.path.clone())
        .collect();

    let manifest = Manifest {
        pipeline_id: state.pipeline_id().to_string(),
        files,
        run_instructions: run_instructions(state, output_dir),
        expected_smoke_output: expected_smoke_output(state),
        issue_summary: IssueSummary::from(&state.issues),
    };

    info!(
        status = %state.status,
        files = manifest.files.len(),
        errors = manifest.issue_summary.errors,
        warnings = manifest.issue_summary.warnings,
        "Packaged run output"
    );
    emit_done(state);

    let (errors, warnings) = issue_views(state);
    RunResult {
        pipeline_id: state.pipeline_id().to_string(),
        status: state.status,
        manifest: Some(manifest),
        generated_files: state.files.clone(),
        progress_events: state.progress.events(),
        errors,
        warnings,
        attempts: state.attempts,
    }
}

/// Result for a run that stopped at validation. No manifest is produced.
pub fn rejected(state: &PipelineState) -> RunResult {
    emit_done(state);

    let (errors, warnings) = issue_views(state);
    RunResult {
        pipeline_id: state.pipeline_id().to_string(),
        status: state.status,
        manifest: None,
        generated_files: BTreeMap::new(),
        progress_events: state.progress.events(),
        errors,
        warnings,
        attempts: 0,
    }
}
