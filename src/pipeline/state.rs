//! Per-run pipeline state
//!
//! One [`PipelineState`] is threaded through the stages of a run. Stages run
//! strictly one after another, so the state is never shared mutably.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::VerificationError;
use crate::issues::{IssueSet, Stage};
use crate::pipeline::planner::ArtifactPlan;
use crate::progress::ProgressLog;
use crate::request::Request;

/// Terminal status of a run. A run that finished is never left `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Success,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// Orchestrator state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Validating,
    Planning,
    Generating,
    Verifying,
    Retrying,
    Packaging,
    Done,
    /// Absorbing state, reached only from `Validating`
    Failed,
}

#[derive(Debug, Clone)]
pub struct PipelineState {
    pub request: Arc<Request>,
    pub issues: IssueSet,
    pub progress: ProgressLog,
    pub plans: Vec<ArtifactPlan>,
    /// Output path to generated content
    pub files: BTreeMap<String, String>,
    /// Regeneration passes taken after failed verification
    pub retries: u32,
    /// Generation passes taken, including the first
    pub attempts: u32,
    pub status: RunStatus,
    pub phase: Phase,
}

impl PipelineState {
    pub fn new(request: Request) -> Self {
        Self {
            request: Arc::new(request),
            issues: IssueSet::new(),
            progress: ProgressLog::new(),
            plans: Vec::new(),
            files: BTreeMap::new(),
            retries: 0,
            attempts: 0,
            status: RunStatus::Pending,
            phase: Phase::Validating,
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.request.pipeline_id
    }

    /// Planned paths with no generated content, in plan order
    pub fn missing_paths(&self) -> Vec<&str> {
        self.plans
            .iter()
            .filter(|plan| !self.files.contains_key(&plan.path))
            .map(|plan| plan.path.as_str())
            .collect()
    }

    /// Fix the terminal status from the accumulated evidence
    ///
    /// A missing artifact that no earlier stage explained gets its own error,
    /// so an `error` status always comes with at least one issue.
    pub fn finalize_status(&mut self) -> RunStatus {
        let failing = self.issues.failing_paths();
        let unexplained: Vec<String> = self
            .missing_paths()
            .into_iter()
            .filter(|path| !failing.iter().any(|f| f == path))
            .map(str::to_string)
            .collect();

        for path in &unexplained {
            let missing = VerificationError::MissingContent;
            self.issues
                .error(Stage::Orchestrate, missing.code(), missing.to_string(), Some(path));
        }

        self.status = if !self.issues.has_errors() && self.missing_paths().is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Error
        };
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::planner::ArtifactRole;

    fn state_with_plans(roles: &[ArtifactRole]) -> PipelineState {
        let mut state = PipelineState::new(Request::default());
        state.plans = roles
            .iter()
            .map(|role| ArtifactPlan::for_role(*role, &state.request))
            .collect();
        state
    }

    #[test]
    fn test_new_state_is_pending() {
        let state = PipelineState::new(Request::default());
        assert_eq!(state.status, RunStatus::Pending);
        assert_eq!(state.phase, Phase::Validating);
    }

    #[test]
    fn test_all_content_and_no_errors_is_success() {
        let mut state = state_with_plans(&[ArtifactRole::Dependencies]);
        state.files.insert("requirements.txt".into(), "google-adk\n".into());

        assert_eq!(state.finalize_status(), RunStatus::Success);
        assert!(state.issues.is_empty());
    }

    #[test]
    fn test_missing_content_without_issue_is_error() {
        let mut state = state_with_plans(&[ArtifactRole::Dependencies, ArtifactRole::Documentation]);
        state.files.insert("requirements.txt".into(), "google-adk\n".into());

        assert_eq!(state.finalize_status(), RunStatus::Error);
        let errors = state.issues.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "MISSING_CONTENT");
        assert_eq!(errors[0].stage, Stage::Orchestrate);
        assert_eq!(errors[0].path.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_explained_missing_content_is_not_duplicated() {
        let mut state = state_with_plans(&[ArtifactRole::Documentation]);
        state
            .issues
            .error(Stage::Generate, "GENERATION_TIMEOUT", "timed out", Some("README.md"));

        assert_eq!(state.finalize_status(), RunStatus::Error);
        assert_eq!(state.issues.error_count(), 1);
    }

    #[test]
    fn test_warnings_do_not_block_success() {
        let mut state = state_with_plans(&[ArtifactRole::Documentation]);
        state.files.insert("README.md".into(), "# Agent\n".into());
        state
            .issues
            .warning(Stage::Generate, "UNRESOLVED_PLACEHOLDER", "1 marker", Some("README.md"));

        assert_eq!(state.finalize_status(), RunStatus::Success);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Error).unwrap(), "\"error\"");
        assert_eq!(RunStatus::Success.to_string(), "success");
    }
}
