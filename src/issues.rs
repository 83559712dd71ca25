//! Issue accounting for a pipeline run
//!
//! Every stage records its findings here instead of aborting the run. The
//! final run status is computed from the contents of an [`IssueSet`], never
//! from whether a stage returned early.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Codes whose findings hold for the rest of a run. The artifact is not
/// regenerated and the record survives [`IssueSet::discard_paths`].
const TERMINAL_CODES: &[&str] = &["SECRET_DETECTED"];

/// Severity of a recorded finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Pipeline stage that produced an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Plan,
    Generate,
    GenerateTests,
    Verify,
    Orchestrate,
    Package,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Plan => "plan",
            Stage::Generate => "generate",
            Stage::GenerateTests => "generate_tests",
            Stage::Verify => "verify",
            Stage::Orchestrate => "orchestrate",
            Stage::Package => "package",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded error or warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub severity: Severity,
    pub stage: Stage,
    /// Machine-readable code such as `TOOL_NOT_IN_REGISTRY` or `SYNTAX_ERROR`
    pub code: String,
    pub message: String,
    /// Artifact the issue is scoped to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl IssueRecord {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// A generated secret is reported, never repaired by regeneration
    pub fn is_terminal(&self) -> bool {
        self.is_error() && TERMINAL_CODES.contains(&self.code.as_str())
    }

    /// Render the caller-facing view: `{stage, path?, code, message}`
    pub fn view(&self) -> IssueView {
        IssueView {
            stage: self.stage,
            path: self.path.clone(),
            code: self.code.clone(),
            message: self.message.clone(),
        }
    }
}

/// Caller-facing rendering of an issue in the run result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueView {
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub code: String,
    pub message: String,
}

/// Ordered collection of issues partitioned by severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSet {
    records: Vec<IssueRecord>,
}

impl IssueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an issue. Never fails.
    pub fn record(
        &mut self,
        severity: Severity,
        stage: Stage,
        code: impl Into<String>,
        message: impl Into<String>,
        path: Option<&str>,
    ) {
        self.records.push(IssueRecord {
            severity,
            stage,
            code: code.into(),
            message: message.into(),
            path: path.map(str::to_string),
        });
    }

    pub fn error(
        &mut self,
        stage: Stage,
        code: impl Into<String>,
        message: impl Into<String>,
        path: Option<&str>,
    ) {
        self.record(Severity::Error, stage, code, message, path);
    }

    pub fn warning(
        &mut self,
        stage: Stage,
        code: impl Into<String>,
        message: impl Into<String>,
        path: Option<&str>,
    ) {
        self.record(Severity::Warning, stage, code, message, path);
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(IssueRecord::is_error)
    }

    /// Error records in insertion order
    pub fn errors(&self) -> Vec<&IssueRecord> {
        self.records.iter().filter(|r| r.is_error()).collect()
    }

    /// Warning records in insertion order
    pub fn warnings(&self) -> Vec<&IssueRecord> {
        self.records.iter().filter(|r| !r.is_error()).collect()
    }

    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.records.len() - self.error_count()
    }

    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct artifact paths that carry at least one error, in first-seen order
    pub fn failing_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for record in self.records.iter().filter(|r| r.is_error()) {
            if let Some(path) = &record.path {
                if !paths.iter().any(|p| p == path) {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }

    /// Failing paths that a regeneration may repair: no terminal error on them
    pub fn retryable_paths(&self) -> Vec<String> {
        let terminal: Vec<&str> = self
            .records
            .iter()
            .filter(|r| r.is_terminal())
            .filter_map(|r| r.path.as_deref())
            .collect();
        self.failing_paths()
            .into_iter()
            .filter(|path| !terminal.contains(&path.as_str()))
            .collect()
    }

    /// Drop every issue scoped to one of `paths`. Issues without a path and
    /// terminal issues are kept.
    pub fn discard_paths(&mut self, paths: &[String]) {
        self.records.retain(|r| match &r.path {
            Some(path) => r.is_terminal() || !paths.contains(path),
            None => true,
        });
    }

    /// Move all records of `other` onto the end of this set
    pub fn extend(&mut self, other: IssueSet) {
        self.records.extend(other.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_has_no_errors() {
        let issues = IssueSet::new();
        assert!(!issues.has_errors());
        assert!(issues.is_empty());
        assert!(issues.errors().is_empty());
        assert!(issues.warnings().is_empty());
    }

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let mut issues = IssueSet::new();
        issues.warning(Stage::Generate, "UNRESOLVED_PLACEHOLDER", "left a marker", Some("agent.py"));

        assert!(!issues.has_errors());
        assert_eq!(issues.warning_count(), 1);
        assert_eq!(issues.error_count(), 0);
    }

    #[test]
    fn test_partitions_preserve_insertion_order() {
        let mut issues = IssueSet::new();
        issues.error(Stage::Validate, "A", "first", None);
        issues.warning(Stage::Validate, "B", "second", None);
        issues.error(Stage::Verify, "C", "third", Some("agent.py"));

        let errors: Vec<_> = issues.errors().iter().map(|r| r.code.clone()).collect();
        assert_eq!(errors, vec!["A", "C"]);
        assert_eq!(issues.warnings()[0].code, "B");
        assert!(issues.has_errors());
    }

    #[test]
    fn test_failing_paths_are_distinct_and_ordered() {
        let mut issues = IssueSet::new();
        issues.error(Stage::Verify, "SYNTAX_ERROR", "bad", Some("b.py"));
        issues.error(Stage::Verify, "STRUCTURAL_MISMATCH", "bad", Some("a.py"));
        issues.error(Stage::Verify, "SECRET_DETECTED", "bad", Some("b.py"));
        issues.warning(Stage::Verify, "MISSING_IMPORT", "meh", Some("c.py"));
        issues.error(Stage::Generate, "CANCELLED", "stop", None);

        assert_eq!(issues.failing_paths(), vec!["b.py", "a.py"]);
    }

    #[test]
    fn test_discard_paths_keeps_unscoped_and_other_paths() {
        let mut issues = IssueSet::new();
        issues.error(Stage::Verify, "SYNTAX_ERROR", "bad", Some("a.py"));
        issues.warning(Stage::Generate, "UNRESOLVED_PLACEHOLDER", "meh", Some("b.py"));
        issues.error(Stage::Generate, "CANCELLED", "stop", None);

        issues.discard_paths(&["a.py".to_string()]);

        assert_eq!(issues.len(), 2);
        assert!(issues.records().iter().all(|r| r.path.as_deref() != Some("a.py")));
    }

    #[test]
    fn test_secret_findings_are_not_retryable() {
        let mut issues = IssueSet::new();
        issues.error(Stage::Verify, "SYNTAX_ERROR", "bad", Some("a.py"));
        issues.error(Stage::Verify, "SECRET_DETECTED", "leak", Some("b.py"));
        issues.error(Stage::Verify, "SYNTAX_ERROR", "bad", Some("b.py"));

        assert_eq!(issues.failing_paths(), vec!["a.py", "b.py"]);
        assert_eq!(issues.retryable_paths(), vec!["a.py"]);
    }

    #[test]
    fn test_discard_paths_keeps_secret_findings() {
        let mut issues = IssueSet::new();
        issues.error(Stage::Verify, "SECRET_DETECTED", "leak", Some("a.py"));
        issues.error(Stage::Verify, "SYNTAX_ERROR", "bad", Some("a.py"));
        issues.warning(Stage::Verify, "SECRET_DETECTED", "odd", Some("a.py"));

        issues.discard_paths(&["a.py".to_string()]);

        assert_eq!(issues.len(), 1);
        assert!(issues.records()[0].is_terminal());
        assert!(issues.has_errors());
    }

    #[test]
    fn test_issue_view_serialization_omits_missing_path() {
        let mut issues = IssueSet::new();
        issues.error(Stage::Validate, "MISSING_ACTIONS", "actions is required", None);

        let json = serde_json::to_value(issues.errors()[0].view()).unwrap();
        assert_eq!(json["stage"], "validate");
        assert_eq!(json["code"], "MISSING_ACTIONS");
        assert!(json.get("path").is_none());
    }
}
