//! Static verification of generated artifacts
//!
//! The verifier runs three checks over each artifact: Python syntax,
//! role conformance, and secret scanning. Findings go into an [`IssueSet`]
//! scoped to the artifact path so the orchestrator can regenerate exactly the
//! artifacts that failed.

pub mod secrets;
pub mod structure;
pub mod syntax;

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::VerificationError;
use crate::issues::{IssueSet, Severity, Stage};
use crate::pipeline::planner::{ArtifactPlan, ArtifactRole};

/// Verification seam between generation and packaging
pub trait ArtifactVerifier: Send + Sync {
    /// Check the planned artifacts in `plans` against the generated `files`
    fn verify(&self, plans: &[ArtifactPlan], files: &BTreeMap<String, String>, issues: &mut IssueSet);
}

/// Default verifier backed by the syntax, structure and secret checks
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier;

impl StaticVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Run every check for one artifact
    pub fn check_artifact(
        &self,
        role: ArtifactRole,
        content: &str,
        with_bindings: bool,
    ) -> Vec<(Severity, VerificationError)> {
        let mut findings = Vec::new();

        if role.is_python() {
            if let Err(e) = syntax::check_python(content) {
                findings.push((Severity::Error, e));
            }
            findings.extend(structure::check(role, content, with_bindings));
        }

        // every artifact, including docs and env templates
        for found in secrets::scan(content) {
            findings.push((
                Severity::Error,
                VerificationError::SecretDetected {
                    pattern: found.pattern,
                    line: found.line,
                    preview: found.preview,
                },
            ));
        }

        findings
    }
}

impl ArtifactVerifier for StaticVerifier {
    fn verify(&self, plans: &[ArtifactPlan], files: &BTreeMap<String, String>, issues: &mut IssueSet) {
        let with_bindings = files.contains_key(ArtifactRole::ToolBindings.path());

        for plan in plans {
            let Some(content) = files.get(&plan.path) else {
                let missing = VerificationError::MissingContent;
                issues.error(Stage::Verify, missing.code(), missing.to_string(), Some(&plan.path));
                continue;
            };

            let findings = self.check_artifact(plan.role, content, with_bindings);
            debug!(path = %plan.path, findings = findings.len(), "Verified artifact");

            for (severity, finding) in findings {
                issues.record(
                    severity,
                    Stage::Verify,
                    finding.code(),
                    finding.to_string(),
                    Some(&plan.path),
                );
            }
        }
    }
}
