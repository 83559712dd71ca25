//! Structural and referential checks on an incoming request
//!
//! Every violated rule is recorded and checking continues, so one run reports
//! all of a request's problems at once.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::issues::{IssueSet, Stage};
use crate::progress::{ProgressEventKind, ProgressLog};
use crate::request::{Request, SUPPORTED_SPEC_VERSION};

/// Validate `request`, recording one issue per violation
///
/// Returns the number of errors recorded by this call.
pub fn validate(request: &Request, issues: &mut IssueSet, progress: &ProgressLog) -> usize {
    progress.emit(ProgressEventKind::ValidatingInput, "Validating input");

    let mut found = IssueSet::new();
    check_agent_fields(request, &mut found);
    check_tool_bindings(request, &mut found);
    check_actions(request, &mut found);

    let errors = found.error_count();
    if errors > 0 {
        info!(errors, "Request failed validation");
    } else {
        debug!(warnings = found.warning_count(), "Request passed validation");
    }

    issues.extend(found);
    errors
}

fn check_agent_fields(request: &Request, issues: &mut IssueSet) {
    let spec = &request.agent_spec;

    if request.agent_spec_version != SUPPORTED_SPEC_VERSION {
        issues.warning(
            Stage::Validate,
            "UNSUPPORTED_SPEC_VERSION",
            format!(
                "agent_spec_version '{}' is not '{}', generation may not match",
                request.agent_spec_version, SUPPORTED_SPEC_VERSION
            ),
            None,
        );
    }

    if spec.name.trim().is_empty() {
        issues.error(Stage::Validate, "MISSING_AGENT_NAME", "agent_spec.name is required", None);
    }
    if spec.description.trim().is_empty() {
        issues.error(
            Stage::Validate,
            "MISSING_AGENT_DESCRIPTION",
            "agent_spec.description is required",
            None,
        );
    }
    if spec.tools_required.is_empty() {
        issues.error(
            Stage::Validate,
            "MISSING_TOOLS_REQUIRED",
            "agent_spec.tools_required must list at least one tool",
            None,
        );
    }
    if spec.actions.is_empty() {
        issues.error(
            Stage::Validate,
            "MISSING_ACTIONS",
            "agent_spec.actions must list at least one action",
            None,
        );
    }
    if request.tool_registry.is_empty() {
        issues.error(Stage::Validate, "MISSING_TOOL_REGISTRY", "tool_registry is required", None);
    }
}

fn check_tool_bindings(request: &Request, issues: &mut IssueSet) {
    let mut seen = HashSet::new();

    for (idx, binding) in request.agent_spec.tools_required.iter().enumerate() {
        let slug = binding.tool_slug.trim();
        if slug.is_empty() {
            issues.error(
                Stage::Validate,
                "MISSING_TOOL_SLUG",
                format!("tools_required[{idx}] is missing tool_slug"),
                None,
            );
            continue;
        }

        if !seen.insert(slug) {
            issues.error(
                Stage::Validate,
                "DUPLICATE_TOOL_BINDING",
                format!("Tool '{slug}' is bound more than once"),
                None,
            );
        }

        if request.registry_entry(slug).is_none() {
            issues.error(
                Stage::Validate,
                "TOOL_NOT_IN_REGISTRY",
                format!("Tool '{slug}' not found in tool_registry"),
                None,
            );
        }

        if binding.auth_required && request.external_user_id(slug).is_none() {
            issues.error(
                Stage::Validate,
                "MISSING_ACCOUNT_BINDING",
                format!("Tool '{slug}' requires authorization but has no external account binding"),
                None,
            );
        }
    }
}

fn check_actions(request: &Request, issues: &mut IssueSet) {
    let bound: HashSet<&str> = request
        .agent_spec
        .tools_required
        .iter()
        .map(|b| b.tool_slug.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let mut names = HashSet::new();

    for (idx, action) in request.agent_spec.actions.iter().enumerate() {
        let label = if action.name.is_empty() {
            format!("actions[{idx}]")
        } else {
            format!("Action '{}'", action.name)
        };

        if !action.name.is_empty() && !names.insert(action.name.as_str()) {
            issues.error(
                Stage::Validate,
                "DUPLICATE_ACTION_NAME",
                format!("{label} is defined more than once"),
                None,
            );
        }

        let slug = action.tool_slug.trim();
        if slug.is_empty() {
            issues.error(
                Stage::Validate,
                "MISSING_ACTION_TOOL_SLUG",
                format!("{label} is missing tool_slug"),
                None,
            );
        } else if !bound.contains(slug) {
            issues.error(
                Stage::Validate,
                "ACTION_TOOL_NOT_IN_SPEC",
                format!("{label} references tool '{slug}' not in tools_required"),
                None,
            );
        }
    }
}
