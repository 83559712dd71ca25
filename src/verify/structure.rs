//! Role conformance rules
//!
//! Each role that other generated code depends on must expose the symbol the
//! rest of the project imports.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::VerificationError;
use crate::issues::Severity;
use crate::pipeline::planner::ArtifactRole;

struct Rule {
    pattern: Regex,
    expectation: &'static str,
}

fn rule(pattern: &str, expectation: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("structural rule regex is valid"),
        expectation,
    }
}

static ROOT_AGENT: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^root_agent\s*(?::[^=\n]+)?=",
        "agent.py must assign a top-level root_agent",
    )
});

static ADK_IMPORT: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^\s*(?:from\s+google\.adk[\w.]*\s+import|import\s+google\.adk)",
        "agent.py must import from google.adk",
    )
});

static GET_AGENT_CONFIG: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^(?:async\s+)?def\s+get_agent_config\s*\(",
        "config/agent_config.py must define get_agent_config()",
    )
});

static GET_AGENT_TOOLS: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^(?:async\s+)?def\s+get_agent_tools\s*\(",
        "tools/__init__.py must define get_agent_tools()",
    )
});

static CLIENT_CLASS: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^class\s+PipedreamMCPClient\b",
        "tools/pipedream_client.py must define class PipedreamMCPClient",
    )
});

static INIT_TOOLS_SYNC: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^def\s+_init_tools_sync\s*\(",
        "tools/pipedream_tools.py must define _init_tools_sync()",
    )
});

static IMPORTS_BINDINGS: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^\s*(?:from\s+[\w.]*pipedream_tools\s+import|import\s+[\w.]*pipedream_tools)",
        "tools/__init__.py should import pipedream_tools",
    )
});

static IMPORTS_CLIENT: Lazy<Rule> = Lazy::new(|| {
    rule(
        r"(?m)^\s*(?:from\s+[\w.]*pipedream_client\s+import|import\s+[\w.]*pipedream_client)",
        "tools/pipedream_tools.py should import pipedream_client",
    )
});

fn required_rules(role: ArtifactRole) -> Vec<&'static Rule> {
    match role {
        ArtifactRole::Entrypoint => vec![&*ROOT_AGENT, &*ADK_IMPORT],
        ArtifactRole::Config => vec![&*GET_AGENT_CONFIG],
        ArtifactRole::ToolsInit => vec![&*GET_AGENT_TOOLS],
        ArtifactRole::ToolClient => vec![&*CLIENT_CLASS],
        ArtifactRole::ToolBindings => vec![&*INIT_TOOLS_SYNC],
        _ => Vec::new(),
    }
}

fn import_rules(role: ArtifactRole, with_bindings: bool) -> Vec<&'static Rule> {
    match role {
        ArtifactRole::ToolsInit if with_bindings => vec![&*IMPORTS_BINDINGS],
        ArtifactRole::ToolBindings => vec![&*IMPORTS_CLIENT],
        _ => Vec::new(),
    }
}

/// Check one artifact against the rules for its role
///
/// `with_bindings` tells whether the project contains the tool bindings
/// module, which makes importing it from `tools/__init__.py` expected.
pub fn check(
    role: ArtifactRole,
    content: &str,
    with_bindings: bool,
) -> Vec<(Severity, VerificationError)> {
    let mut findings = Vec::new();

    for rule in required_rules(role) {
        if !rule.pattern.is_match(content) {
            findings.push((
                Severity::Error,
                VerificationError::StructuralMismatch(rule.expectation.to_string()),
            ));
        }
    }

    for rule in import_rules(role, with_bindings) {
        if !rule.pattern.is_match(content) {
            findings.push((
                Severity::Warning,
                VerificationError::MissingImport(rule.expectation.to_string()),
            ));
        }
    }

    findings
}
