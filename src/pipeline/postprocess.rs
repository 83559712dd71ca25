//! Cleanup of raw generation service output

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::pipeline::prompts::default_app_slug;
use crate::request::Request;

static AGENT_NAME_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*agent_name\s*\}\}").expect("static regex is valid"));

static AGENT_DESCRIPTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*agent_description\s*\}\}").expect("static regex is valid"));

static TOOL_SLUG_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*[A-Za-z_][A-Za-z0-9_\.\[\]]*\.tool_slug\s*\}\}")
        .expect("static regex is valid")
});

static ANY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^{}]+\}\}").expect("static regex is valid"));

/// Post-processed artifact content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedContent {
    pub content: String,
    /// Placeholder markers still present after substitution
    pub unresolved: Vec<String>,
}

/// Remove a single markdown fence wrapping the whole response
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return "",
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Trim, unwrap, and substitute known placeholders
pub fn process(raw: &str, request: &Request) -> ProcessedContent {
    let stripped = strip_code_fence(raw);

    let ident = request.agent_identifier();
    let content = AGENT_NAME_MARKER.replace_all(stripped, NoExpand(&ident));
    let content = AGENT_DESCRIPTION_MARKER
        .replace_all(&content, NoExpand(&request.agent_spec.description));
    let content = TOOL_SLUG_MARKER
        .replace_all(&content, NoExpand(default_app_slug(request)))
        .trim()
        .to_string();

    let unresolved = ANY_MARKER
        .find_iter(&content)
        .map(|m| m.as_str().to_string())
        .collect();

    ProcessedContent {
        content,
        unresolved,
    }
}
