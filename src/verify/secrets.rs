//! High-confidence secret detection
//!
//! Findings are reported with a redacted preview. Content is never rewritten.

use once_cell::sync::Lazy;
use regex::Regex;

/// Definition of a secret pattern
#[derive(Debug, Clone, Copy)]
pub struct SecretPatternDef {
    /// Unique identifier for the pattern (e.g., "aws_access_key")
    pub id: &'static str,
    pub category: &'static str,
    pub regex: &'static str,
    pub description: &'static str,
}

/// Canonical pattern table
pub static SECRET_PATTERNS: &[SecretPatternDef] = &[
    SecretPatternDef {
        id: "credential_assignment",
        category: "Generic Credentials",
        regex: r#"(?i)[A-Za-z0-9_]*(?:api[_-]?key|secret|password|passwd|token|access[_-]?key)[A-Za-z0-9_]*["']?\s*[:=]\s*["']([A-Za-z0-9_\-+/=.]{16,})["']"#,
        description: "Credential-like identifier assigned a long literal",
    },
    SecretPatternDef {
        id: "aws_access_key",
        category: "AWS Credentials",
        regex: r"\bAKIA[0-9A-Z]{16}\b",
        description: "AWS access key IDs",
    },
    SecretPatternDef {
        id: "github_token",
        category: "Source Control",
        regex: r"\bgh[pousr]_[A-Za-z0-9]{36,}\b",
        description: "GitHub personal access and app tokens",
    },
    SecretPatternDef {
        id: "openai_api_key",
        category: "API Keys",
        regex: r"\bsk-(?:proj-|ant-)?[A-Za-z0-9_\-]{20,}",
        description: "OpenAI and Anthropic style secret keys",
    },
    SecretPatternDef {
        id: "google_api_key",
        category: "API Keys",
        regex: r"\bAIza[0-9A-Za-z_\-]{35}\b",
        description: "Google API keys",
    },
    SecretPatternDef {
        id: "slack_token",
        category: "API Keys",
        regex: r"\bxox[abprs]-[A-Za-z0-9\-]{10,}",
        description: "Slack bot, user and app tokens",
    },
    SecretPatternDef {
        id: "private_key",
        category: "Private Keys",
        regex: r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY(?: BLOCK)?-----",
        description: "PEM private key headers",
    },
];

static COMPILED: Lazy<Vec<(SecretPatternDef, Regex)>> = Lazy::new(|| {
    SECRET_PATTERNS
        .iter()
        .map(|def| {
            (
                *def,
                Regex::new(def.regex).expect("secret pattern table holds valid regexes"),
            )
        })
        .collect()
});

/// A single secret finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMatch {
    pub pattern: &'static str,
    pub line: usize,
    pub preview: String,
}

/// Show the first few characters of a match and mask the rest
pub fn redact(matched: &str) -> String {
    let visible: String = matched.chars().take(4).collect();
    format!("{visible}****")
}

/// Literal values that look like documentation placeholders rather than keys
fn is_placeholder(value: &str) -> bool {
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_alpha = value.chars().any(|c| c.is_ascii_alphabetic());
    let lower = value.to_ascii_lowercase();
    !has_digit
        || !has_alpha
        || ["your", "example", "placeholder", "changeme", "xxxx"]
            .iter()
            .any(|marker| lower.contains(marker))
}

/// Scan content line by line against the pattern table
pub fn scan(content: &str) -> Vec<SecretMatch> {
    let mut matches = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        for (def, regex) in COMPILED.iter() {
            let Some(caps) = regex.captures(line) else {
                continue;
            };
            let value = caps.get(1).or_else(|| caps.get(0));
            let Some(value) = value else {
                continue;
            };
            if def.id == "credential_assignment" && is_placeholder(value.as_str()) {
                continue;
            }
            matches.push(SecretMatch {
                pattern: def.id,
                line: idx + 1,
                preview: redact(value.as_str()),
            });
        }
    }

    matches
}
