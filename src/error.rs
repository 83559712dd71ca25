//! Error taxonomy for the generation pipeline
//!
//! Only [`PipelineError`] interrupts a run. Generation and verification
//! failures are per-artifact and end up as issues in the run's issue set.

use crate::llm::provider::LlmError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Run-level failures that stop the pipeline or prevent it from starting
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed with {count} error(s)")]
    Validation { count: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Generation service unavailable: {0}")]
    ServiceUnavailable(#[from] LlmError),
}

/// Per-artifact generation failures. Recorded, never fatal to the batch.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation service error: {0}")]
    Service(#[from] LlmError),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation service returned empty content")]
    EmptyResponse,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Generation task failed: {0}")]
    TaskFailed(String),
}

impl GenerationError {
    /// Machine-readable issue code
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Service(_) => "GENERATION_FAILED",
            GenerationError::Timeout(_) => "GENERATION_TIMEOUT",
            GenerationError::EmptyResponse => "EMPTY_RESPONSE",
            GenerationError::Cancelled => "CANCELLED",
            GenerationError::TaskFailed(_) => "GENERATION_FAILED",
        }
    }

    /// Whether another attempt at the same artifact may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Service(e) => matches!(
                e,
                LlmError::NetworkError(_) | LlmError::RateLimitExceeded(_)
            ) || matches!(e, LlmError::ApiError(msg) if msg.contains("server error")),
            GenerationError::Timeout(_) => true,
            GenerationError::EmptyResponse
            | GenerationError::Cancelled
            | GenerationError::TaskFailed(_) => false,
        }
    }
}

/// Per-artifact verification failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("No content was generated")]
    MissingContent,

    #[error("Syntax error at line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("Potential hardcoded secret ({pattern}) at line {line}: {preview}")]
    SecretDetected {
        pattern: &'static str,
        line: usize,
        preview: String,
    },

    #[error("Missing expected import: {0}")]
    MissingImport(String),
}

impl VerificationError {
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::MissingContent => "MISSING_CONTENT",
            VerificationError::SyntaxError { .. } => "SYNTAX_ERROR",
            VerificationError::StructuralMismatch(_) => "STRUCTURAL_MISMATCH",
            VerificationError::SecretDetected { .. } => "SECRET_DETECTED",
            VerificationError::MissingImport(_) => "MISSING_IMPORT",
        }
    }
}

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("static regex is valid")
});

static SENSITIVE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("static regex is valid")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Redact credentials and sensitive paths from a message before it is recorded
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_ASSIGNMENT
        .replace_all(message, "${1}=***")
        .to_string();
    sanitized = SENSITIVE_PATH
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], suffix);
    }

    sanitized
}

pub type PipelineResult<T> = Result<T, PipelineError>;
