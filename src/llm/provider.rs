//! Completion provider seam
//!
//! A completion is one system prompt and one user prompt in, one block of
//! text out. Providers translate that to their wire format and map HTTP
//! failures onto [`LlmError`], which decides between in-place retry, model
//! fallback and giving up on the artifact.

use async_trait::async_trait;
use thiserror::Error;

/// One completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    /// Standing instructions; omitted from the wire request when empty
    pub system: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Text returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model that actually answered
    pub model: String,
    pub output_tokens: u32,
    /// Generation stopped at the token limit, so the text is likely cut off
    pub truncated: bool,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

impl LlmError {
    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => {
                LlmError::AuthenticationFailed(format!("{provider} API rejected credentials: {status}"))
            }
            404 => LlmError::ModelNotFound(format!("{provider} API error: {status} - {body}")),
            429 => LlmError::RateLimitExceeded(format!("{provider} API error: {status} - {body}")),
            _ if status.is_server_error() => {
                LlmError::ApiError(format!("{provider} API server error: {status} - {body}"))
            }
            _ => LlmError::ApiError(format!("{provider} API error: {status} - {body}")),
        }
    }
}
