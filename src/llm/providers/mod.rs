//! HTTP completion providers

pub mod anthropic;
pub mod openai;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};

use crate::llm::provider::LlmError;
use std::time::Duration;

/// Shared client setup; an empty key fails before any request is made
fn http_client(provider: &str, api_key: &str, timeout: Duration) -> Result<reqwest::Client, LlmError> {
    if api_key.is_empty() {
        return Err(LlmError::NotConfigured(format!("{provider} API key is required")));
    }
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::NetworkError(e.to_string()))
}
