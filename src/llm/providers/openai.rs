//! OpenAI chat completions API
//!
//! Retries are owned by the generation coordinator, so every call here is a
//! single request.

use crate::llm::provider::{Completion, CompletionRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = super::http_client("OpenAI", &config.api_key, config.timeout)?;
        Ok(Self { config, client })
    }

    fn chat_body(request: &CompletionRequest) -> ChatBody<'_> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatTurn {
                role: "system",
                content: &request.system,
            });
        }
        messages.push(ChatTurn {
            role: "user",
            content: &request.prompt,
        });

        ChatBody {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    /// A choice with null content yields empty text, which the service reports
    fn into_completion(reply: ChatReply) -> Result<Completion, LlmError> {
        let Some(choice) = reply.choices.into_iter().next() else {
            return Err(LlmError::InvalidResponse(
                "No choices returned from OpenAI".to_string(),
            ));
        };

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            model: reply.model,
            output_tokens: reply.usage.completion_tokens,
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = Self::chat_body(&request);
        debug!(model = %request.model, "Sending OpenAI chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("OpenAI", status, &error_text));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Self::into_completion(reply)
    }
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: String,
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    completion_tokens: u32,
}
