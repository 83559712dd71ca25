//! Anthropic Messages API

use crate::llm::provider::{Completion, CompletionRequest, LlmError, LlmProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// The Messages API requires an explicit limit
const DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Value of the `anthropic-version` header
    pub version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            timeout: Duration::from_secs(120),
            version: "2023-06-01".to_string(),
        }
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
        let client = super::http_client("Anthropic", &config.api_key, config.timeout)?;
        Ok(Self { config, client })
    }

    fn messages_body(request: &CompletionRequest) -> MessagesBody<'_> {
        MessagesBody {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: (!request.system.is_empty()).then_some(request.system.as_str()),
            messages: [UserTurn {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        }
    }

    /// Concatenate the text blocks; tool or image blocks carry no file content
    fn into_completion(reply: MessagesReply) -> Result<Completion, LlmError> {
        let mut text_blocks = reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .peekable();
        if text_blocks.peek().is_none() {
            return Err(LlmError::InvalidResponse(
                "No text content returned from Anthropic".to_string(),
            ));
        }
        let text: String = text_blocks.map(|block| block.text).collect();

        Ok(Completion {
            text,
            model: reply.model,
            output_tokens: reply.usage.output_tokens,
            truncated: reply.stop_reason.as_deref() == Some("max_tokens"),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let body = Self::messages_body(&request);
        debug!(model = %request.model, max_tokens = body.max_tokens, "Sending Anthropic messages request");

        let response = self
            .client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.version)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status("Anthropic", status, &error_text));
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Self::into_completion(reply)
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [UserTurn<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: ReplyUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ReplyUsage {
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(system: &str) -> CompletionRequest {
        CompletionRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            system: system.to_string(),
            prompt: "Generate agent.py".to_string(),
            max_tokens: None,
            temperature: Some(0.2),
        }
    }

    fn reply(value: serde_json::Value) -> MessagesReply {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let result = AnthropicProvider::new(AnthropicConfig::default());
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }

    #[test]
    fn test_body_carries_system_and_single_user_turn() {
        let request = request("Reply with file content only.");
        let body = serde_json::to_value(AnthropicProvider::messages_body(&request)).unwrap();

        assert_eq!(body["system"], "Reply with file content only.");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(
            body["messages"],
            json!([{"role": "user", "content": "Generate agent.py"}])
        );
    }

    #[test]
    fn test_empty_system_is_omitted() {
        let request = CompletionRequest {
            temperature: None,
            ..request("")
        };
        let body = serde_json::to_value(AnthropicProvider::messages_body(&request)).unwrap();

        assert!(body.get("system").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_text_blocks_are_joined() {
        let completion = AnthropicProvider::into_completion(reply(json!({
            "content": [
                {"type": "text", "text": "import os\n"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "print(os.name)\n"}
            ],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 9}
        })))
        .unwrap();

        assert_eq!(completion.text, "import os\nprint(os.name)\n");
        assert_eq!(completion.output_tokens, 9);
        assert!(!completion.truncated);
    }

    #[test]
    fn test_token_limit_marks_truncation() {
        let completion = AnthropicProvider::into_completion(reply(json!({
            "content": [{"type": "text", "text": "def f(:"}],
            "model": "m",
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 3, "output_tokens": 8192}
        })))
        .unwrap();
        assert!(completion.truncated);
    }

    #[test]
    fn test_reply_without_text_is_invalid() {
        let result = AnthropicProvider::into_completion(reply(json!({
            "content": [],
            "model": "m",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 0}
        })));
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }
}
