//! Generation service seam
//!
//! The coordinator treats content generation as an opaque text oracle keyed by
//! artifact role. [`LlmGenerationService`] is the production implementation on
//! top of an [`LlmProvider`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::LlmSection;
use crate::error::GenerationError;
use crate::llm::provider::{CompletionRequest, LlmError, LlmProvider};
use crate::pipeline::planner::ArtifactRole;

/// One request to the generation service
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub role: ArtifactRole,
    pub path: String,
    pub prompt: String,
    /// Slice of the agent specification relevant to this artifact
    pub context: Value,
}

/// External text generation service
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    /// Produce raw content for one artifact
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Generation service backed by an LLM provider, with model fallback
pub struct LlmGenerationService {
    provider: Arc<dyn LlmProvider>,
    models: Vec<String>,
    system_prompt: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl LlmGenerationService {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            models: vec![model.into()],
            system_prompt: LlmSection::default().system_prompt,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &LlmSection) -> Self {
        let mut models = vec![config.model.clone()];
        models.extend(
            config
                .fallback_models
                .iter()
                .filter(|m| **m != config.model)
                .cloned(),
        );

        Self {
            provider,
            models,
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_fallback_models(mut self, fallbacks: Vec<String>) -> Self {
        self.models.extend(fallbacks);
        self
    }

    /// Models in the order they are tried
    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn user_prompt(request: &GenerationRequest) -> String {
        let context = serde_json::to_string_pretty(&request.context).unwrap_or_default();
        format!("{}\n\nStructured context (JSON):\n{}", request.prompt, context)
    }
}

#[async_trait]
impl GenerationService for LlmGenerationService {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let prompt = Self::user_prompt(&request);
        let mut last_error = LlmError::NotConfigured("no model configured".to_string());

        for model in &self.models {
            let completion = CompletionRequest {
                model: model.clone(),
                system: self.system_prompt.clone(),
                prompt: prompt.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            debug!(
                provider = self.provider.name(),
                model = %model,
                path = %request.path,
                "Requesting artifact content"
            );

            match self.provider.complete(completion).await {
                Ok(completion) => {
                    if completion.truncated {
                        // verification decides whether the cut-off text is usable
                        warn!(
                            path = %request.path,
                            model = %completion.model,
                            output_tokens = completion.output_tokens,
                            "Completion stopped at the token limit"
                        );
                    }
                    if completion.text.trim().is_empty() {
                        return Err(GenerationError::EmptyResponse);
                    }
                    return Ok(completion.text);
                }
                Err(LlmError::ModelNotFound(msg)) => {
                    warn!(model = %model, error = %msg, "Model not available, trying next fallback");
                    last_error = LlmError::ModelNotFound(msg);
                }
                Err(e) => return Err(GenerationError::Service(e)),
            }
        }

        Err(GenerationError::Service(last_error))
    }
}
