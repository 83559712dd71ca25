//! Pipeline configuration
//!
//! Loaded from TOML. Every section is optional and falls back to defaults,
//! so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::progress::reporter::ProgressVerbosity;

/// Providers the generation service can be backed by
pub const SUPPORTED_PROVIDERS: &[&str] = &["anthropic", "openai"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub output: OutputSection,
}

/// Backing model for the generation service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name ("anthropic" or "openai")
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Models tried in order when the primary model is not available
    #[serde(default)]
    pub fallback_models: Vec<String>,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the provider's API base URL
    pub base_url: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Optional temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_temperature() -> Option<f32> {
    Some(0.2)
}

fn default_max_tokens() -> Option<u32> {
    Some(8192)
}

fn default_system_prompt() -> String {
    "You are an expert Python developer generating production-ready agent code. \
     Reply with file content only."
        .to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            fallback_models: Vec::new(),
            api_key_env: default_api_key_env(),
            base_url: None,
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Concurrency, timeout and per-artifact retry policy for generation calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSection {
    /// Maximum in-flight calls to the generation service
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout of a single generation call in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra tries for a transient per-artifact failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    /// Backoff step between tries in milliseconds (multiplied by the try number)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_retry_attempts() -> usize {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl GenerationSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Regeneration passes allowed after a failed verification
    #[serde(default = "default_max_verification_retries")]
    pub max_verification_retries: u32,
    #[serde(default)]
    pub progress_verbosity: ProgressVerbosity,
}

fn default_max_verification_retries() -> u32 {
    2
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_verification_retries: default_max_verification_retries(),
            progress_verbosity: ProgressVerbosity::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannerSection {
    /// Plan `setup.sh` and `run.sh`
    #[serde(default = "default_true")]
    pub include_scripts: bool,
    /// Plan the generated pytest suite
    #[serde(default = "default_true")]
    pub include_tests: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            include_scripts: true,
            include_tests: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSection {
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

fn default_output_directory() -> String {
    "./generated_agents".to_string()
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Unsupported LLM provider '{}', expected one of {}",
                self.llm.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }

        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature must be between 0.0 and 2.0, got {temperature}"
                )));
            }
        }

        if self.generation.max_concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "generation.max_concurrency must be at least 1".to_string(),
            ));
        }

        if self.generation.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "generation.request_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the LLM API key from the configured environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.llm.api_key_env.clone()))
    }
}
