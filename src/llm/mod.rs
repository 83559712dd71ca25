//! LLM provider abstraction and the generation service built on it
//!
//! The pipeline only talks to [`GenerationService`]. [`LlmGenerationService`]
//! adapts any [`LlmProvider`] to that seam.

pub mod provider;
pub mod providers;
pub mod service;

pub use provider::*;
pub use providers::*;
pub use service::{GenerationRequest, GenerationService, LlmGenerationService};
