//! agent-codegen
//!
//! A staged code generation pipeline that turns an agent specification into a
//! runnable Google ADK agent project.
//!
//! # Overview
//!
//! A run moves through validation, planning, generation, verification and
//! packaging. Per-artifact failures are recorded as issues rather than
//! aborting the run, failing artifacts are regenerated a bounded number of
//! times, and the final status is computed from the recorded issues and the
//! presence of every planned file.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agent_codegen::config::PipelineConfig;
//! use agent_codegen::pipeline::Orchestrator;
//! use agent_codegen::testing::{sample_request, MockGenerationService};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let orchestrator = Orchestrator::new(
//!     PipelineConfig::default(),
//!     Arc::new(MockGenerationService::new()),
//! );
//!
//! let run = orchestrator.start(sample_request());
//! let progress = run.progress();
//! let result = run.execute().await;
//!
//! println!("{} after {} event(s)", result.status, progress.len());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod issues;
pub mod llm;
pub mod observability;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod server;
pub mod testing;
pub mod verify;

pub use config::PipelineConfig;
pub use error::{GenerationError, PipelineError, PipelineResult, VerificationError};
pub use issues::{IssueRecord, IssueSet, IssueView, Severity, Stage};
pub use pipeline::{Manifest, Orchestrator, PipelineRun, RunCanceller, RunResult, RunStatus};
pub use progress::{ProgressEvent, ProgressEventKind, ProgressLog};
pub use request::Request;
