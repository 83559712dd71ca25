//! The staged generation pipeline
//!
//! Stages run strictly in sequence on one [`PipelineState`]: validate,
//! plan, generate, verify (with bounded repair passes), package. Only the
//! generation stage fans out, behind a permit-bounded worker set.

pub mod generator;
pub mod orchestrator;
pub mod packager;
pub mod planner;
pub mod postprocess;
pub mod prompts;
pub mod state;
pub mod templates;
pub mod validator;

pub use generator::GenerationCoordinator;
pub use orchestrator::{Orchestrator, PipelineRun, RunCanceller};
pub use packager::{IssueSummary, Manifest, RunResult};
pub use planner::{ArtifactPlan, ArtifactPlanner, ArtifactRole, ArtifactStrategy, RolePlanner};
pub use state::{Phase, PipelineState, RunStatus};
