//! Observability for pipeline runs
//!
//! Structured logging setup and span helpers. Progress events are separate
//! (see [`crate::progress`]) and are part of the run result.

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::run_span;
