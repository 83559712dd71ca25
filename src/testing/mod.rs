//! Testing utilities and mock implementations
//!
//! Lets pipeline runs be exercised end to end without a live LLM provider.

pub mod mocks;

pub use mocks::*;
