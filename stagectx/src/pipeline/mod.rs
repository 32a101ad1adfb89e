//! Pipeline executions and their stages.
//!
//! This module provides:
//! - The stage and execution model
//! - An execution builder with requisite validation
//! - Deterministic ancestor traversal

mod builder;
mod dag;
mod execution;

pub use builder::PipelineExecutionBuilder;
pub use execution::{PipelineExecution, StageExecution, SKIP_EXPRESSION_EVALUATION};
