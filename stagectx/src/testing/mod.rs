//! Testing utilities for stage context evaluation.
//!
//! This module provides:
//! - Pipeline and stage fixture builders
//! - An expression-aware fixture with configurable definitions
//! - Assertions over evaluated stages

mod assertions;
mod fixtures;

pub use assertions::{assert_context_value, assert_fully_evaluated, assert_key_unchanged};
pub use fixtures::{PipelineFixture, StageFixture, TestExpressionAware};
