//! Effective context of a stage.
//!
//! This module provides:
//! - Deterministic merging of global context, ancestor outputs and stage context
//! - The resolution environment handed to the expression evaluator
//! - Content fingerprints of merged contexts

mod merger;

pub use merger::{
    context_fingerprint, merged_context, resolution_environment, EXECUTION_VARIABLE,
    PARAMETERS_VARIABLE, TRIGGER_VARIABLE,
};
