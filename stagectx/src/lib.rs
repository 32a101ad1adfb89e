//! # Stagectx
//!
//! Context expression evaluation for continuous-delivery pipeline stages.
//!
//! Before a stage runs, its context is merged with the global pipeline
//! context and the outputs of upstream stages, and every `${...}` marker
//! inside it is evaluated:
//!
//! - **Expression evaluation**: `v3` and `v4` dialects with `#function(args)` calls
//! - **Structural walking**: every string in nested maps and lists, shape preserved
//! - **Deterministic merging**: global context, ancestor outputs, stage context
//! - **Governed fields**: stage types may opt subtrees such as `manifests` out
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use stagectx::prelude::*;
//!
//! let execution = PipelineExecutionBuilder::new("orders", "deploy")
//!     .evaluator("v4")
//!     .with_parameter("env", json!("prod"))
//!     .stage(
//!         StageExecution::new("1", "deployManifest")
//!             .with_context("namespace", json!("orders-${parameters.env}")),
//!     )
//!     .build()?;
//!
//! let stage = execution.stage_by_ref("1").expect("stage exists");
//! let evaluated = StageContextEvaluator::default().with_merged_context(stage, &execution)?;
//! assert_eq!(evaluated.context["namespace"], json!("orders-prod"));
//! # Ok::<(), stagectx::errors::StagectxError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod expression;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod stages;
pub mod testing;
pub mod walker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, FailureMode};
    pub use crate::context::{context_fingerprint, merged_context, resolution_environment};
    pub use crate::errors::{
        ContextError, ErrorInfo, ExpressionError, PipelineBuildError, StagectxError,
    };
    pub use crate::expression::{
        evaluate, EvaluatorVersion, ExpressionEvaluator, Function, FunctionRegistry,
        ResolutionEnvironment,
    };
    pub use crate::observability::init_logging;
    pub use crate::pipeline::{PipelineExecution, PipelineExecutionBuilder, StageExecution};
    pub use crate::policy::{policy_for, EvaluationPolicy, SkipPredicate};
    pub use crate::stages::{
        ContextParameterProcessor, DeployManifestStage, EvaluatedStage, ExpressionAware,
        RunJobStage, StageContextEvaluator, StageDefinition, StageDefinitionRegistry,
    };
    pub use crate::walker::{walk, EvaluationSummary, FieldPath, StructuralWalker, WalkLimits};
}
