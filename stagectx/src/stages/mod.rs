//! Stage definitions and expression-aware stage evaluation.
//!
//! Stage types declare the context keys they govern. Evaluation merges a
//! stage's context, resolves its policy and walks the result through a
//! [`ContextParameterProcessor`].

mod aware;
#[cfg(test)]
mod deploy_manifest_tests;
mod definition;
mod processor;

pub use aware::{EvaluatedStage, ExpressionAware, StageContextEvaluator};
pub use definition::{DeployManifestStage, RunJobStage, StageDefinition, StageDefinitionRegistry};
pub use processor::ContextParameterProcessor;
