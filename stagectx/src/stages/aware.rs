//! Stages that evaluate expressions in their merged context.

use super::{ContextParameterProcessor, StageDefinitionRegistry};
use crate::context::{merged_context, resolution_environment};
use crate::errors::{ContextError, Result};
use crate::expression::EvaluatorVersion;
use crate::observability::stage_span;
use crate::pipeline::{PipelineExecution, StageExecution};
use crate::policy::policy_for;
use crate::walker::EvaluationSummary;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// A stage view carrying its evaluated context.
///
/// The source stage is left untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedStage {
    /// RefId of the source stage.
    pub ref_id: String,
    /// Type of the source stage.
    #[serde(rename = "type")]
    pub stage_type: String,
    /// Evaluator version that was applied.
    pub version: EvaluatorVersion,
    /// The merged and evaluated context.
    pub context: Map<String, Value>,
    /// What happened during evaluation.
    pub summary: EvaluationSummary,
}

/// Gives a stage type access to its merged, evaluated context.
///
/// Implementors supply the processor and the stage definitions; the merge,
/// policy resolution and walk are provided.
pub trait ExpressionAware {
    /// The processor used to evaluate contexts.
    fn processor(&self) -> &ContextParameterProcessor;

    /// Definitions declaring governed fields per stage type.
    fn stage_definitions(&self) -> &StageDefinitionRegistry;

    /// Merges and evaluates the context of `stage`.
    ///
    /// The stage is looked up in `execution` by refId and that copy supplies
    /// the context, the skip flag and the span fields.
    ///
    /// # Errors
    ///
    /// Fails if `stage` is not part of `execution`, and on non-recoverable
    /// evaluation errors.
    fn with_merged_context(
        &self,
        stage: &StageExecution,
        execution: &PipelineExecution,
    ) -> Result<EvaluatedStage> {
        let stage = execution
            .stage_by_ref(stage.ref_id())
            .ok_or_else(|| ContextError::StageNotFound(stage.ref_id().to_string()))?;
        let _span = stage_span(stage, execution).entered();
        let processor = self.processor();
        let merged = merged_context(stage, execution)?;
        let env = resolution_environment(&merged, stage, execution);
        let policy = policy_for(
            stage,
            execution,
            self.stage_definitions(),
            processor.config(),
        );

        let (context, summary) =
            processor.process(&merged, &env, policy.version, &policy.skip)?;

        debug!(
            stage = stage.ref_id(),
            evaluated = summary.evaluated,
            skipped = summary.skipped.len(),
            failures = summary.failures.len(),
            "Evaluated stage context"
        );

        Ok(EvaluatedStage {
            ref_id: stage.ref_id().to_string(),
            stage_type: stage.stage_type().to_string(),
            version: policy.version,
            context,
            summary,
        })
    }
}

/// Default [`ExpressionAware`] implementation over a shared processor and
/// registry.
#[derive(Debug, Clone)]
pub struct StageContextEvaluator {
    processor: ContextParameterProcessor,
    definitions: StageDefinitionRegistry,
}

impl Default for StageContextEvaluator {
    fn default() -> Self {
        Self::new(ContextParameterProcessor::default())
    }
}

impl StageContextEvaluator {
    /// Creates an evaluator with the built-in stage definitions.
    #[must_use]
    pub fn new(processor: ContextParameterProcessor) -> Self {
        Self::with_definitions(processor, StageDefinitionRegistry::builtins())
    }

    /// Creates an evaluator with custom stage definitions.
    #[must_use]
    pub fn with_definitions(
        processor: ContextParameterProcessor,
        definitions: StageDefinitionRegistry,
    ) -> Self {
        Self {
            processor,
            definitions,
        }
    }
}

impl ExpressionAware for StageContextEvaluator {
    fn processor(&self) -> &ContextParameterProcessor {
        &self.processor
    }

    fn stage_definitions(&self) -> &StageDefinitionRegistry {
        &self.definitions
    }
}
