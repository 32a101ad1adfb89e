//! Fixtures for building executions and evaluating stages in tests.

use serde_json::Value;

use crate::config::EngineConfig;
use crate::errors::{ContextError, PipelineBuildError, Result};
use crate::expression::FunctionRegistry;
use crate::pipeline::{
    PipelineExecution, PipelineExecutionBuilder, StageExecution, SKIP_EXPRESSION_EVALUATION,
};
use crate::stages::{
    ContextParameterProcessor, DeployManifestStage, EvaluatedStage, ExpressionAware, RunJobStage,
    StageDefinition, StageDefinitionRegistry,
};

/// A test stage builder.
#[derive(Debug, Clone)]
pub struct StageFixture {
    stage: StageExecution,
}

impl StageFixture {
    /// Creates a stage of any type.
    #[must_use]
    pub fn of_type(ref_id: impl Into<String>, stage_type: impl Into<String>) -> Self {
        Self {
            stage: StageExecution::new(ref_id, stage_type),
        }
    }

    /// Creates a `deployManifest` stage.
    #[must_use]
    pub fn deploy_manifest(ref_id: impl Into<String>) -> Self {
        Self::of_type(ref_id, DeployManifestStage::TYPE)
    }

    /// Creates a `runJob` stage.
    #[must_use]
    pub fn run_job(ref_id: impl Into<String>) -> Self {
        Self::of_type(ref_id, RunJobStage::TYPE)
    }

    /// Sets the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.stage = self.stage.with_name(name);
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.stage = self.stage.with_context(key, value);
        self
    }

    /// Sets the `manifests` context entry.
    #[must_use]
    pub fn manifests(self, manifests: Value) -> Self {
        self.context(DeployManifestStage::MANIFESTS, manifests)
    }

    /// Sets the skip flag.
    #[must_use]
    pub fn skip_expression_evaluation(self, skip: bool) -> Self {
        self.context(SKIP_EXPRESSION_EVALUATION, Value::Bool(skip))
    }

    /// Adds an output entry.
    #[must_use]
    pub fn output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.stage = self.stage.with_output(key, value);
        self
    }

    /// Adds a requisite stage.
    #[must_use]
    pub fn requires(mut self, ref_id: impl Into<String>) -> Self {
        self.stage = self.stage.with_requisite(ref_id);
        self
    }

    /// Returns the built stage.
    #[must_use]
    pub fn into_stage(self) -> StageExecution {
        self.stage
    }
}

impl From<StageFixture> for StageExecution {
    fn from(fixture: StageFixture) -> Self {
        fixture.into_stage()
    }
}

/// A test pipeline builder.
#[derive(Debug, Clone)]
pub struct PipelineFixture {
    builder: PipelineExecutionBuilder,
}

impl Default for PipelineFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineFixture {
    /// Creates a pipeline for `test-app`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: PipelineExecutionBuilder::new("test-app", "test-pipeline"),
        }
    }

    /// Selects the evaluator.
    #[must_use]
    pub fn evaluator(mut self, selector: impl Into<String>) -> Self {
        self.builder = self.builder.evaluator(selector);
        self
    }

    /// Selects the evaluator if `selector` is set.
    #[must_use]
    pub fn maybe_evaluator(self, selector: Option<&str>) -> Self {
        match selector {
            Some(selector) => self.evaluator(selector),
            None => self,
        }
    }

    /// Adds a trigger parameter.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.builder = self.builder.with_parameter(key, value);
        self
    }

    /// Adds a global context entry.
    #[must_use]
    pub fn global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.builder = self.builder.with_context(key, value);
        self
    }

    /// Adds a stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Into<StageExecution>) -> Self {
        self.builder = self.builder.stage(stage.into());
        self
    }

    /// Builds the execution.
    ///
    /// # Errors
    ///
    /// Propagates build validation failures.
    pub fn build(self) -> std::result::Result<PipelineExecution, PipelineBuildError> {
        self.builder.build()
    }
}

/// An [`ExpressionAware`] fixture with configurable processor and
/// definitions.
#[derive(Debug, Clone)]
pub struct TestExpressionAware {
    processor: ContextParameterProcessor,
    definitions: StageDefinitionRegistry,
}

impl Default for TestExpressionAware {
    fn default() -> Self {
        Self::new()
    }
}

impl TestExpressionAware {
    /// Creates a fixture with default config and built-in definitions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processor: ContextParameterProcessor::default(),
            definitions: StageDefinitionRegistry::builtins(),
        }
    }

    /// Replaces the configuration, keeping the built-in functions.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.processor = ContextParameterProcessor::new(config);
        self
    }

    /// Replaces the function library and configuration.
    #[must_use]
    pub fn with_functions(mut self, functions: FunctionRegistry, config: EngineConfig) -> Self {
        self.processor = ContextParameterProcessor::with_functions(functions, config);
        self
    }

    /// Registers an extra stage definition.
    #[must_use]
    pub fn with_definition(mut self, definition: impl StageDefinition + 'static) -> Self {
        self.definitions.register(definition);
        self
    }

    /// Evaluates the stage with `ref_id`.
    ///
    /// # Errors
    ///
    /// Fails if the stage does not exist or evaluation fails.
    pub fn evaluate(&self, execution: &PipelineExecution, ref_id: &str) -> Result<EvaluatedStage> {
        let stage = execution
            .stage_by_ref(ref_id)
            .ok_or_else(|| ContextError::StageNotFound(ref_id.to_string()))?;
        self.with_merged_context(stage, execution)
    }
}

impl ExpressionAware for TestExpressionAware {
    fn processor(&self) -> &ContextParameterProcessor {
        &self.processor
    }

    fn stage_definitions(&self) -> &StageDefinitionRegistry {
        &self.definitions
    }
}
