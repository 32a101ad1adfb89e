//! Evaluation of a stage context against a resolution environment.

use crate::config::EngineConfig;
use crate::errors::ExpressionError;
use crate::expression::{
    EvaluatorVersion, ExpressionEvaluator, FunctionRegistry, ResolutionEnvironment,
};
use crate::policy::SkipPredicate;
use crate::walker::{EvaluationSummary, StructuralWalker, WalkLimits};
use serde_json::{Map, Value};

/// Walks stage contexts with a fixed function library and configuration.
///
/// Holds no per-call state; one processor can serve any number of threads.
#[derive(Debug, Clone, Default)]
pub struct ContextParameterProcessor {
    evaluator: ExpressionEvaluator,
    config: EngineConfig,
}

impl ContextParameterProcessor {
    /// Creates a processor with the built-in function library.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_functions(FunctionRegistry::builtins(), config)
    }

    /// Creates a processor with a custom function library.
    #[must_use]
    pub fn with_functions(functions: FunctionRegistry, config: EngineConfig) -> Self {
        let evaluator = ExpressionEvaluator::new(functions)
            .with_max_steps(config.max_steps)
            .with_timeout(config.timeout());
        Self { evaluator, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the underlying evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    /// Evaluates every string in `context`, leaving paths matched by `skip`
    /// untouched.
    ///
    /// # Errors
    ///
    /// Fails on structural errors and budget exhaustion, and on any field
    /// failure in strict mode.
    pub fn process(
        &self,
        context: &Map<String, Value>,
        env: &ResolutionEnvironment,
        version: EvaluatorVersion,
        skip: &SkipPredicate,
    ) -> Result<(Map<String, Value>, EvaluationSummary), ExpressionError> {
        StructuralWalker::new(&self.evaluator, env, version, WalkLimits::from(&self.config))
            .walk_map(context, |path| skip.matches(path))
    }
}
