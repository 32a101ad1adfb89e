//! Evaluation of `${...}` expression markers embedded in strings.
//!
//! This module provides:
//! - Marker scanning with a cheap no-marker fast path
//! - A small expression language with `#function(args)` calls
//! - Version dispatch between the `v3` and `v4` dialects
//! - Step and wall-clock budgets for pathological input

mod budget;
mod environment;
pub mod functions;
mod interpreter;
pub mod parser;
pub mod template;
mod version;

pub use budget::Budget;
pub use environment::ResolutionEnvironment;
pub use functions::{Function, FunctionRegistry};
pub use version::EvaluatorVersion;

use crate::errors::ExpressionError;
use interpreter::{stringify, Interpreter};
use serde_json::Value;
use std::time::Duration;
use template::Segment;

/// Default limit on expression nodes visited per string.
pub const DEFAULT_MAX_STEPS: u64 = 10_000;

/// Evaluates strings containing expression markers.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    functions: FunctionRegistry,
    max_steps: u64,
    timeout: Option<Duration>,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(FunctionRegistry::builtins())
    }
}

impl ExpressionEvaluator {
    /// Creates an evaluator over the given function library.
    #[must_use]
    pub fn new(functions: FunctionRegistry) -> Self {
        Self {
            functions,
            max_steps: DEFAULT_MAX_STEPS,
            timeout: None,
        }
    }

    /// Sets the per-string step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the wall-clock limit per call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the function library.
    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Creates a fresh budget from the configured limits.
    #[must_use]
    pub fn budget(&self) -> Budget {
        Budget::new(self.max_steps, self.timeout)
    }

    /// Evaluates `raw` with a fresh budget.
    ///
    /// Strings without markers come back unchanged. A string that is exactly
    /// one marker yields the expression's native value; otherwise each marker
    /// is replaced by its text form.
    pub fn evaluate(
        &self,
        raw: &str,
        env: &ResolutionEnvironment,
        version: EvaluatorVersion,
    ) -> Result<Value, ExpressionError> {
        let mut budget = self.budget();
        self.evaluate_with_budget(raw, env, version, &mut budget)
    }

    /// Evaluates `raw`, charging work to a caller-owned budget.
    pub fn evaluate_with_budget(
        &self,
        raw: &str,
        env: &ResolutionEnvironment,
        version: EvaluatorVersion,
        budget: &mut Budget,
    ) -> Result<Value, ExpressionError> {
        if !template::has_markers(raw) {
            return Ok(Value::String(raw.to_owned()));
        }
        budget.reset_steps();

        let segments = template::split(raw)?;
        if let [Segment::Expression(source)] = segments.as_slice() {
            return self.evaluate_source(source, env, version, budget);
        }

        let mut out = String::with_capacity(raw.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expression(source) => {
                    out.push_str(&stringify(&self.evaluate_source(source, env, version, budget)?));
                }
            }
        }
        Ok(Value::String(out))
    }

    fn evaluate_source(
        &self,
        source: &str,
        env: &ResolutionEnvironment,
        version: EvaluatorVersion,
        budget: &mut Budget,
    ) -> Result<Value, ExpressionError> {
        let expr = parser::parse(source, version)?;
        Interpreter {
            env,
            functions: &self.functions,
            version,
            budget,
        }
        .eval(&expr)
    }
}

/// Evaluates `raw` with the built-in function library and default limits.
pub fn evaluate(
    raw: &str,
    env: &ResolutionEnvironment,
    version: EvaluatorVersion,
) -> Result<Value, ExpressionError> {
    ExpressionEvaluator::default().evaluate(raw, env, version)
}
