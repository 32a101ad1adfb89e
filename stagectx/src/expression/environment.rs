//! Variables and stage views visible to expressions.

use serde_json::{Map, Value};

/// The resolution environment an expression is evaluated against.
///
/// Built by the context merger from an immutable snapshot; evaluation never
/// mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionEnvironment {
    variables: Map<String, Value>,
    stages: Vec<Value>,
    current_stage: Option<Value>,
}

impl ResolutionEnvironment {
    /// Creates an environment exposing `variables` at the top level.
    #[must_use]
    pub fn new(variables: Map<String, Value>) -> Self {
        Self {
            variables,
            stages: Vec::new(),
            current_stage: None,
        }
    }

    /// Sets the stage summaries visible to `#stage` and `#judgment`.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<Value>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the summary returned by `#currentStage`.
    #[must_use]
    pub fn with_current_stage(mut self, stage: Value) -> Self {
        self.current_stage = Some(stage);
        self
    }

    /// Looks up a top-level variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Returns all top-level variables.
    #[must_use]
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Finds the first stage summary whose `name` matches.
    #[must_use]
    pub fn stage_named(&self, name: &str) -> Option<&Value> {
        self.stages
            .iter()
            .find(|s| s.get("name").and_then(Value::as_str) == Some(name))
    }

    /// Returns the summary of the stage being evaluated, if any.
    #[must_use]
    pub fn current_stage(&self) -> Option<&Value> {
        self.current_stage.as_ref()
    }
}
