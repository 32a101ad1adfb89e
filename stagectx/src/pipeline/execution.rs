//! Pipeline runs and the stages inside them.

use crate::expression::EvaluatorVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Context key holding the per-stage skip flag.
pub const SKIP_EXPRESSION_EVALUATION: &str = "skipExpressionEvaluation";

/// One stage of a pipeline run.
///
/// The declared context is fixed once the stage is built; evaluation always
/// produces a new copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecution {
    ref_id: String,
    #[serde(rename = "type")]
    stage_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    context: Map<String, Value>,
    #[serde(default)]
    outputs: Map<String, Value>,
    #[serde(default)]
    requisite_stage_ref_ids: Vec<String>,
}

impl StageExecution {
    /// Creates a stage; its name defaults to the refId.
    #[must_use]
    pub fn new(ref_id: impl Into<String>, stage_type: impl Into<String>) -> Self {
        let ref_id = ref_id.into();
        Self {
            name: ref_id.clone(),
            ref_id,
            stage_type: stage_type.into(),
            context: Map::new(),
            outputs: Map::new(),
            requisite_stage_ref_ids: Vec::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Replaces the whole context.
    #[must_use]
    pub fn with_context_map(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Adds an output entry.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Adds a requisite stage.
    #[must_use]
    pub fn with_requisite(mut self, ref_id: impl Into<String>) -> Self {
        self.requisite_stage_ref_ids.push(ref_id.into());
        self
    }

    /// Returns the refId.
    #[must_use]
    pub fn ref_id(&self) -> &str {
        &self.ref_id
    }

    /// Returns the stage type.
    #[must_use]
    pub fn stage_type(&self) -> &str {
        &self.stage_type
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared context.
    #[must_use]
    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Returns the outputs.
    #[must_use]
    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    /// Returns the refIds this stage requires.
    #[must_use]
    pub fn requisite_stage_ref_ids(&self) -> &[String] {
        &self.requisite_stage_ref_ids
    }

    /// Raw value of the skip flag, `false` when absent.
    #[must_use]
    pub fn skip_expression_evaluation(&self) -> bool {
        self.context
            .get(SKIP_EXPRESSION_EVALUATION)
            .is_some_and(crate::expression::functions::builtins::coerce_bool)
    }

    /// Summary exposed to expressions through `#stage` and `#currentStage`.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "refId": self.ref_id,
            "type": self.stage_type,
            "name": self.name,
            "context": self.context,
            "outputs": self.outputs,
            "requisiteStageRefIds": self.requisite_stage_ref_ids,
        })
    }
}

/// A pipeline run.
///
/// Built through [`super::PipelineExecutionBuilder`]; the evaluator selector is
/// validated there and cannot change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineExecution {
    pub(crate) id: Uuid,
    pub(crate) application: String,
    pub(crate) name: String,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) evaluator: Option<EvaluatorVersion>,
    pub(crate) trigger: Map<String, Value>,
    pub(crate) context: Map<String, Value>,
    pub(crate) stages: Vec<StageExecution>,
    pub(crate) index: HashMap<String, usize>,
}

impl PipelineExecution {
    /// Returns the run id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the application name.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns when the run started.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Returns the selected evaluator, `None` when unset.
    #[must_use]
    pub fn evaluator(&self) -> Option<EvaluatorVersion> {
        self.evaluator
    }

    /// Returns the trigger.
    #[must_use]
    pub fn trigger(&self) -> &Map<String, Value> {
        &self.trigger
    }

    /// Returns the global pipeline context.
    #[must_use]
    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Returns all stages in declaration order.
    #[must_use]
    pub fn stages(&self) -> &[StageExecution] {
        &self.stages
    }

    /// Finds a stage by refId.
    #[must_use]
    pub fn stage_by_ref(&self, ref_id: &str) -> Option<&StageExecution> {
        self.index.get(ref_id).map(|&i| &self.stages[i])
    }

    /// Summary exposed to expressions as `execution`.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "application": self.application,
            "name": self.name,
            "startTime": self.start_time.timestamp_millis(),
            "evaluator": self.evaluator.map(|v| v.to_string()),
        })
    }
}
