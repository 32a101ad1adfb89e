//! Builder for pipeline executions with validation.

use super::dag;
use super::execution::{PipelineExecution, StageExecution};
use crate::errors::PipelineBuildError;
use crate::expression::EvaluatorVersion;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// Builder for [`PipelineExecution`].
///
/// Stages may reference requisites declared later; references are checked
/// when [`build`](Self::build) runs.
#[derive(Debug, Clone)]
pub struct PipelineExecutionBuilder {
    id: Option<Uuid>,
    application: String,
    name: String,
    start_time: Option<DateTime<Utc>>,
    evaluator: Option<String>,
    trigger: Map<String, Value>,
    context: Map<String, Value>,
    stages: Vec<StageExecution>,
}

impl PipelineExecutionBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(application: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            application: application.into(),
            name: name.into(),
            start_time: None,
            evaluator: None,
            trigger: Map::new(),
            context: Map::new(),
            stages: Vec::new(),
        }
    }

    /// Uses a fixed run id instead of a random one.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Uses a fixed start time instead of now.
    #[must_use]
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Selects the evaluator by its textual selector, e.g. `"v3"`.
    #[must_use]
    pub fn evaluator(mut self, selector: impl Into<String>) -> Self {
        self.evaluator = Some(selector.into());
        self
    }

    /// Replaces the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Map<String, Value>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Adds a trigger parameter under `trigger.parameters`.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        let parameters = self
            .trigger
            .entry("parameters")
            .or_insert_with(|| Value::Object(Map::new()));
        if !parameters.is_object() {
            *parameters = Value::Object(Map::new());
        }
        if let Value::Object(map) = parameters {
            map.insert(key.into(), value);
        }
        self
    }

    /// Adds a global context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Adds a stage.
    #[must_use]
    pub fn stage(mut self, stage: StageExecution) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validates and builds the execution.
    ///
    /// # Errors
    ///
    /// Fails on an unknown evaluator selector, a duplicated refId, a
    /// requisite that names no stage, or a requisite cycle.
    pub fn build(self) -> Result<PipelineExecution, PipelineBuildError> {
        let evaluator = EvaluatorVersion::parse_selector(self.evaluator.as_deref())?;

        let mut index = HashMap::with_capacity(self.stages.len());
        for (position, stage) in self.stages.iter().enumerate() {
            if index.insert(stage.ref_id().to_string(), position).is_some() {
                return Err(PipelineBuildError::DuplicateRefId(stage.ref_id().to_string()));
            }
        }

        for stage in &self.stages {
            for requisite in stage.requisite_stage_ref_ids() {
                if !index.contains_key(requisite) {
                    return Err(PipelineBuildError::UnknownRequisite {
                        stage: stage.ref_id().to_string(),
                        requisite: requisite.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = detect_cycle(&self.stages, &index) {
            return Err(PipelineBuildError::RequisiteCycle(cycle));
        }

        let execution = PipelineExecution {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            application: self.application,
            name: self.name,
            start_time: self.start_time.unwrap_or_else(Utc::now),
            evaluator,
            trigger: self.trigger,
            context: self.context,
            stages: self.stages,
            index,
        };

        debug!(
            execution_id = %execution.id,
            stages = execution.stages.len(),
            evaluator = ?execution.evaluator,
            "Built pipeline execution"
        );
        Ok(execution)
    }
}

/// Returns the first requisite cycle found, closed by repeating its start.
fn detect_cycle(stages: &[StageExecution], index: &HashMap<String, usize>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();

    // declaration order keeps the reported cycle stable
    for stage in stages {
        if !visited.contains(stage.ref_id()) {
            if let Some(cycle) = dfs_cycle(
                stage.ref_id(),
                stages,
                index,
                &mut visited,
                &mut on_stack,
                &mut path,
            ) {
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs_cycle(
    node: &str,
    stages: &[StageExecution],
    index: &HashMap<String, usize>,
    visited: &mut HashSet<String>,
    on_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    on_stack.insert(node.to_string());
    path.push(node.to_string());

    for requisite in dag::requisites_of(node, stages, index) {
        if !visited.contains(requisite) {
            if let Some(cycle) = dfs_cycle(requisite, stages, index, visited, on_stack, path) {
                return Some(cycle);
            }
        } else if on_stack.contains(requisite) {
            let start = path.iter().position(|n| n == requisite).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(requisite.clone());
            return Some(cycle);
        }
    }

    path.pop();
    on_stack.remove(node);
    None
}
