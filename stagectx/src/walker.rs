//! Recursive evaluation of every string inside a nested context.

use crate::config::{EngineConfig, FailureMode};
use crate::errors::ExpressionError;
use crate::expression::{
    template, Budget, EvaluatorVersion, ExpressionEvaluator, ResolutionEnvironment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, warn};

/// One step in a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A mapping key.
    Key(String),
    /// A sequence position.
    Index(usize),
}

/// Location of a value inside a context, rendered as `manifests[0].metadata.name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// The empty path addressing the root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from segments.
    #[must_use]
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The first key, if the path starts with one.
    #[must_use]
    pub fn top_level_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    fn pop(&mut self) {
        self.segments.pop();
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i == 0 => write!(f, "{k}")?,
                PathSegment::Key(k) => write!(f, ".{k}")?,
                PathSegment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

/// A field left unresolved under lenient failure mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    /// Rendered path of the field.
    pub path: String,
    /// The raw string that failed.
    pub expression: String,
    /// The failure.
    #[serde(serialize_with = "serialize_error")]
    pub error: ExpressionError,
}

fn serialize_error<S: serde::Serializer>(error: &ExpressionError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

/// What happened during a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    /// Number of strings that contained markers and evaluated successfully.
    pub evaluated: usize,
    /// Paths copied verbatim because the skip predicate matched.
    pub skipped: Vec<String>,
    /// Fields left unresolved.
    pub failures: Vec<FieldFailure>,
}

impl EvaluationSummary {
    /// Returns true if every marker was resolved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of walking a structure.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkOutcome {
    /// The evaluated copy.
    pub value: Value,
    /// Counters and recovered failures.
    pub summary: EvaluationSummary,
}

/// Settings of the walker that are independent of the expression dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkLimits {
    /// Handling of recoverable failures.
    pub failure_mode: FailureMode,
    /// Maximum nesting depth.
    pub max_depth: usize,
}

impl From<&EngineConfig> for WalkLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            failure_mode: config.failure_mode,
            max_depth: config.max_depth,
        }
    }
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Applies the expression evaluator to every string in a structure.
///
/// Mappings keep their keys and key order, sequences keep their length and
/// order, non-string scalars pass through. The input is never mutated.
#[derive(Debug, Clone, Copy)]
pub struct StructuralWalker<'a> {
    evaluator: &'a ExpressionEvaluator,
    env: &'a ResolutionEnvironment,
    version: EvaluatorVersion,
    limits: WalkLimits,
}

struct WalkState {
    path: FieldPath,
    budget: Budget,
    summary: EvaluationSummary,
}

impl<'a> StructuralWalker<'a> {
    /// Creates a walker.
    #[must_use]
    pub fn new(
        evaluator: &'a ExpressionEvaluator,
        env: &'a ResolutionEnvironment,
        version: EvaluatorVersion,
        limits: WalkLimits,
    ) -> Self {
        Self {
            evaluator,
            env,
            version,
            limits,
        }
    }

    /// Walks `node`, copying any subtree whose path satisfies `skip` verbatim.
    ///
    /// `skip` is consulted once per path before descending, never for the root.
    pub fn walk<F>(&self, node: &Value, skip: F) -> Result<WalkOutcome, ExpressionError>
    where
        F: Fn(&FieldPath) -> bool,
    {
        let mut state = WalkState {
            path: FieldPath::root(),
            budget: self.evaluator.budget(),
            summary: EvaluationSummary::default(),
        };
        let value = self.walk_node(node, &skip, &mut state)?;
        Ok(WalkOutcome {
            value,
            summary: state.summary,
        })
    }

    /// Walks the entries of a mapping, returning the evaluated mapping.
    pub fn walk_map<F>(
        &self,
        map: &Map<String, Value>,
        skip: F,
    ) -> Result<(Map<String, Value>, EvaluationSummary), ExpressionError>
    where
        F: Fn(&FieldPath) -> bool,
    {
        let mut state = WalkState {
            path: FieldPath::root(),
            budget: self.evaluator.budget(),
            summary: EvaluationSummary::default(),
        };
        let out = self.walk_entries(map, &skip, &mut state)?;
        Ok((out, state.summary))
    }

    fn walk_node<F>(
        &self,
        node: &Value,
        skip: &F,
        state: &mut WalkState,
    ) -> Result<Value, ExpressionError>
    where
        F: Fn(&FieldPath) -> bool,
    {
        match node {
            Value::Object(map) => self.walk_entries(map, skip, state).map(Value::Object),
            Value::Array(items) => {
                self.enter_container(state)?;
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    state.path.push(PathSegment::Index(i));
                    let walked = self.walk_child(child, skip, state);
                    state.path.pop();
                    out.push(walked?);
                }
                Ok(Value::Array(out))
            }
            Value::String(raw) => self.evaluate_string(raw, state),
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(node.clone()),
        }
    }

    fn walk_entries<F>(
        &self,
        map: &Map<String, Value>,
        skip: &F,
        state: &mut WalkState,
    ) -> Result<Map<String, Value>, ExpressionError>
    where
        F: Fn(&FieldPath) -> bool,
    {
        self.enter_container(state)?;
        let mut out = Map::with_capacity(map.len());
        for (key, child) in map {
            state.path.push(PathSegment::Key(key.clone()));
            let walked = self.walk_child(child, skip, state);
            state.path.pop();
            out.insert(key.clone(), walked?);
        }
        Ok(out)
    }

    fn walk_child<F>(
        &self,
        child: &Value,
        skip: &F,
        state: &mut WalkState,
    ) -> Result<Value, ExpressionError>
    where
        F: Fn(&FieldPath) -> bool,
    {
        if skip(&state.path) {
            debug!(path = %state.path, "Skipping expression evaluation for governed field");
            state.summary.skipped.push(state.path.to_string());
            return Ok(child.clone());
        }
        self.walk_node(child, skip, state)
    }

    fn enter_container(&self, state: &WalkState) -> Result<(), ExpressionError> {
        if state.path.depth() >= self.limits.max_depth {
            return Err(ExpressionError::CyclicStructure {
                path: state.path.to_string(),
                max_depth: self.limits.max_depth,
            });
        }
        state.budget.check_deadline()
    }

    fn evaluate_string(&self, raw: &str, state: &mut WalkState) -> Result<Value, ExpressionError> {
        if !template::has_markers(raw) {
            return Ok(Value::String(raw.to_owned()));
        }
        match self
            .evaluator
            .evaluate_with_budget(raw, self.env, self.version, &mut state.budget)
        {
            Ok(value) => {
                state.summary.evaluated += 1;
                Ok(value)
            }
            Err(error)
                if !error.is_recoverable()
                    || self.limits.failure_mode == FailureMode::Strict =>
            {
                Err(ExpressionError::FieldEvaluation {
                    path: state.path.to_string(),
                    expression: raw.to_owned(),
                    source: Box::new(error),
                })
            }
            Err(error) => {
                warn!(
                    path = %state.path,
                    expression = raw,
                    error = %error,
                    "Leaving expression unresolved"
                );
                state.summary.failures.push(FieldFailure {
                    path: state.path.to_string(),
                    expression: raw.to_owned(),
                    error,
                });
                Ok(Value::String(raw.to_owned()))
            }
        }
    }
}

/// Walks `node` with the built-in library, default limits and lenient recovery.
pub fn walk<F>(
    node: &Value,
    env: &ResolutionEnvironment,
    version: EvaluatorVersion,
    skip: F,
) -> Result<Value, ExpressionError>
where
    F: Fn(&FieldPath) -> bool,
{
    let evaluator = ExpressionEvaluator::default();
    StructuralWalker::new(&evaluator, env, version, WalkLimits::default())
        .walk(node, skip)
        .map(|outcome| outcome.value)
}
