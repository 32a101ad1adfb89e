//! Error types for stagectx.
//!
//! Expression failures are split by how callers recover from them: syntax,
//! reference and call errors can be recovered per field, while structural and
//! budget errors abort the evaluation call. Pipeline build problems are
//! reported before any evaluation happens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stagectx operations.
#[derive(Debug, Error)]
pub enum StagectxError {
    /// Evaluating an expression or walking a context failed.
    #[error("{0}")]
    Expression(#[from] ExpressionError),

    /// The pipeline execution could not be built.
    #[error("{0}")]
    PipelineBuild(#[from] PipelineBuildError),

    /// Assembling a stage's merged context failed.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Diagnostic metadata attached to errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "EXPR-001-SYNTAX").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::Value::String(self.code.clone()));
        map.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::Value::String(hint.clone()));
        }
        if !self.context.is_empty() {
            let context_map: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context_map));
        }

        map
    }
}

/// Errors raised while evaluating expressions or walking a context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// The marker or the expression inside it is malformed.
    #[error("Syntax error at offset {position} in '{expression}': {message}")]
    Syntax {
        /// The expression text.
        expression: String,
        /// Byte offset of the problem.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A variable, property or function could not be resolved.
    #[error("Unresolved reference '{reference}'")]
    UnresolvedReference {
        /// The name that failed to resolve.
        reference: String,
    },

    /// A function was called with the wrong arity or argument types.
    #[error("Function '#{function}' failed: {reason}")]
    FunctionCall {
        /// The function name.
        function: String,
        /// The reason for failure.
        reason: String,
    },

    /// An operator was applied to operands of the wrong type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// The structure nests deeper than the configured limit.
    #[error("Structure at '{path}' exceeds maximum depth {max_depth}; possible reference cycle")]
    CyclicStructure {
        /// Path of the node where the limit was hit.
        path: String,
        /// The configured limit.
        max_depth: usize,
    },

    /// The step or wall-clock budget was exhausted.
    #[error("Evaluation budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A field failed to evaluate and the walk was aborted.
    ///
    /// Raised for every failure in strict mode and for budget exhaustion in
    /// any mode.
    #[error("Failed to evaluate '{expression}' at '{path}': {source}")]
    FieldEvaluation {
        /// Path of the field.
        path: String,
        /// The raw string that was evaluated.
        expression: String,
        /// The underlying failure.
        source: Box<ExpressionError>,
    },
}

impl ExpressionError {
    /// Creates a syntax error.
    #[must_use]
    pub fn syntax(
        expression: impl Into<String>,
        position: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Syntax {
            expression: expression.into(),
            position,
            message: message.into(),
        }
    }

    /// Creates an unresolved reference error.
    #[must_use]
    pub fn unresolved(reference: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
        }
    }

    /// Creates a function call error.
    #[must_use]
    pub fn function_call(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FunctionCall {
            function: function.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error may be recovered by leaving the field unresolved.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Syntax { .. }
            | Self::UnresolvedReference { .. }
            | Self::FunctionCall { .. }
            | Self::TypeMismatch(_) => true,
            Self::CyclicStructure { .. } | Self::BudgetExceeded(_) => false,
            Self::FieldEvaluation { source, .. } => source.is_recoverable(),
        }
    }

    /// The underlying failure, looking through field attribution.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::FieldEvaluation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns diagnostic metadata for the error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Self::Syntax { expression, .. } => ErrorInfo::new("EXPR-001-SYNTAX", self.to_string())
                .with_fix_hint(
                    "Check that every '${' has a matching '}' and string literals are closed.",
                )
                .with_context_entry("expression", expression),
            Self::UnresolvedReference { reference } => {
                ErrorInfo::new("EXPR-002-UNRESOLVED", self.to_string())
                    .with_fix_hint(
                        "Make sure the key exists in the stage, ancestor or pipeline context.",
                    )
                    .with_context_entry("reference", reference)
            }
            Self::FunctionCall { function, .. } => {
                ErrorInfo::new("EXPR-003-FUNCTION", self.to_string())
                    .with_context_entry("function", function)
            }
            Self::TypeMismatch(_) => ErrorInfo::new("EXPR-004-TYPE", self.to_string()),
            Self::CyclicStructure { path, .. } => ErrorInfo::new("EXPR-005-CYCLE", self.to_string())
                .with_fix_hint("Flatten the context or raise max_depth.")
                .with_context_entry("path", path),
            Self::BudgetExceeded(_) => ErrorInfo::new("EXPR-006-BUDGET", self.to_string())
                .with_fix_hint("Simplify the expression or raise max_steps / timeout_ms."),
            Self::FieldEvaluation {
                path,
                expression,
                source,
            } => source
                .error_info()
                .with_context_entry("path", path)
                .with_context_entry("field_expression", expression),
        }
    }
}

/// Errors raised while building a pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineBuildError {
    /// The evaluator version selector is not recognised.
    #[error("Policy misconfiguration: unknown expression evaluator version '{selector}'")]
    PolicyMisconfiguration {
        /// The rejected selector.
        selector: String,
    },

    /// Two stages share a refId.
    #[error("Duplicate stage refId '{0}'")]
    DuplicateRefId(String),

    /// A stage requires a refId that does not exist.
    #[error("Stage '{stage}' requires unknown stage '{requisite}'")]
    UnknownRequisite {
        /// The requiring stage.
        stage: String,
        /// The missing refId.
        requisite: String,
    },

    /// Requisite refIds form a cycle.
    #[error("Cycle detected in stage requisites: {}", .0.join(" -> "))]
    RequisiteCycle(Vec<String>),
}

impl PipelineBuildError {
    /// Returns diagnostic metadata for the error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Self::PolicyMisconfiguration { selector } => {
                ErrorInfo::new("BUILD-001-EVALUATOR", self.to_string())
                    .with_fix_hint("Use 'v3', 'v4' or leave the selector unset.")
                    .with_context_entry("selector", selector)
            }
            Self::DuplicateRefId(ref_id) => ErrorInfo::new("BUILD-002-DUPLICATE", self.to_string())
                .with_context_entry("ref_id", ref_id),
            Self::UnknownRequisite { stage, requisite } => {
                ErrorInfo::new("BUILD-003-MISSING_REQUISITE", self.to_string())
                    .with_fix_hint("Add the requisite stage before the stage that depends on it.")
                    .with_context_entry("stage", stage)
                    .with_context_entry("requisite", requisite)
            }
            Self::RequisiteCycle(path) => ErrorInfo::new("BUILD-004-CYCLE", self.to_string())
                .with_fix_hint("Remove one of the requisites in the cycle to break it.")
                .with_context_entry("cycle", path.join(" -> ")),
        }
    }
}

/// Errors raised while assembling a stage's merged context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The stage is not part of the execution.
    #[error("Stage '{0}' not found in execution")]
    StageNotFound(String),
}

/// Result alias for stagectx operations.
pub type Result<T> = std::result::Result<T, StagectxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_creation() {
        let info = ErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "deploy");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"deploy".to_string()));
    }

    #[test]
    fn test_error_info_to_dict() {
        let dict = ErrorInfo::new("X", "y").with_context_entry("k", "v").to_dict();
        assert_eq!(dict.get("code").unwrap(), "X");
        assert_eq!(dict.get("context").unwrap()["k"], "v");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ExpressionError::unresolved("foo").is_recoverable());
        assert!(ExpressionError::syntax("${", 0, "unterminated").is_recoverable());
        assert!(!ExpressionError::BudgetExceeded("steps".into()).is_recoverable());
        assert!(!ExpressionError::CyclicStructure {
            path: "a".into(),
            max_depth: 1
        }
        .is_recoverable());
    }

    #[test]
    fn test_field_evaluation_carries_path() {
        let err = ExpressionError::FieldEvaluation {
            path: "manifests[0].metadata.name".into(),
            expression: "${missing}".into(),
            source: Box::new(ExpressionError::unresolved("missing")),
        };
        let message = err.to_string();
        assert!(message.contains("manifests[0].metadata.name"));
        assert!(message.contains("${missing}"));
        assert_eq!(err.error_info().code, "EXPR-002-UNRESOLVED");
        assert_eq!(
            err.error_info().context.get("path"),
            Some(&"manifests[0].metadata.name".to_string())
        );
    }

    #[test]
    fn test_root_cause_looks_through_attribution() {
        let budget = ExpressionError::BudgetExceeded("more than 2 evaluation steps".into());
        let err = ExpressionError::FieldEvaluation {
            path: "spec.replicas".into(),
            expression: "${1 + 2 + 3}".into(),
            source: Box::new(budget.clone()),
        };
        assert_eq!(err.root_cause(), &budget);
        assert!(!err.is_recoverable());
        assert_eq!(budget.root_cause(), &budget);
    }

    #[test]
    fn test_requisite_cycle_message() {
        let err = PipelineBuildError::RequisiteCycle(vec!["1".into(), "2".into(), "1".into()]);
        assert!(err.to_string().contains("1 -> 2 -> 1"));
        assert_eq!(err.error_info().code, "BUILD-004-CYCLE");
    }

    #[test]
    fn test_policy_misconfiguration_converts() {
        let err: StagectxError = PipelineBuildError::PolicyMisconfiguration {
            selector: "v9".into(),
        }
        .into();
        assert!(err.to_string().contains("v9"));
    }
}
