//! Engine configuration.

use crate::errors::StagectxError;
use crate::expression::{EvaluatorVersion, DEFAULT_MAX_STEPS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How recoverable per-field failures are handled during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Leave the failing string unresolved and record the failure.
    #[default]
    Lenient,
    /// Abort the walk on the first failure.
    Strict,
}

/// Configuration for context evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluator used when the execution does not select one.
    pub default_version: EvaluatorVersion,
    /// Handling of recoverable field failures.
    pub failure_mode: FailureMode,
    /// Maximum expression nodes visited per string.
    pub max_steps: u64,
    /// Wall-clock limit per walk in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Maximum nesting depth of a context structure.
    pub max_depth: usize,
    /// Extra governed top-level fields per stage type.
    pub governed_fields: BTreeMap<String, Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_version: EvaluatorVersion::V4,
            failure_mode: FailureMode::Lenient,
            max_steps: DEFAULT_MAX_STEPS,
            timeout_ms: None,
            max_depth: 128,
            governed_fields: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Creates a new engine config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a config from JSON, filling omitted fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, StagectxError> {
        serde_json::from_str(json).map_err(|e| StagectxError::Config(e.to_string()))
    }

    /// Sets the default evaluator version.
    #[must_use]
    pub fn with_default_version(mut self, version: EvaluatorVersion) -> Self {
        self.default_version = version;
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the per-string step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the maximum structure depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Declares a governed top-level field for a stage type.
    #[must_use]
    pub fn with_governed_field(
        mut self,
        stage_type: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.governed_fields
            .entry(stage_type.into())
            .or_default()
            .push(field.into());
        self
    }

    /// Returns the wall-clock limit as a duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_version, EvaluatorVersion::V4);
        assert_eq!(config.failure_mode, FailureMode::Lenient);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_default_version(EvaluatorVersion::V3)
            .with_failure_mode(FailureMode::Strict)
            .with_timeout_ms(250)
            .with_governed_field("runJob", "manifest");

        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.governed_fields["runJob"], vec!["manifest".to_string()]);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json_str(
            r#"{
                "default_version": "v3",
                "failure_mode": "strict",
                "governed_fields": {"bake": ["template"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.default_version, EvaluatorVersion::V3);
        assert_eq!(config.failure_mode, FailureMode::Strict);
        assert_eq!(config.max_depth, 128);
        assert_eq!(config.governed_fields["bake"], vec!["template".to_string()]);
    }

    #[test]
    fn test_from_json_rejects_unknown_version() {
        let err = EngineConfig::from_json_str(r#"{"default_version": "v9"}"#).unwrap_err();
        assert!(matches!(err, StagectxError::Config(_)));
    }
}
