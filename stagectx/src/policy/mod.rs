//! Per-stage evaluation policy.
//!
//! Decides which evaluator version applies to a stage and which of its
//! top-level keys are copied verbatim instead of evaluated.

use crate::config::EngineConfig;
use crate::expression::EvaluatorVersion;
use crate::pipeline::{PipelineExecution, StageExecution};
use crate::stages::StageDefinitionRegistry;
use crate::walker::FieldPath;
use std::collections::BTreeSet;
use tracing::debug;

/// Decides which field paths are copied verbatim.
///
/// Only top-level keys can match; nested paths never do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipPredicate {
    governed: BTreeSet<String>,
}

impl SkipPredicate {
    /// A predicate that never matches.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// A predicate matching the given top-level keys.
    #[must_use]
    pub fn governing<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            governed: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the subtree at `path` must not be evaluated.
    #[must_use]
    pub fn matches(&self, path: &FieldPath) -> bool {
        path.depth() == 1
            && path
                .top_level_key()
                .is_some_and(|key| self.governed.contains(key))
    }

    /// Returns true if nothing is ever skipped.
    #[must_use]
    pub fn is_never(&self) -> bool {
        self.governed.is_empty()
    }

    /// Returns the governed keys.
    #[must_use]
    pub fn governed(&self) -> &BTreeSet<String> {
        &self.governed
    }
}

/// The version and skip predicate applied to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationPolicy {
    /// Evaluator version for every string in the stage.
    pub version: EvaluatorVersion,
    /// Subtrees copied verbatim.
    pub skip: SkipPredicate,
}

/// Resolves the evaluation policy for `stage`.
///
/// The version is the execution's selector, falling back to
/// `config.default_version`. Governed keys come from the stage definition
/// and `config.governed_fields`; they are skipped only when the stage's own
/// context sets `skipExpressionEvaluation`.
#[must_use]
pub fn policy_for(
    stage: &StageExecution,
    execution: &PipelineExecution,
    definitions: &StageDefinitionRegistry,
    config: &EngineConfig,
) -> EvaluationPolicy {
    let version = execution.evaluator().unwrap_or(config.default_version);

    let skip = if stage.skip_expression_evaluation() {
        let mut governed: BTreeSet<String> = definitions
            .governed_fields(stage.stage_type())
            .into_iter()
            .collect();
        if let Some(extra) = config.governed_fields.get(stage.stage_type()) {
            governed.extend(extra.iter().cloned());
        }
        SkipPredicate { governed }
    } else {
        SkipPredicate::never()
    };

    debug!(
        stage = stage.ref_id(),
        stage_type = stage.stage_type(),
        version = %version,
        selected = execution.evaluator().is_some(),
        governed = ?skip.governed,
        "Resolved evaluation policy"
    );

    EvaluationPolicy { version, skip }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineExecutionBuilder, SKIP_EXPRESSION_EVALUATION};
    use crate::walker::PathSegment;
    use serde_json::json;

    fn path(segments: &[PathSegment]) -> FieldPath {
        FieldPath::from_segments(segments.to_vec())
    }

    fn single(stage: StageExecution, selector: Option<&str>) -> (PipelineExecution, String) {
        let ref_id = stage.ref_id().to_string();
        let mut builder = PipelineExecutionBuilder::new("a", "p").stage(stage);
        if let Some(selector) = selector {
            builder = builder.evaluator(selector);
        }
        (builder.build().unwrap(), ref_id)
    }

    #[test]
    fn test_predicate_matches_top_level_only() {
        let skip = SkipPredicate::governing(["manifests"]);
        assert!(skip.matches(&path(&[PathSegment::Key("manifests".into())])));
        assert!(!skip.matches(&path(&[
            PathSegment::Key("spec".into()),
            PathSegment::Key("manifests".into())
        ])));
        assert!(!skip.matches(&path(&[
            PathSegment::Key("manifests".into()),
            PathSegment::Index(0)
        ])));
        assert!(!skip.matches(&FieldPath::root()));
        assert!(SkipPredicate::never().is_never());
    }

    #[test]
    fn test_version_falls_back_to_config() {
        let (execution, id) = single(StageExecution::new("1", "deployManifest"), None);
        let stage = execution.stage_by_ref(&id).unwrap();
        let registry = StageDefinitionRegistry::builtins();

        let policy = policy_for(stage, &execution, &registry, &EngineConfig::default());
        assert_eq!(policy.version, EvaluatorVersion::V4);

        let config = EngineConfig::new().with_default_version(EvaluatorVersion::V3);
        assert_eq!(policy_for(stage, &execution, &registry, &config).version, EvaluatorVersion::V3);
    }

    #[test]
    fn test_selector_wins_over_default() {
        let (execution, id) = single(StageExecution::new("1", "deployManifest"), Some("v3"));
        let stage = execution.stage_by_ref(&id).unwrap();
        let policy = policy_for(
            stage,
            &execution,
            &StageDefinitionRegistry::builtins(),
            &EngineConfig::default(),
        );
        assert_eq!(policy.version, EvaluatorVersion::V3);
    }

    #[test]
    fn test_flag_on_governed_type() {
        let stage = StageExecution::new("1", "deployManifest")
            .with_context(SKIP_EXPRESSION_EVALUATION, json!(true));
        let (execution, id) = single(stage, None);
        let policy = policy_for(
            execution.stage_by_ref(&id).unwrap(),
            &execution,
            &StageDefinitionRegistry::builtins(),
            &EngineConfig::default(),
        );
        assert_eq!(policy.skip, SkipPredicate::governing(["manifests"]));
    }

    #[test]
    fn test_flag_without_governed_fields_is_ignored() {
        let stage = StageExecution::new("1", "runJob")
            .with_context(SKIP_EXPRESSION_EVALUATION, json!(true));
        let (execution, id) = single(stage, None);
        let policy = policy_for(
            execution.stage_by_ref(&id).unwrap(),
            &execution,
            &StageDefinitionRegistry::builtins(),
            &EngineConfig::default(),
        );
        assert!(policy.skip.is_never());
    }

    #[test]
    fn test_config_adds_governed_fields() {
        let stage = StageExecution::new("1", "runJob")
            .with_context(SKIP_EXPRESSION_EVALUATION, json!("TRUE"));
        let (execution, id) = single(stage, None);
        let config = EngineConfig::new().with_governed_field("runJob", "manifest");
        let policy = policy_for(
            execution.stage_by_ref(&id).unwrap(),
            &execution,
            &StageDefinitionRegistry::builtins(),
            &config,
        );
        assert_eq!(policy.skip, SkipPredicate::governing(["manifest"]));
    }

    #[test]
    fn test_no_flag_means_no_skipping() {
        let (execution, id) = single(StageExecution::new("1", "deployManifest"), None);
        let policy = policy_for(
            execution.stage_by_ref(&id).unwrap(),
            &execution,
            &StageDefinitionRegistry::builtins(),
            &EngineConfig::default(),
        );
        assert!(policy.skip.is_never());
    }
}
