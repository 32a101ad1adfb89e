//! Assembly of the effective context a stage sees.

use crate::errors::ContextError;
use crate::expression::ResolutionEnvironment;
use crate::pipeline::{PipelineExecution, StageExecution};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Variable holding the execution summary.
pub const EXECUTION_VARIABLE: &str = "execution";
/// Variable holding the trigger.
pub const TRIGGER_VARIABLE: &str = "trigger";
/// Variable holding the trigger parameters.
pub const PARAMETERS_VARIABLE: &str = "parameters";

/// Merges global context, ancestor outputs and the stage's own context.
///
/// Later sources win on key collision: ancestor outputs override the global
/// context and the stage's own context overrides everything. Among
/// ancestors, nearer stages (by shortest requisite distance) override
/// farther ones, even across sibling branches. Merging is shallow.
///
/// # Errors
///
/// Returns [`ContextError::StageNotFound`] if `stage` is not part of
/// `execution`.
pub fn merged_context(
    stage: &StageExecution,
    execution: &PipelineExecution,
) -> Result<Map<String, Value>, ContextError> {
    let stage = execution
        .stage_by_ref(stage.ref_id())
        .ok_or_else(|| ContextError::StageNotFound(stage.ref_id().to_string()))?;

    let mut merged = execution.context().clone();
    for ancestor in execution.ancestors(stage) {
        for (key, value) in ancestor.outputs() {
            merged.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in stage.context() {
        merged.insert(key.clone(), value.clone());
    }
    Ok(merged)
}

/// Builds the environment expressions in `stage` resolve against.
///
/// Top-level variables are the merged keys plus `execution`, `trigger` and
/// `parameters`; the reserved names take precedence over merged keys.
#[must_use]
pub fn resolution_environment(
    merged: &Map<String, Value>,
    stage: &StageExecution,
    execution: &PipelineExecution,
) -> ResolutionEnvironment {
    let mut variables = merged.clone();
    variables.insert(EXECUTION_VARIABLE.to_string(), execution.summary());
    variables.insert(
        TRIGGER_VARIABLE.to_string(),
        Value::Object(execution.trigger().clone()),
    );
    variables.insert(
        PARAMETERS_VARIABLE.to_string(),
        execution
            .trigger()
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
    );

    ResolutionEnvironment::new(variables)
        .with_stages(execution.stages().iter().map(StageExecution::summary).collect())
        .with_current_stage(stage.summary())
}

/// Stable SHA-256 digest of a context, hex encoded.
///
/// Key order is part of the digest, so two merges of the same execution
/// always agree.
#[must_use]
pub fn context_fingerprint(context: &Map<String, Value>) -> String {
    let canonical = Value::Object(context.clone()).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineExecutionBuilder;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn execution() -> PipelineExecution {
        PipelineExecutionBuilder::new("orders", "deploy")
            .with_context("region", json!("global"))
            .with_context("owner", json!("platform"))
            .with_parameter("env", json!("prod"))
            .stage(
                StageExecution::new("1", "bake")
                    .with_output("region", json!("from-bake"))
                    .with_output("image", json!("orders:1")),
            )
            .stage(
                StageExecution::new("2", "runJob")
                    .with_requisite("1")
                    .with_output("image", json!("orders:2")),
            )
            .stage(
                StageExecution::new("3", "deployManifest")
                    .with_requisite("2")
                    .with_context("owner", json!("team-orders"))
                    .with_context("execution", json!("shadowed")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        let execution = execution();
        let stage = execution.stage_by_ref("3").unwrap();
        let merged = merged_context(stage, &execution).unwrap();

        assert_eq!(merged["region"], json!("from-bake"));
        assert_eq!(merged["image"], json!("orders:2"));
        assert_eq!(merged["owner"], json!("team-orders"));
    }

    #[test]
    fn test_direct_requisite_beats_ancestor_on_other_branch() {
        let execution = PipelineExecutionBuilder::new("orders", "deploy")
            .stage(StageExecution::new("far", "bake").with_output("k", json!("far")))
            .stage(StageExecution::new("near", "bake").with_output("k", json!("near")))
            .stage(StageExecution::new("mid", "wait").with_requisite("far"))
            .stage(
                StageExecution::new("x", "deployManifest")
                    .with_requisite("near")
                    .with_requisite("mid"),
            )
            .build()
            .unwrap();

        let merged = merged_context(execution.stage_by_ref("x").unwrap(), &execution).unwrap();
        assert_eq!(merged["k"], json!("near"));
    }

    #[test]
    fn test_unrelated_stage_outputs_are_invisible() {
        let execution = execution();
        let stage = execution.stage_by_ref("1").unwrap();
        let merged = merged_context(stage, &execution).unwrap();

        assert_eq!(merged["region"], json!("global"));
        assert!(!merged.contains_key("image"));
    }

    #[test]
    fn test_unknown_stage() {
        let execution = execution();
        let stranger = StageExecution::new("99", "wait");
        assert_eq!(
            merged_context(&stranger, &execution).unwrap_err(),
            ContextError::StageNotFound("99".to_string())
        );
    }

    #[test]
    fn test_reserved_names_win() {
        let execution = execution();
        let stage = execution.stage_by_ref("3").unwrap();
        let merged = merged_context(stage, &execution).unwrap();
        let env = resolution_environment(&merged, stage, &execution);

        assert_eq!(env.variable("execution").unwrap()["application"], json!("orders"));
        assert_eq!(env.variable("parameters").unwrap()["env"], json!("prod"));
        assert_eq!(env.variable("trigger").unwrap()["parameters"]["env"], json!("prod"));
        assert_eq!(env.current_stage().unwrap()["refId"], json!("3"));
        assert_eq!(env.stage_named("1").unwrap()["outputs"]["image"], json!("orders:1"));
    }

    #[test]
    fn test_parameters_default_to_empty() {
        let execution = PipelineExecutionBuilder::new("a", "p")
            .stage(StageExecution::new("1", "wait"))
            .build()
            .unwrap();
        let stage = execution.stage_by_ref("1").unwrap();
        let env = resolution_environment(&Map::new(), stage, &execution);
        assert_eq!(env.variable("parameters"), Some(&json!({})));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let execution = execution();
        let stage = execution.stage_by_ref("3").unwrap();
        let first = merged_context(stage, &execution).unwrap();
        let second = merged_context(stage, &execution).unwrap();

        assert_eq!(first, second);
        assert_eq!(context_fingerprint(&first), context_fingerprint(&second));
        assert_eq!(context_fingerprint(&first).len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let mut context = Map::new();
        context.insert("a".to_string(), json!(1));
        let before = context_fingerprint(&context);
        context.insert("a".to_string(), json!(2));
        assert_ne!(before, context_fingerprint(&context));
    }
}
