//! Scenario tests for expression-aware stages.

#[cfg(test)]
mod tests {
    use crate::config::{EngineConfig, FailureMode};
    use crate::errors::{ContextError, ExpressionError, StagectxError};
    use crate::expression::EvaluatorVersion;
    use crate::pipeline::{PipelineExecution, StageExecution, SKIP_EXPRESSION_EVALUATION};
    use crate::stages::{ExpressionAware, StageContextEvaluator};
    use crate::testing::{
        assert_context_value, assert_fully_evaluated, assert_key_unchanged, PipelineFixture,
        StageFixture, TestExpressionAware,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const SELECTORS: [Option<&str>; 3] = [Some("v3"), Some("v4"), None];
    const LITERAL_TRUE: &str = "${#toBoolean('true')}";

    fn manifests() -> Value {
        json!([{
            "metadata": {
                "name": "my-k8s-manifest",
                "should-evaluate-to-literal-true": LITERAL_TRUE
            }
        }])
    }

    fn evaluated_manifests() -> Value {
        json!([{
            "metadata": {
                "name": "my-k8s-manifest",
                "should-evaluate-to-literal-true": true
            }
        }])
    }

    fn deploy_execution(selector: Option<&str>, skip: Option<bool>) -> PipelineExecution {
        let mut stage = StageFixture::deploy_manifest("1").manifests(manifests());
        if let Some(skip) = skip {
            stage = stage.skip_expression_evaluation(skip);
        }
        PipelineFixture::new()
            .maybe_evaluator(selector)
            .stage(stage)
            .build()
            .unwrap()
    }

    #[test]
    fn test_manifests_are_evaluated_under_every_version() {
        let aware = TestExpressionAware::new();
        for selector in SELECTORS {
            let execution = deploy_execution(selector, None);
            let evaluated = aware.evaluate(&execution, "1").unwrap();

            assert_eq!(
                evaluated.context["manifests"],
                evaluated_manifests(),
                "selector {selector:?}"
            );
            assert_fully_evaluated(&evaluated);
        }
    }

    #[test]
    fn test_skip_flag_leaves_manifests_verbatim() {
        let aware = TestExpressionAware::new();
        let execution = deploy_execution(Some("v4"), Some(true));
        let source = execution.stage_by_ref("1").unwrap();
        let evaluated = aware.evaluate(&execution, "1").unwrap();

        assert_key_unchanged(&evaluated, source, "manifests");
        assert_eq!(evaluated.context["manifests"], manifests());
        assert_context_value(
            &evaluated,
            "/manifests/0/metadata/should-evaluate-to-literal-true",
            &json!(LITERAL_TRUE),
        );
        assert_eq!(evaluated.summary.skipped, vec!["manifests".to_string()]);
    }

    #[test]
    fn test_skip_flag_applies_under_every_version() {
        let aware = TestExpressionAware::new();
        for selector in SELECTORS {
            let execution = deploy_execution(selector, Some(true));
            let evaluated = aware.evaluate(&execution, "1").unwrap();
            assert_eq!(evaluated.context["manifests"], manifests(), "selector {selector:?}");
        }
    }

    #[test]
    fn test_non_manifest_keys_evaluate_regardless_of_flag() {
        let aware = TestExpressionAware::new();
        for selector in SELECTORS {
            for skip in [None, Some(false), Some(true)] {
                let mut stage = StageFixture::deploy_manifest("1")
                    .manifests(manifests())
                    .context("should-evaluate-to-literal-true", json!(LITERAL_TRUE));
                if let Some(skip) = skip {
                    stage = stage.skip_expression_evaluation(skip);
                }
                let execution = PipelineFixture::new()
                    .maybe_evaluator(selector)
                    .stage(stage)
                    .build()
                    .unwrap();

                let evaluated = aware.evaluate(&execution, "1").unwrap();
                assert_eq!(
                    evaluated.context["should-evaluate-to-literal-true"],
                    json!(true),
                    "selector {selector:?}, skip {skip:?}"
                );
            }
        }
    }

    #[test]
    fn test_flag_is_ignored_for_stage_types_without_governed_fields() {
        let aware = TestExpressionAware::new();
        let execution = PipelineFixture::new()
            .stage(
                StageFixture::run_job("1")
                    .manifests(manifests())
                    .skip_expression_evaluation(true),
            )
            .build()
            .unwrap();

        let evaluated = aware.evaluate(&execution, "1").unwrap();
        assert_context_value(
            &evaluated,
            "/manifests/0/metadata/should-evaluate-to-literal-true",
            &json!(true),
        );
        assert!(evaluated.summary.skipped.is_empty());
    }

    #[test]
    fn test_configured_governed_fields() {
        let aware = TestExpressionAware::new()
            .with_config(EngineConfig::new().with_governed_field("runJob", "manifest"));
        let execution = PipelineFixture::new()
            .stage(
                StageFixture::run_job("1")
                    .context("manifest", json!({"image": "${trigger.parameters.image}"}))
                    .context("account", json!("${parameters.account}"))
                    .skip_expression_evaluation(true),
            )
            .parameter("account", json!("prod"))
            .build()
            .unwrap();

        let evaluated = aware.evaluate(&execution, "1").unwrap();
        assert_eq!(
            evaluated.context["manifest"],
            json!({"image": "${trigger.parameters.image}"})
        );
        assert_eq!(evaluated.context["account"], json!("prod"));
    }

    #[test]
    fn test_governed_key_nested_elsewhere_is_evaluated() {
        let aware = TestExpressionAware::new();
        let execution = PipelineFixture::new()
            .stage(
                StageFixture::deploy_manifest("1")
                    .manifests(manifests())
                    .context("options", json!({"manifests": LITERAL_TRUE}))
                    .skip_expression_evaluation(true),
            )
            .build()
            .unwrap();

        let evaluated = aware.evaluate(&execution, "1").unwrap();
        assert_eq!(evaluated.context["options"], json!({"manifests": true}));
    }

    #[test]
    fn test_ancestor_outputs_and_execution_are_visible() {
        let aware = TestExpressionAware::new();
        let execution = PipelineFixture::new()
            .global("namespace", json!("default"))
            .parameter("tag", json!("1.4.2"))
            .stage(
                StageFixture::of_type("bake", "bakeManifest")
                    .named("Bake")
                    .output("image", json!("registry/orders")),
            )
            .stage(
                StageFixture::deploy_manifest("deploy")
                    .requires("bake")
                    .manifests(json!([{
                        "metadata": {"namespace": "${namespace}"},
                        "spec": {"image": "${image}:${parameters.tag}"}
                    }]))
                    .context("app", json!("${execution.application}")),
            )
            .build()
            .unwrap();

        let evaluated = aware.evaluate(&execution, "deploy").unwrap();
        assert_context_value(&evaluated, "/manifests/0/metadata/namespace", &json!("default"));
        assert_context_value(
            &evaluated,
            "/manifests/0/spec/image",
            &json!("registry/orders:1.4.2"),
        );
        assert_context_value(&evaluated, "/app", &json!("test-app"));
        assert_context_value(&evaluated, "/image", &json!("registry/orders"));
    }

    #[test]
    fn test_stage_functions() {
        let aware = TestExpressionAware::new();
        let execution = PipelineFixture::new()
            .stage(
                StageFixture::of_type("1", "manualJudgment")
                    .named("Approve")
                    .context("judgmentInput", json!("ship it")),
            )
            .stage(
                StageFixture::run_job("2")
                    .requires("1")
                    .context("decision", json!("${#judgment('Approve')}"))
                    .context("approver", json!("${#stage('Approve')['refId']}"))
                    .context("me", json!("${#currentStage()['type']}")),
            )
            .build()
            .unwrap();

        let evaluated = aware.evaluate(&execution, "2").unwrap();
        assert_eq!(evaluated.context["decision"], json!("ship it"));
        assert_eq!(evaluated.context["approver"], json!("1"));
        assert_eq!(evaluated.context["me"], json!("runJob"));
    }

    #[test]
    fn test_lenient_failure_keeps_raw_text() {
        let aware = TestExpressionAware::new();
        let execution = PipelineFixture::new()
            .stage(
                StageFixture::run_job("1")
                    .context("ok", json!(LITERAL_TRUE))
                    .context("broken", json!("${undefinedVariable}")),
            )
            .build()
            .unwrap();

        let evaluated = aware.evaluate(&execution, "1").unwrap();
        assert_eq!(evaluated.context["ok"], json!(true));
        assert_eq!(evaluated.context["broken"], json!("${undefinedVariable}"));
        assert_eq!(evaluated.summary.failures.len(), 1);
        assert_eq!(evaluated.summary.failures[0].path, "broken");
    }

    #[test]
    fn test_strict_failure_names_the_field() {
        let aware = TestExpressionAware::new()
            .with_config(EngineConfig::new().with_failure_mode(FailureMode::Strict));
        let execution = PipelineFixture::new()
            .stage(
                StageFixture::deploy_manifest("1")
                    .manifests(json!([{"metadata": {"name": "${#toBoolean('true'}"}}])),
            )
            .build()
            .unwrap();

        let err = aware.evaluate(&execution, "1").unwrap_err();
        let StagectxError::Expression(ExpressionError::FieldEvaluation { path, .. }) = err else {
            panic!("expected a field evaluation error, got {err:?}");
        };
        assert_eq!(path, "manifests[0].metadata.name");
    }

    #[test]
    fn test_source_stage_is_not_mutated() {
        let aware = TestExpressionAware::new();
        let execution = deploy_execution(None, None);
        let before = execution.clone();

        let _ = aware.evaluate(&execution, "1").unwrap();
        assert_eq!(execution, before);
    }

    #[test]
    fn test_stage_outside_execution() {
        let aware = StageContextEvaluator::default();
        let execution = deploy_execution(None, None);
        let stranger = StageExecution::new("nope", "deployManifest");

        let err = aware.with_merged_context(&stranger, &execution).unwrap_err();
        assert!(matches!(
            err,
            StagectxError::Context(ContextError::StageNotFound(ref id)) if id == "nope"
        ));
    }

    #[test]
    fn test_execution_copy_of_stage_decides_skip_flag() {
        let aware = StageContextEvaluator::default();
        let execution = deploy_execution(None, None);
        let edited = execution
            .stage_by_ref("1")
            .unwrap()
            .clone()
            .with_context(SKIP_EXPRESSION_EVALUATION, json!(true));

        let evaluated = aware.with_merged_context(&edited, &execution).unwrap();
        assert_eq!(evaluated.context["manifests"], evaluated_manifests());
        assert!(evaluated.summary.skipped.is_empty());
        assert!(!evaluated.context.contains_key(SKIP_EXPRESSION_EVALUATION));
    }

    #[test]
    fn test_applied_version_is_reported() {
        let aware = TestExpressionAware::new();
        let v3 = aware.evaluate(&deploy_execution(Some("v3"), None), "1").unwrap();
        let default = aware.evaluate(&deploy_execution(None, None), "1").unwrap();
        assert_eq!(v3.version, EvaluatorVersion::V3);
        assert_eq!(default.version, EvaluatorVersion::V4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evaluation_of_shared_execution() {
        use std::sync::Arc;

        let aware = Arc::new(StageContextEvaluator::default());
        let execution = Arc::new(deploy_execution(Some("v4"), None));

        let handles = (0..16).map(|_| {
            let aware = Arc::clone(&aware);
            let execution = Arc::clone(&execution);
            tokio::spawn(async move {
                let stage = execution.stage_by_ref("1").unwrap();
                aware.with_merged_context(stage, &execution).unwrap()
            })
        });

        let results = futures::future::join_all(handles).await;
        let first = results[0].as_ref().unwrap().clone();
        for result in results {
            assert_eq!(result.unwrap(), first);
        }
        assert_eq!(
            first.context["manifests"][0]["metadata"]["should-evaluate-to-literal-true"],
            json!(true)
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use serde_json::Map;

        fn marker_free_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::from),
                "[a-zA-Z0-9 _.#{}'()-]{0,16}".prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 32, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        fn marker_free_context() -> impl Strategy<Value = Map<String, Value>> {
            prop::collection::btree_map("[a-z]{1,8}", marker_free_value(), 0..6)
                .prop_map(|m| m.into_iter().collect())
        }

        fn common_syntax_context() -> impl Strategy<Value = Map<String, Value>> {
            (0i64..1000, 0i64..1000, "[a-z]{1,8}").prop_map(|(a, b, word)| {
                let mut context = Map::new();
                context.insert("sum".into(), json!(format!("${{{a} + {b}}}")));
                context.insert("cmp".into(), json!(format!("${{{a} < {b} ? 'lt' : 'ge'}}")));
                context.insert("text".into(), json!(format!("{word}-${{'{word}' + {a}}}")));
                context.insert("flag".into(), json!(LITERAL_TRUE));
                context.insert("list".into(), json!([format!("${{{{{a}, {b}}}}}")]));
                context
            })
        }

        fn single_stage(
            stage_type: &str,
            context: Map<String, Value>,
            selector: Option<&str>,
        ) -> PipelineExecution {
            PipelineFixture::new()
                .maybe_evaluator(selector)
                .stage(StageExecution::new("1", stage_type).with_context_map(context))
                .build()
                .unwrap()
        }

        proptest! {
            #[test]
            fn marker_free_contexts_are_unchanged(context in marker_free_context()) {
                let aware = TestExpressionAware::new();
                for stage_type in ["deployManifest", "runJob"] {
                    let execution = single_stage(stage_type, context.clone(), None);
                    let evaluated = aware.evaluate(&execution, "1").unwrap();
                    prop_assert_eq!(&evaluated.context, &context);
                    prop_assert_eq!(evaluated.summary.evaluated, 0);
                }
            }

            #[test]
            fn versions_agree_on_common_syntax(context in common_syntax_context()) {
                let aware = TestExpressionAware::new();
                let results: Vec<_> = SELECTORS
                    .iter()
                    .map(|selector| {
                        let execution = single_stage("deployManifest", context.clone(), *selector);
                        aware.evaluate(&execution, "1").unwrap().context
                    })
                    .collect();
                prop_assert_eq!(&results[0], &results[1]);
                prop_assert_eq!(&results[1], &results[2]);
            }

            #[test]
            fn flag_changes_nothing_without_governed_fields(context in common_syntax_context()) {
                let aware = TestExpressionAware::new();
                let evaluate = |skip: bool| {
                    let mut context = context.clone();
                    context.insert("manifests".into(), manifests());
                    context.insert(SKIP_EXPRESSION_EVALUATION.into(), json!(skip));
                    let execution = single_stage("runJob", context, None);
                    let mut out = aware.evaluate(&execution, "1").unwrap().context;
                    out.remove(SKIP_EXPRESSION_EVALUATION);
                    out
                };
                prop_assert_eq!(evaluate(true), evaluate(false));
            }
        }
    }
}
