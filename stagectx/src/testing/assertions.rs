//! Test assertions for evaluated stages.

use serde_json::Value;

use crate::pipeline::StageExecution;
use crate::stages::EvaluatedStage;

/// Asserts that every marker in the stage resolved.
///
/// # Panics
///
/// Panics if any field failure was recorded.
pub fn assert_fully_evaluated(evaluated: &EvaluatedStage) {
    assert!(
        evaluated.summary.is_complete(),
        "Expected stage '{}' to evaluate completely, got failures: {:?}",
        evaluated.ref_id,
        evaluated.summary.failures
    );
}

/// Asserts that `key` was copied verbatim from the stage's own context.
///
/// # Panics
///
/// Panics if the key is missing or differs from the source.
pub fn assert_key_unchanged(evaluated: &EvaluatedStage, source: &StageExecution, key: &str) {
    let original = source.context().get(key);
    assert!(original.is_some(), "Source stage has no key '{key}'");
    assert_eq!(
        evaluated.context.get(key),
        original,
        "Expected '{key}' to be copied verbatim"
    );
}

/// Asserts the value at a JSON pointer in the evaluated context.
///
/// # Panics
///
/// Panics if the pointer does not resolve or the value differs.
pub fn assert_context_value(evaluated: &EvaluatedStage, pointer: &str, expected: &Value) {
    let context = Value::Object(evaluated.context.clone());
    let actual = context.pointer(pointer);
    assert_eq!(
        actual,
        Some(expected),
        "Unexpected value at '{pointer}' in stage '{}'",
        evaluated.ref_id
    );
}
