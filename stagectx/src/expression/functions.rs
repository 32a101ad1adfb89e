//! Function library callable from expressions as `#name(args)`.
//!
//! The built-in library is process-wide and read-only: it is built once on
//! first use and shared by every evaluation without locking. Callers that need
//! extra functions clone the built-ins into their own [`FunctionRegistry`].

use super::{EvaluatorVersion, ResolutionEnvironment};
use crate::errors::ExpressionError;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Trait for functions exposed to expressions.
pub trait Function: Send + Sync {
    /// Name used after `#`.
    fn name(&self) -> &'static str;

    /// Accepted argument counts.
    fn arity(&self) -> RangeInclusive<usize>;

    /// Whether the function exists in the given dialect.
    fn available_in(&self, _version: EvaluatorVersion) -> bool {
        true
    }

    /// Invokes the function with already-evaluated arguments.
    fn call(&self, args: &[Value], env: &ResolutionEnvironment) -> Result<Value, ExpressionError>;
}

static BUILTINS: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::build_builtins);

/// Thread-safe function registry.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared built-in library.
    #[must_use]
    pub fn builtins() -> Self {
        BUILTINS.clone()
    }

    fn build_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtins::ToBoolean);
        registry.register(builtins::ToInt);
        registry.register(builtins::ToFloat);
        registry.register(builtins::ToJson);
        registry.register(builtins::ReadJson);
        registry.register(builtins::Alphanumerical);
        registry.register(builtins::ToBase64);
        registry.register(builtins::FromBase64);
        registry.register(builtins::StageByName);
        registry.register(builtins::Judgment);
        registry.register(builtins::CurrentStage);
        registry
    }

    /// Registers a function, replacing any function with the same name.
    pub fn register<F: Function + 'static>(&mut self, f: F) {
        Arc::make_mut(&mut self.inner).insert(f.name(), Arc::new(f));
    }

    /// Gets a function by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }

    /// Returns true if a function with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Resolves and calls a function, checking dialect availability and arity.
    pub fn invoke(
        &self,
        name: &str,
        args: &[Value],
        env: &ResolutionEnvironment,
        version: EvaluatorVersion,
    ) -> Result<Value, ExpressionError> {
        let function = self
            .get(name)
            .filter(|f| f.available_in(version))
            .ok_or_else(|| ExpressionError::unresolved(format!("#{name}")))?;

        let arity = function.arity();
        if !arity.contains(&args.len()) {
            return Err(ExpressionError::function_call(
                name,
                format!(
                    "expected {}..={} arguments, got {}",
                    arity.start(),
                    arity.end(),
                    args.len()
                ),
            ));
        }
        function.call(args, env)
    }
}

/// Built-in functions.
pub mod builtins {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use regex::Regex;

    #[allow(clippy::expect_used)]
    static NON_ALPHANUMERIC: Lazy<Regex> =
        Lazy::new(|| Regex::new("[^A-Za-z0-9]").expect("static pattern is valid"));

    fn arg<'a>(args: &'a [Value], i: usize) -> &'a Value {
        args.get(i).unwrap_or(&Value::Null)
    }

    fn string_arg<'a>(
        function: &str,
        args: &'a [Value],
        i: usize,
    ) -> Result<&'a str, ExpressionError> {
        arg(args, i).as_str().ok_or_else(|| {
            ExpressionError::function_call(
                function,
                format!("argument {} must be a string, got {}", i + 1, arg(args, i)),
            )
        })
    }

    /// `#toBoolean(x)`: `"true"` (any case) and `true` are true, everything else false.
    pub struct ToBoolean;
    impl Function for ToBoolean {
        fn name(&self) -> &'static str {
            "toBoolean"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            Ok(Value::Bool(coerce_bool(arg(args, 0))))
        }
    }

    /// Boolean coercion shared with the skip-flag lookup.
    #[must_use]
    pub fn coerce_bool(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// `#toInt(x)`
    pub struct ToInt;
    impl Function for ToInt {
        fn name(&self) -> &'static str {
            "toInt"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            match arg(args, 0) {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| {
                        n.as_f64()
                            .map(f64::trunc)
                            .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                            .map(|f| f as i64)
                    })
                    .map(Value::from)
                    .ok_or_else(|| {
                        ExpressionError::function_call("toInt", format!("{n} is out of range"))
                    }),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| {
                        ExpressionError::function_call("toInt", format!("'{s}' is not an integer"))
                    }),
                other => Err(ExpressionError::function_call(
                    "toInt",
                    format!("cannot convert {other} to an integer"),
                )),
            }
        }
    }

    /// `#toFloat(x)`
    pub struct ToFloat;
    impl Function for ToFloat {
        fn name(&self) -> &'static str {
            "toFloat"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let parsed = match arg(args, 0) {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            parsed
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| {
                    ExpressionError::function_call(
                        "toFloat",
                        format!("cannot convert {} to a float", arg(args, 0)),
                    )
                })
        }
    }

    /// `#toJson(x)`: compact JSON text of any value.
    pub struct ToJson;
    impl Function for ToJson {
        fn name(&self) -> &'static str {
            "toJson"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            serde_json::to_string(arg(args, 0))
                .map(Value::String)
                .map_err(|e| ExpressionError::function_call("toJson", e.to_string()))
        }
    }

    /// `#readJson(s)`: parses JSON text. v4 only.
    pub struct ReadJson;
    impl Function for ReadJson {
        fn name(&self) -> &'static str {
            "readJson"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn available_in(&self, version: EvaluatorVersion) -> bool {
            version == EvaluatorVersion::V4
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let text = string_arg("readJson", args, 0)?;
            serde_json::from_str(text)
                .map_err(|e| ExpressionError::function_call("readJson", e.to_string()))
        }
    }

    /// `#alphanumerical(s)`: strips every character outside `[A-Za-z0-9]`.
    pub struct Alphanumerical;
    impl Function for Alphanumerical {
        fn name(&self) -> &'static str {
            "alphanumerical"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let text = string_arg("alphanumerical", args, 0)?;
            Ok(Value::String(NON_ALPHANUMERIC.replace_all(text, "").into_owned()))
        }
    }

    /// `#toBase64(s)`. v4 only.
    pub struct ToBase64;
    impl Function for ToBase64 {
        fn name(&self) -> &'static str {
            "toBase64"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn available_in(&self, version: EvaluatorVersion) -> bool {
            version == EvaluatorVersion::V4
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let text = string_arg("toBase64", args, 0)?;
            Ok(Value::String(STANDARD.encode(text.as_bytes())))
        }
    }

    /// `#fromBase64(s)`. v4 only.
    pub struct FromBase64;
    impl Function for FromBase64 {
        fn name(&self) -> &'static str {
            "fromBase64"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn available_in(&self, version: EvaluatorVersion) -> bool {
            version == EvaluatorVersion::V4
        }
        fn call(
            &self,
            args: &[Value],
            _env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let text = string_arg("fromBase64", args, 0)?;
            let bytes = STANDARD
                .decode(text.trim())
                .map_err(|e| ExpressionError::function_call("fromBase64", e.to_string()))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|e| ExpressionError::function_call("fromBase64", e.to_string()))
        }
    }

    /// `#stage(name)`: summary of the first stage with that name.
    pub struct StageByName;
    impl Function for StageByName {
        fn name(&self) -> &'static str {
            "stage"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(
            &self,
            args: &[Value],
            env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let name = string_arg("stage", args, 0)?;
            env.stage_named(name)
                .cloned()
                .ok_or_else(|| ExpressionError::unresolved(format!("#stage('{name}')")))
        }
    }

    /// `#judgment(name)`: the `judgmentInput` of a named stage, or null.
    pub struct Judgment;
    impl Function for Judgment {
        fn name(&self) -> &'static str {
            "judgment"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            1..=1
        }
        fn call(
            &self,
            args: &[Value],
            env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            let name = string_arg("judgment", args, 0)?;
            let stage = env
                .stage_named(name)
                .ok_or_else(|| ExpressionError::unresolved(format!("#judgment('{name}')")))?;
            Ok(stage
                .pointer("/context/judgmentInput")
                .cloned()
                .unwrap_or(Value::Null))
        }
    }

    /// `#currentStage()`
    pub struct CurrentStage;
    impl Function for CurrentStage {
        fn name(&self) -> &'static str {
            "currentStage"
        }
        fn arity(&self) -> RangeInclusive<usize> {
            0..=0
        }
        fn call(
            &self,
            _args: &[Value],
            env: &ResolutionEnvironment,
        ) -> Result<Value, ExpressionError> {
            env.current_stage()
                .cloned()
                .ok_or_else(|| ExpressionError::unresolved("#currentStage()"))
        }
    }
}
