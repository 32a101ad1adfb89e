//! Tree-walking evaluation of parsed expressions.

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::{Budget, EvaluatorVersion, FunctionRegistry, ResolutionEnvironment};
use crate::errors::ExpressionError;
use serde_json::{Number, Value};
use std::cmp::Ordering;

pub(crate) struct Interpreter<'a> {
    pub(crate) env: &'a ResolutionEnvironment,
    pub(crate) functions: &'a FunctionRegistry,
    pub(crate) version: EvaluatorVersion,
    pub(crate) budget: &'a mut Budget,
}

impl Interpreter<'_> {
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, ExpressionError> {
        self.budget.tick()?;
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Variable(name) => self
                .env
                .variable(name)
                .cloned()
                .ok_or_else(|| ExpressionError::unresolved(name)),
            Expr::Root => Ok(Value::Object(self.env.variables().clone())),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Property {
                target,
                name,
                null_safe,
            } => {
                let base = self.eval(target)?;
                self.property(&base, name, *null_safe, expr)
            }
            Expr::Index { target, index } => {
                let base = self.eval(target)?;
                let key = self.eval(index)?;
                self.index(&base, &key, expr)
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.invoke(name, &values, self.env, self.version)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!expect_bool(&value, "!")?)),
                    UnaryOp::Neg => negate(&value),
                }
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                if !expect_bool(&self.eval(left)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(&self.eval(right)?, "&&")?))
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                if expect_bool(&self.eval(left)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(&self.eval(right)?, "||")?))
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, &l, &r)
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if expect_bool(&self.eval(condition)?, "?:")? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Elvis { value, fallback } => match self.eval(value)? {
                Value::Null => self.eval(fallback),
                other => Ok(other),
            },
        }
    }

    fn property(
        &self,
        base: &Value,
        name: &str,
        null_safe: bool,
        expr: &Expr,
    ) -> Result<Value, ExpressionError> {
        match base {
            Value::Null if null_safe => Ok(Value::Null),
            Value::Object(map) => match map.get(name) {
                Some(v) => Ok(v.clone()),
                None if self.version.strict_property_access() => {
                    Err(ExpressionError::unresolved(describe(expr)))
                }
                None => Ok(Value::Null),
            },
            _ => Err(ExpressionError::unresolved(describe(expr))),
        }
    }

    fn index(&self, base: &Value, key: &Value, expr: &Expr) -> Result<Value, ExpressionError> {
        let found = match (base, key) {
            (Value::Object(map), Value::String(k)) => map.get(k),
            (Value::Array(items), Value::Number(n)) => {
                let position = n
                    .as_u64()
                    .and_then(|p| usize::try_from(p).ok())
                    .ok_or_else(|| {
                        ExpressionError::TypeMismatch(format!("invalid list index {n}"))
                    })?;
                items.get(position)
            }
            (Value::Null, _) => return Err(ExpressionError::unresolved(describe(expr))),
            _ => {
                return Err(ExpressionError::TypeMismatch(format!(
                    "cannot index {} with {}",
                    type_name(base),
                    type_name(key)
                )))
            }
        };
        match found {
            Some(v) => Ok(v.clone()),
            None if self.version.strict_property_access() => {
                Err(ExpressionError::unresolved(describe(expr)))
            }
            None => Ok(Value::Null),
        }
    }
}

/// Renders an expression for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Literal(v) => v.to_string(),
        Expr::Variable(name) => name.clone(),
        Expr::Root => "#root".to_string(),
        Expr::Property {
            target,
            name,
            null_safe,
        } => format!("{}{}{}", describe(target), if *null_safe { "?." } else { "." }, name),
        Expr::Index { target, index } => format!("{}[{}]", describe(target), describe(index)),
        Expr::Call { name, .. } => format!("#{name}(..)"),
        _ => "(..)".to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn expect_bool(value: &Value, operator: &str) -> Result<bool, ExpressionError> {
    value.as_bool().ok_or_else(|| {
        ExpressionError::TypeMismatch(format!(
            "operator '{operator}' expects a boolean, got {}",
            type_name(value)
        ))
    })
}

/// Text form of a value when substituted into a larger string.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn negate(value: &Value) -> Result<Value, ExpressionError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                Ok(Value::from(i))
            } else {
                float_value(-n.as_f64().unwrap_or_default())
            }
        }
        other => Err(ExpressionError::TypeMismatch(format!(
            "cannot negate {}",
            type_name(other)
        ))),
    }
}

fn float_value(f: f64) -> Result<Value, ExpressionError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::TypeMismatch("non-finite numeric result".to_string()))
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(l, r).ok_or_else(|| mismatch(op, l, r))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add if l.is_string() || r.is_string() => {
            Ok(Value::String(stringify(l) + &stringify(r)))
        }
        _ => arithmetic(op, l, r),
    }
}

fn mismatch(op: BinaryOp, l: &Value, r: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch(format!(
        "operator '{}' cannot be applied to {} and {}",
        op.symbol(),
        type_name(l),
        type_name(r)
    ))
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExpressionError> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(mismatch(op, l, r));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y == 0 {
            return Err(ExpressionError::TypeMismatch("division by zero".to_string()));
        }
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => x.checked_div(y),
            BinaryOp::Rem => x.checked_rem(y),
            _ => return Err(mismatch(op, l, r)),
        };
        if let Some(v) = exact {
            return Ok(Value::from(v));
        }
    }

    let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y == 0.0 {
        return Err(ExpressionError::TypeMismatch("division by zero".to_string()));
    }
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        _ => return Err(mismatch(op, l, r)),
    };
    float_value(result)
}
