//! Predicates evaluated by condition nodes.
//!
//! Conditions are not a scripting language: a predicate is a
//! tree of comparisons against run context paths, combined with `all`, `any`
//! and `not`. Everything is statically checkable and evaluates without side
//! effects.

use crate::context::RunContext;
use crate::error::EvaluationError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a `compare` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring, array membership, or object key.
    Contains,
    /// The path resolves to a non-null value.
    Exists,
    /// The value is not null, false, zero or empty.
    Truthy,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::Exists => "exists",
            Self::Truthy => "truthy",
        };
        f.write_str(name)
    }
}

/// A condition node's predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        path: String,
        operator: CompareOp,
        /// Right-hand side. Ignored by `exists` and `truthy`.
        #[serde(default)]
        value: JsonValue,
    },
    All { predicates: Vec<Predicate> },
    Any { predicates: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
    Literal { value: bool },
}

impl Predicate {
    #[must_use]
    pub fn compare(path: impl Into<String>, operator: CompareOp, value: JsonValue) -> Self {
        Self::Compare {
            path: path.into(),
            operator,
            value,
        }
    }

    /// Evaluates the predicate against `ctx`.
    ///
    /// Unresolved paths compare as `null`. `all` and `any` short-circuit.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` when an ordering or `contains` comparison is
    /// applied to values that do not support it.
    pub fn evaluate(&self, ctx: &RunContext) -> Result<bool, EvaluationError> {
        match self {
            Self::Compare {
                path,
                operator,
                value,
            } => {
                let actual = ctx.get(path).unwrap_or(&JsonValue::Null);
                compare(path, *operator, actual, value)
            }
            Self::All { predicates } => {
                for predicate in predicates {
                    if !predicate.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any { predicates } => {
                for predicate in predicates {
                    if predicate.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not { predicate } => Ok(!predicate.evaluate(ctx)?),
            Self::Literal { value } => Ok(*value),
        }
    }
}

fn compare(
    path: &str,
    operator: CompareOp,
    actual: &JsonValue,
    expected: &JsonValue,
) -> Result<bool, EvaluationError> {
    let mismatch = || EvaluationError::TypeMismatch {
        path: path.to_string(),
        operator: operator.to_string(),
        actual: type_name(actual),
        expected: type_name(expected),
    };

    match operator {
        CompareOp::Eq => Ok(json_eq(actual, expected)),
        CompareOp::Ne => Ok(!json_eq(actual, expected)),
        CompareOp::Exists => Ok(!actual.is_null()),
        CompareOp::Truthy => Ok(is_truthy(actual)),
        CompareOp::Contains => match (actual, expected) {
            (JsonValue::String(haystack), JsonValue::String(needle)) => {
                Ok(haystack.contains(needle.as_str()))
            }
            (JsonValue::Array(items), needle) => Ok(items.iter().any(|i| json_eq(i, needle))),
            (JsonValue::Object(map), JsonValue::String(key)) => Ok(map.contains_key(key)),
            _ => Err(mismatch()),
        },
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
            let ordering = ordering(actual, expected).ok_or_else(mismatch)?;
            Ok(match operator {
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Gte => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
    }
}

/// Equality that treats `1` and `1.0` as equal.
fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn ordering(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
