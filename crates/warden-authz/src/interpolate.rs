//! Principal-relative condition resolution.
//!
//! # Purpose
//! Substitutes `${principal.<path>}` placeholders in a parsed condition with
//! the calling principal's attributes, yielding a condition that can be
//! matched against a resource instance.
//!
//! # Key invariants
//! - A placeholder whose attribute is missing turns its comparison into
//!   [`ResolvedCondition::Never`]. Resolution never fails.
//! - A resource path that reaches no value never matches, for `$eq` and `$ne`.
use crate::condition::{AttributePath, Comparator, ConditionExpr, Operand, scalar_string};
use crate::principal::Principal;
use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCondition {
    All(Vec<ResolvedCondition>),
    Compare {
        path: AttributePath,
        op: Comparator,
        value: Value,
    },
    Never,
}

/// Resolve every template in `expr` against `principal`.
pub fn resolve(expr: &ConditionExpr, principal: &Principal) -> ResolvedCondition {
    match expr {
        ConditionExpr::All(children) => ResolvedCondition::All(
            children
                .iter()
                .map(|child| resolve(child, principal))
                .collect(),
        ),
        ConditionExpr::Compare(comparison) => {
            let value = match &comparison.operand {
                Operand::Literal(value) => Some(value.clone()),
                Operand::Template(template) => template.resolve(principal),
            };
            match value {
                Some(value) => ResolvedCondition::Compare {
                    path: comparison.path.clone(),
                    op: comparison.op,
                    value,
                },
                None => {
                    tracing::trace!(
                        principal = %principal.id,
                        path = %comparison.path,
                        "condition references a missing principal attribute"
                    );
                    ResolvedCondition::Never
                }
            }
        }
    }
}

impl ResolvedCondition {
    pub fn matches(&self, resource: &Value) -> bool {
        match self {
            ResolvedCondition::All(children) => children.iter().all(|child| child.matches(resource)),
            ResolvedCondition::Never => false,
            ResolvedCondition::Compare { path, op, value } => {
                let reached = path.collect(resource);
                if reached.is_empty() {
                    return false;
                }
                let any_equal = reached.iter().any(|candidate| values_equal(candidate, value));
                match op {
                    Comparator::Eq => any_equal,
                    Comparator::Ne => !any_equal,
                }
            }
        }
    }

    /// True if some node can never match, regardless of the resource.
    pub fn is_unsatisfiable(&self) -> bool {
        match self {
            ResolvedCondition::All(children) => children.iter().any(Self::is_unsatisfiable),
            ResolvedCondition::Never => true,
            ResolvedCondition::Compare { .. } => false,
        }
    }
}

/// Deep equality with string coercion between scalars.
///
/// Numbers compare numerically, so `1` equals `1.0`; a string equals a
/// number or bool whose rendering is identical.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::String(text), other @ (Value::Number(_) | Value::Bool(_)))
        | (other @ (Value::Number(_) | Value::Bool(_)), Value::String(text)) => {
            scalar_string(other).as_deref() == Some(text.as_str())
        }
        _ => left == right,
    }
}

/// Integers compare exactly; a float only equals an integer it represents without loss.
fn numbers_equal(left: &Number, right: &Number) -> bool {
    match (exact_integer(left), exact_integer(right)) {
        (Some(a), Some(b)) => a == b,
        (Some(int), None) => right.as_f64().is_some_and(|float| float_is_integer(float, int)),
        (None, Some(int)) => left.as_f64().is_some_and(|float| float_is_integer(float, int)),
        (None, None) => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

fn exact_integer(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

fn float_is_integer(float: f64, int: i128) -> bool {
    // 2^64 bounds every integer serde_json can hold.
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;
    float.is_finite()
        && float.fract() == 0.0
        && float.abs() <= LIMIT
        && float as i128 == int
}
