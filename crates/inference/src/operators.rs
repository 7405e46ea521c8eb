//! Named comparison operators behind an explicit registry.
//!
//! Each operator is a binary predicate over (fact value, comparison
//! value). The registry maps operator names to implementations so new
//! comparisons can be added without touching the condition evaluator.
//!
//! Built-ins: `equal`, `notEqual`, `lessThan`, `lessThanInclusive`,
//! `greaterThan`, `greaterThanInclusive`, `in`, `notIn`, `contains`,
//! `doesNotContain`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

// ── Operator trait ──────────────────────────────────────────────────

/// A named comparison between a resolved fact value and the comparison
/// value declared in a rule condition.
///
/// Operators are infallible: a type mismatch is simply a non-match.
/// Undefined facts never reach an operator; the evaluator treats them
/// as non-matching before dispatch.
pub trait OperatorImpl: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, fact: &Value, expected: &Value) -> bool;
}

/// Operator backed by a plain function, used for all built-ins.
pub struct FnOperator {
    name: String,
    predicate: fn(&Value, &Value) -> bool,
}

impl FnOperator {
    pub fn new(name: impl Into<String>, predicate: fn(&Value, &Value) -> bool) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl OperatorImpl for FnOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, fact: &Value, expected: &Value) -> bool {
        (self.predicate)(fact, expected)
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Name → operator lookup used by the condition evaluator.
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn OperatorImpl>>,
}

impl OperatorRegistry {
    /// Registry with no operators, for callers that want full control.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Register an operator, replacing any previous one of the same name.
    pub fn register(&mut self, operator: Arc<dyn OperatorImpl>) {
        self.operators.insert(operator.name().to_string(), operator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OperatorImpl>> {
        self.operators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }
}

impl Default for OperatorRegistry {
    /// Registry pre-loaded with the built-in comparison set.
    fn default() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&str, fn(&Value, &Value) -> bool); 10] = [
            ("equal", values_equal),
            ("notEqual", |f, e| !values_equal(f, e)),
            ("lessThan", |f, e| numeric(f, e, |a, b| a < b)),
            ("lessThanInclusive", |f, e| numeric(f, e, |a, b| a <= b)),
            ("greaterThan", |f, e| numeric(f, e, |a, b| a > b)),
            ("greaterThanInclusive", |f, e| numeric(f, e, |a, b| a >= b)),
            ("in", in_list),
            ("notIn", |f, e| is_array(e) && !in_list(f, e)),
            ("contains", contains),
            ("doesNotContain", |f, e| {
                (f.is_array() || f.is_string()) && !contains(f, e)
            }),
        ];
        for (name, predicate) in builtins {
            registry.register(Arc::new(FnOperator::new(name, predicate)));
        }
        registry
    }
}

// ── Comparison helpers ──────────────────────────────────────────────

/// Equality with integer/float unification (100 == 100.0).
fn values_equal(fact: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(fact), as_f64(expected)) {
        return (a - b).abs() < f64::EPSILON;
    }
    fact == expected
}

fn numeric(fact: &Value, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (as_f64(fact), as_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Membership of the fact value in the expected array.
fn in_list(fact: &Value, expected: &Value) -> bool {
    expected
        .as_array()
        .map(|items| items.iter().any(|item| values_equal(fact, item)))
        .unwrap_or(false)
}

/// Array membership of the expected value, or substring match on strings.
fn contains(fact: &Value, expected: &Value) -> bool {
    match fact {
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        Value::String(s) => expected.as_str().map(|sub| s.contains(sub)).unwrap_or(false),
        _ => false,
    }
}

fn is_array(value: &Value) -> bool {
    value.is_array()
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}
