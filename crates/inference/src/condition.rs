//! Condition trees and their recursive evaluator.
//!
//! A condition is either a leaf comparison against a single fact or an
//! `all`/`any` combinator over child conditions. Evaluation resolves
//! facts through the [`Almanac`], navigates an optional dotted path
//! into the resolved value, and dispatches to a named operator.
//!
//! `all` evaluates every child even after one fails: dynamic fact
//! resolution has side effects (memoization, composition) that later
//! rules rely on. `any` short-circuits on the first satisfied child.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::almanac::Almanac;
use crate::error::{InferenceError, Result};
use crate::operators::OperatorRegistry;

// ── Condition tree ──────────────────────────────────────────────────

/// Tagged condition tree: leaf comparison or AND/OR combinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    Leaf(Comparison),
}

impl Condition {
    pub fn all(children: Vec<Condition>) -> Self {
        Condition::All { all: children }
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Condition::Any { any: children }
    }

    pub fn leaf(comparison: Comparison) -> Self {
        Condition::Leaf(comparison)
    }
}

/// Leaf comparison: resolve `fact`, optionally navigate `path` into the
/// resolved value, then apply `operator` against `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub fact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub operator: String,
    pub value: Value,
    /// Optional parameters forwarded to the fact's resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Comparison {
    pub fn new(fact: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            fact: fact.into(),
            path: None,
            operator: operator.into(),
            value: value.into(),
            params: None,
        }
    }

    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Navigate a dotted path into a JSON value. Numeric segments index
/// into arrays (`caregivers.0.name`).
pub fn navigate_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                current = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

// ── Evaluator ───────────────────────────────────────────────────────

/// Recursive condition evaluator over an almanac.
pub struct ConditionEvaluator<'a> {
    operators: &'a OperatorRegistry,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(operators: &'a OperatorRegistry) -> Self {
        Self { operators }
    }

    /// Evaluate a condition tree to a boolean.
    ///
    /// May suspend on fact resolution. Boxed because the tree recurses
    /// through an async call.
    pub fn evaluate<'c>(
        &'c self,
        condition: &'c Condition,
        almanac: &'c Almanac,
    ) -> BoxFuture<'c, Result<bool>> {
        Box::pin(async move {
            match condition {
                Condition::All { all } => {
                    let mut satisfied = true;
                    for child in all {
                        if !self.evaluate(child, almanac).await? {
                            satisfied = false;
                        }
                    }
                    Ok(satisfied)
                }
                Condition::Any { any } => {
                    for child in any {
                        if self.evaluate(child, almanac).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Condition::Leaf(comparison) => self.evaluate_leaf(comparison, almanac).await,
            }
        })
    }

    async fn evaluate_leaf(&self, comparison: &Comparison, almanac: &Almanac) -> Result<bool> {
        let operator = self
            .operators
            .get(&comparison.operator)
            .ok_or_else(|| InferenceError::UnknownOperator(comparison.operator.clone()))?;

        let resolved = match &comparison.params {
            Some(params) => almanac.resolve_with(&comparison.fact, params).await?,
            None => almanac.resolve_opt(&comparison.fact).await?,
        };

        let navigated = match (&resolved, &comparison.path) {
            (Some(value), Some(path)) => navigate_path(value, path),
            (Some(value), None) => Some(value),
            (None, _) => None,
        };

        // Undefined facts and dead-end paths never match.
        let satisfied = navigated
            .map(|value| operator.apply(value, &comparison.value))
            .unwrap_or(false);

        trace!(
            fact = %comparison.fact,
            operator = %comparison.operator,
            satisfied,
            "leaf evaluated"
        );
        Ok(satisfied)
    }
}
