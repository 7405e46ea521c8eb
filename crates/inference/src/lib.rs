//! Clinical inference & reconciliation engine.
//!
//! This crate provides:
//! - A run-scoped fact almanac with static, dynamic, and runtime facts
//! - A recursive condition evaluator over `all`/`any` trees with a
//!   named-operator registry
//! - A priority-ordered forward-chaining rule engine with awaited
//!   per-rule success handlers
//! - A per-run mutual-exclusion guard for handler critical sections
//! - A reconciler that diffs inferred events against persisted
//!   entities into create/delete actions
//! - The built-in clinical rule catalog and a YAML rule loader

pub mod almanac;
pub mod catalog;
pub mod condition;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod loader;
pub mod operators;
pub mod reconcile;
pub mod rule;
pub mod validation;

pub use almanac::{Almanac, FactResolver};
pub use condition::{Comparison, Condition, ConditionEvaluator};
pub use engine::{Engine, EngineBuilder, EngineResult, RuleFailure};
pub use error::{InferenceError, Result};
pub use fetch::{FactBundle, FactFetcher, StubFetcher};
pub use guard::RunGuard;
pub use operators::{OperatorImpl, OperatorRegistry};
pub use reconcile::{
    ActionKind, CurrentState, EngineAction, MatchStrategy, ReconcilePolicy, Reconciler,
};
pub use rule::{Event, EventSpec, HandlerRegistry, RuleDefinition, RuleHandler};
