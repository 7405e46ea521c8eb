//! Forward-chaining rule engine: one evaluation pass per run.
//!
//! The engine owns a priority-ordered rule set, a registry of dynamic
//! fact resolvers, and an operator registry. Each call to
//! [`Engine::run`] builds a fresh [`Almanac`] seeded with the caller's
//! static facts, a fresh [`RunGuard`], and evaluates every active rule
//! in order: higher priority first, declaration order on ties.
//!
//! A satisfied rule's handler is awaited before the next rule is
//! evaluated. That ordering is the contract that lets lower-priority
//! rules read runtime facts written by higher-priority rules' handlers
//! (care-plan rules reading the satisfied-barriers list written by
//! barrier handlers).
//!
//! A single rule's evaluation error never aborts the run; it is
//! recorded on the result and evaluation proceeds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::almanac::{Almanac, FactResolver};
use crate::condition::ConditionEvaluator;
use crate::error::{InferenceError, Result};
use crate::guard::RunGuard;
use crate::operators::OperatorRegistry;
use crate::rule::{Event, HandlerContext, HandlerRegistry, RuleDefinition, RuleHandler};
use crate::validation::validate_definitions;

// ── Results ─────────────────────────────────────────────────────────

/// Everything one evaluation pass produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Events emitted by satisfied rules, in evaluation order.
    pub events: Vec<Event>,
    /// Non-fatal per-rule failures recorded during the run.
    pub failures: Vec<RuleFailure>,
}

/// A rule whose evaluation or handler failed during a run.
#[derive(Debug, Clone, Serialize)]
pub struct RuleFailure {
    pub rule: String,
    pub error: String,
}

// ── Engine ──────────────────────────────────────────────────────────

struct ActiveRule {
    def: RuleDefinition,
    handler: Option<Arc<dyn RuleHandler>>,
}

/// Priority-ordered rule engine. Construct via [`Engine::builder`].
pub struct Engine {
    rules: Vec<ActiveRule>,
    dynamic_facts: Vec<(String, Arc<dyn FactResolver>)>,
    operators: OperatorRegistry,
    allow_undefined_facts: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.rules.len())
            .field("dynamic_facts", &self.dynamic_facts.len())
            .field("allow_undefined_facts", &self.allow_undefined_facts)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The loaded definitions, in evaluation order.
    pub fn definitions(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().map(|r| &r.def)
    }

    /// Run one evaluation pass over the given static facts.
    pub async fn run(&self, static_facts: HashMap<String, Value>) -> EngineResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(run_id = %run_id, rules = self.rules.len(), "inference run starting");

        let mut almanac = Almanac::with_options(static_facts, self.allow_undefined_facts);
        for (fact_id, resolver) in &self.dynamic_facts {
            almanac.add_dynamic_fact(fact_id.clone(), resolver.clone());
        }
        let almanac = almanac;
        let guard = RunGuard::new();
        let evaluator = ConditionEvaluator::new(&self.operators);

        let mut events = Vec::new();
        let mut failures = Vec::new();

        for rule in &self.rules {
            if !rule.def.active {
                debug!(rule = %rule.def.name, "rule inactive, skipped");
                continue;
            }

            match evaluator.evaluate(&rule.def.conditions, &almanac).await {
                Ok(true) => {
                    let event = Event::from_spec(&rule.def.event);
                    debug!(
                        rule = %rule.def.name,
                        kind = %event.kind,
                        subtype = %event.params.subtype,
                        "rule satisfied"
                    );
                    if let Some(handler) = &rule.handler {
                        let ctx = HandlerContext {
                            almanac: &almanac,
                            guard: &guard,
                        };
                        // A failing handler is recorded but does not
                        // suppress the event: satisfaction is decided
                        // by the conditions alone.
                        if let Err(e) = handler.on_satisfied(&event, &ctx).await {
                            warn!(rule = %rule.def.name, error = %e, "handler failed");
                            failures.push(RuleFailure {
                                rule: rule.def.name.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                    events.push(event);
                }
                Ok(false) => {
                    debug!(rule = %rule.def.name, "rule not satisfied");
                }
                Err(e) => {
                    warn!(rule = %rule.def.name, error = %e, "rule evaluation failed");
                    failures.push(RuleFailure {
                        rule: rule.def.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let completed_at = Utc::now();
        info!(
            run_id = %run_id,
            events = events.len(),
            failures = failures.len(),
            elapsed_ms = (completed_at - started_at).num_milliseconds(),
            "inference run complete"
        );
        EngineResult {
            run_id,
            started_at,
            completed_at,
            events,
            failures,
        }
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Assembles an [`Engine`] from definitions, registries, and options.
/// `build` validates the whole configuration and reports every problem
/// at once.
pub struct EngineBuilder {
    definitions: Vec<RuleDefinition>,
    handlers: HandlerRegistry,
    dynamic_facts: Vec<(String, Arc<dyn FactResolver>)>,
    operators: OperatorRegistry,
    allow_undefined_facts: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            handlers: HandlerRegistry::new(),
            dynamic_facts: Vec::new(),
            operators: OperatorRegistry::default(),
            allow_undefined_facts: false,
        }
    }

    pub fn rules(mut self, definitions: Vec<RuleDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    pub fn rule(mut self, definition: RuleDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn dynamic_fact(
        mut self,
        fact_id: impl Into<String>,
        resolver: Arc<dyn FactResolver>,
    ) -> Self {
        self.dynamic_facts.push((fact_id.into(), resolver));
        self
    }

    pub fn dynamic_facts(mut self, facts: Vec<(String, Arc<dyn FactResolver>)>) -> Self {
        self.dynamic_facts.extend(facts);
        self
    }

    pub fn operators(mut self, operators: OperatorRegistry) -> Self {
        self.operators = operators;
        self
    }

    pub fn allow_undefined_facts(mut self, allow: bool) -> Self {
        self.allow_undefined_facts = allow;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let validation = validate_definitions(&self.definitions, &self.operators, &self.handlers);
        for warning in &validation.warnings {
            warn!(path = %warning.path, "{}", warning.message);
        }
        if !validation.valid {
            return Err(InferenceError::Validation(validation.summary()));
        }

        let mut rules: Vec<ActiveRule> = self
            .definitions
            .into_iter()
            .map(|def| {
                let handler = def.handler.as_deref().and_then(|c| self.handlers.get(c));
                ActiveRule { def, handler }
            })
            .collect();
        // Stable sort keeps declaration order within equal priorities.
        rules.sort_by(|a, b| b.def.priority.cmp(&a.def.priority));

        Ok(Engine {
            rules,
            dynamic_facts: self.dynamic_facts,
            operators: self.operators,
            allow_undefined_facts: self.allow_undefined_facts,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
