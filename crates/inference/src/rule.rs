//! Rule definitions, events, and success handlers.
//!
//! A rule couples a condition tree to the event it emits when
//! satisfied. Handlers are explicit objects registered per category in
//! a [`HandlerRegistry`]; a rule references its handler by category
//! name, so definitions stay pure data (and YAML-loadable) while
//! behavior lives in code.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use coach_core::EntityKind;

use crate::almanac::Almanac;
use crate::condition::Condition;
use crate::error::Result;
use crate::guard::RunGuard;

// ── Definitions ─────────────────────────────────────────────────────

/// Static rule definition, loaded once at engine construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub name: String,
    /// Inactive rules are kept in the definition list but never evaluated.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Higher priority evaluates first; ties keep declaration order.
    #[serde(default)]
    pub priority: i32,
    pub conditions: Condition,
    pub event: EventSpec,
    /// Handler category resolved against a [`HandlerRegistry`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

fn default_active() -> bool {
    true
}

impl RuleDefinition {
    pub fn new(name: impl Into<String>, conditions: Condition, event: EventSpec) -> Self {
        Self {
            name: name.into(),
            active: true,
            priority: 0,
            conditions,
            event,
            handler: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_handler(mut self, category: impl Into<String>) -> Self {
        self.handler = Some(category.into());
        self
    }
}

/// What a rule emits when its conditions hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    /// Kind of entity this event targets.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub params: EventParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParams {
    /// Subtype of the target entity (`loneliness`, ...).
    #[serde(rename = "type")]
    pub subtype: String,
    /// Parent entity linkage, e.g. the barrier a care plan addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_kind: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_subtype: Option<String>,
}

impl EventSpec {
    pub fn new(kind: EntityKind, subtype: impl Into<String>) -> Self {
        Self {
            kind,
            params: EventParams {
                subtype: subtype.into(),
                parent_kind: None,
                parent_subtype: None,
            },
        }
    }

    pub fn with_parent(mut self, kind: EntityKind, subtype: impl Into<String>) -> Self {
        self.params.parent_kind = Some(kind);
        self.params.parent_subtype = Some(subtype.into());
        self
    }
}

/// Event emitted by a satisfied rule during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub params: EventParams,
}

impl Event {
    pub fn from_spec(spec: &EventSpec) -> Self {
        Self {
            kind: spec.kind,
            params: spec.params.clone(),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// Context a handler receives: the run's almanac for runtime fact
/// updates and the run's guard for serializing them.
pub struct HandlerContext<'a> {
    pub almanac: &'a Almanac,
    pub guard: &'a RunGuard,
}

/// Success handler invoked when a rule's conditions hold, awaited
/// before the next rule is evaluated.
#[async_trait]
pub trait RuleHandler: Send + Sync {
    async fn on_satisfied(&self, event: &Event, ctx: &HandlerContext<'_>) -> Result<()>;
}

/// Category → handler table. Definitions reference handlers by
/// category so one handler can serve a whole family of rules.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RuleHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: impl Into<String>, handler: Arc<dyn RuleHandler>) {
        self.handlers.insert(category.into(), handler);
    }

    pub fn get(&self, category: &str) -> Option<Arc<dyn RuleHandler>> {
        self.handlers.get(category).cloned()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.handlers.contains_key(category)
    }
}
