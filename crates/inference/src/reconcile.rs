//! Reconciliation: diff inferred events against persisted entities.
//!
//! A reconcile call walks the run's events in order and tries to match
//! each against an unconsumed persisted entity of the same kind. A
//! matched entry is consumed (it can satisfy only one event per call);
//! an unmatched event becomes a `create` action carrying the event's
//! subtype and parent linkage.
//!
//! Matching is pluggable per entity kind through [`MatchStrategy`], so
//! new kinds are added by registering a strategy, not by editing the
//! loop. The default strategy is subtype equality, first match wins.
//!
//! Reconciliation is a pure function over two materialized lists: no
//! I/O, no persistence. The returned actions are instructions for an
//! external applier.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use coach_core::{EntityKind, PersistedEntity};

use crate::engine::EngineResult;
use crate::rule::Event;

// ── Current state ───────────────────────────────────────────────────

/// One persisted entity plus its per-call consumption flag.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub entity: PersistedEntity,
    pub matched: bool,
}

/// Snapshot of currently persisted entities, grouped by kind.
///
/// The snapshot itself is never mutated by reconciliation; each call
/// works on its own copy of the match flags.
#[derive(Debug, Clone, Default)]
pub struct CurrentState {
    entries: BTreeMap<EntityKind, Vec<StateEntry>>,
}

impl CurrentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = PersistedEntity>) -> Self {
        let mut state = Self::new();
        for entity in entities {
            state.insert(entity);
        }
        state
    }

    pub fn insert(&mut self, entity: PersistedEntity) {
        self.entries.entry(entity.kind).or_default().push(StateEntry {
            entity,
            matched: false,
        });
    }

    pub fn entries(&self, kind: EntityKind) -> &[StateEntry] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ── Match strategies ────────────────────────────────────────────────

/// Decides whether a persisted entity satisfies an inferred event.
pub trait MatchStrategy: Send + Sync {
    fn matches(&self, entity: &PersistedEntity, event: &Event) -> bool;
}

/// Default strategy: the entity's subtype equals the event's subtype.
pub struct SubtypeEquality;

impl MatchStrategy for SubtypeEquality {
    fn matches(&self, entity: &PersistedEntity, event: &Event) -> bool {
        entity.subtype == event.params.subtype
    }
}

/// Per-kind strategy table with a subtype-equality fallback.
pub struct StrategyRegistry {
    strategies: BTreeMap<EntityKind, Arc<dyn MatchStrategy>>,
    fallback: Arc<dyn MatchStrategy>,
}

impl StrategyRegistry {
    pub fn register(&mut self, kind: EntityKind, strategy: Arc<dyn MatchStrategy>) {
        self.strategies.insert(kind, strategy);
    }

    fn for_kind(&self, kind: EntityKind) -> &Arc<dyn MatchStrategy> {
        self.strategies.get(&kind).unwrap_or(&self.fallback)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self {
            strategies: BTreeMap::new(),
            fallback: Arc::new(SubtypeEquality),
        }
    }
}

// ── Actions & policy ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Create,
    Delete,
}

/// Instruction for the external applier. Never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAction {
    pub action: ActionKind,
    pub target_kind: EntityKind,
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_kind: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_subtype: Option<String>,
}

/// Controls the optional reconciliation behaviors.
///
/// The default reproduces the established contract: only `create`
/// actions, and duplicate same-subtype events each produce their own
/// action. Retirement and dedup are opt-in because the downstream
/// applier must be prepared for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcilePolicy {
    /// Emit a `delete` for every persisted entry no event matched.
    pub retire_unmatched: bool,
    /// Process at most one event per (kind, subtype) pair per call.
    pub dedupe_events: bool,
}

impl ReconcilePolicy {
    pub fn with_retirement(mut self) -> Self {
        self.retire_unmatched = true;
        self
    }

    pub fn with_dedupe(mut self) -> Self {
        self.dedupe_events = true;
        self
    }
}

// ── Reconciler ──────────────────────────────────────────────────────

/// Diffs an [`EngineResult`] against a [`CurrentState`] snapshot.
#[derive(Default)]
pub struct Reconciler {
    strategies: StrategyRegistry,
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ReconcilePolicy) -> Self {
        Self {
            strategies: StrategyRegistry::default(),
            policy,
        }
    }

    pub fn register_strategy(&mut self, kind: EntityKind, strategy: Arc<dyn MatchStrategy>) {
        self.strategies.register(kind, strategy);
    }

    /// Compute the minimal set of changes that brings persisted state
    /// in line with the events of one run.
    pub fn reconcile(&self, result: &EngineResult, current: &CurrentState) -> Vec<EngineAction> {
        let mut working = current.entries.clone();
        let mut actions = Vec::new();
        let mut seen: HashSet<(EntityKind, String)> = HashSet::new();

        for event in &result.events {
            if event.params.subtype.is_empty() {
                // Never matches anything; validation belongs upstream.
                warn!(kind = %event.kind, "event with empty subtype always creates");
            }

            if self.policy.dedupe_events
                && !seen.insert((event.kind, event.params.subtype.clone()))
            {
                debug!(
                    kind = %event.kind,
                    subtype = %event.params.subtype,
                    "duplicate event skipped"
                );
                continue;
            }

            let strategy = self.strategies.for_kind(event.kind);
            let entries = working.entry(event.kind).or_default();
            match entries
                .iter_mut()
                .find(|entry| !entry.matched && strategy.matches(&entry.entity, event))
            {
                Some(entry) => {
                    entry.matched = true;
                    debug!(
                        kind = %event.kind,
                        subtype = %event.params.subtype,
                        "event matched persisted entity"
                    );
                }
                None => actions.push(EngineAction {
                    action: ActionKind::Create,
                    target_kind: event.kind,
                    subtype: event.params.subtype.clone(),
                    parent_kind: event.params.parent_kind,
                    parent_subtype: event.params.parent_subtype.clone(),
                }),
            }
        }

        if self.policy.retire_unmatched {
            for (kind, entries) in &working {
                for entry in entries.iter().filter(|e| !e.matched) {
                    actions.push(EngineAction {
                        action: ActionKind::Delete,
                        target_kind: *kind,
                        subtype: entry.entity.subtype.clone(),
                        parent_kind: None,
                        parent_subtype: entry.entity.parent_subtype.clone(),
                    });
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Event, EventParams};
    use chrono::Utc;
    use uuid::Uuid;

    fn event(kind: EntityKind, subtype: &str) -> Event {
        Event {
            kind,
            params: EventParams {
                subtype: subtype.to_string(),
                parent_kind: None,
                parent_subtype: None,
            },
        }
    }

    fn result_with(events: Vec<Event>) -> EngineResult {
        EngineResult {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            events,
            failures: Vec::new(),
        }
    }

    fn barrier(subtype: &str) -> PersistedEntity {
        PersistedEntity::new(EntityKind::Barrier, subtype)
    }

    #[test]
    fn unmatched_event_yields_create() {
        let result = result_with(vec![event(EntityKind::Barrier, "loneliness")]);
        let actions = Reconciler::new().reconcile(&result, &CurrentState::new());
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ActionKind::Create);
        assert_eq!(actions[0].target_kind, EntityKind::Barrier);
        assert_eq!(actions[0].subtype, "loneliness");
    }

    #[test]
    fn matched_event_yields_no_action() {
        let result = result_with(vec![event(EntityKind::Barrier, "loneliness")]);
        let current = CurrentState::from_entities([barrier("loneliness")]);
        let actions = Reconciler::new().reconcile(&result, &current);
        assert!(actions.is_empty());
    }

    #[test]
    fn persisted_entry_is_consumed_at_most_once() {
        // Two identical events, one persisted entity: the second event
        // must not double-count the same entry.
        let result = result_with(vec![
            event(EntityKind::Barrier, "loneliness"),
            event(EntityKind::Barrier, "loneliness"),
        ]);
        let current = CurrentState::from_entities([barrier("loneliness")]);
        let actions = Reconciler::new().reconcile(&result, &current);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ActionKind::Create);
    }

    #[test]
    fn kinds_do_not_cross_match() {
        let result = result_with(vec![event(EntityKind::CarePlan, "loneliness")]);
        let current = CurrentState::from_entities([barrier("loneliness")]);
        let actions = Reconciler::new().reconcile(&result, &current);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].target_kind, EntityKind::CarePlan);
    }

    #[test]
    fn duplicate_creates_by_default_collapsed_with_dedupe() {
        let result = result_with(vec![
            event(EntityKind::Barrier, "loneliness"),
            event(EntityKind::Barrier, "loneliness"),
        ]);

        let default_actions = Reconciler::new().reconcile(&result, &CurrentState::new());
        assert_eq!(default_actions.len(), 2);

        let deduped = Reconciler::with_policy(ReconcilePolicy::default().with_dedupe())
            .reconcile(&result, &CurrentState::new());
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn retirement_deletes_unmatched_persisted_entries() {
        let result = result_with(vec![event(EntityKind::Barrier, "loneliness")]);
        let current = CurrentState::from_entities([barrier("loneliness"), barrier("stale")]);

        let default_actions = Reconciler::new().reconcile(&result, &current);
        assert!(default_actions.is_empty());

        let actions = Reconciler::with_policy(ReconcilePolicy::default().with_retirement())
            .reconcile(&result, &current);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ActionKind::Delete);
        assert_eq!(actions[0].subtype, "stale");
    }

    #[test]
    fn reconcile_is_idempotent_over_an_unmutated_snapshot() {
        let result = result_with(vec![
            event(EntityKind::Barrier, "loneliness"),
            event(EntityKind::Barrier, "loneliness2"),
            event(EntityKind::CarePlan, "content-about-combating-loneliness"),
        ]);
        let current = CurrentState::from_entities([barrier("loneliness")]);

        let reconciler = Reconciler::new();
        let first = reconciler.reconcile(&result, &current);
        let second = reconciler.reconcile(&result, &current);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn empty_subtype_always_creates() {
        let result = result_with(vec![event(EntityKind::Barrier, "")]);
        let current = CurrentState::from_entities([barrier("loneliness")]);
        let actions = Reconciler::new().reconcile(&result, &current);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ActionKind::Create);
    }
}
