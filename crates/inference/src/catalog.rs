//! Built-in clinical rule catalog.
//!
//! The production rule set: barrier rules that detect obstacles to a
//! member's progress, and care-plan rules that follow up on detected
//! barriers. Barrier rules share one priority and one handler; the
//! handler appends the satisfied subtype to the `satisfiedBarriers`
//! runtime fact under the run guard, so care-plan rules (which run at a
//! lower priority) can condition on which barriers fired this run.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use coach_core::config::EngineConfig;
use coach_core::{barrier_types, care_plan_types, EntityKind};

use crate::almanac::{Almanac, FactResolver};
use crate::condition::{Comparison, Condition};
use crate::engine::Engine;
use crate::error::Result;
use crate::rule::{Event, EventSpec, HandlerContext, HandlerRegistry, RuleDefinition, RuleHandler};

// ── Fact ids ────────────────────────────────────────────────────────

/// Fact ids shared by the catalog's rules and resolvers.
pub mod facts {
    /// Static: member profile attributes (nested object).
    pub const MEMBER_INFO: &str = "memberInfo";
    /// Static: the member's caregiver list.
    pub const CAREGIVERS: &str = "caregivers";
    /// Static: currently persisted barriers.
    pub const BARRIERS: &str = "barriers";
    /// Static: currently persisted care plans.
    pub const CARE_PLANS: &str = "carePlans";
    /// Dynamic: number of caregivers.
    pub const CAREGIVERS_COUNT: &str = "caregiversCount";
    /// Dynamic: subtype of each persisted barrier, in order.
    pub const BARRIER_TYPES: &str = "barrierTypes";
    /// Runtime: subtypes of barriers satisfied during this run.
    pub const SATISFIED_BARRIERS: &str = "satisfiedBarriers";
}

/// Handler category shared by every barrier-producing rule.
pub const BARRIER_HANDLER: &str = "barrier";

// ── Dynamic fact resolvers ──────────────────────────────────────────

/// `caregiversCount`: length of the caregiver list.
pub struct CaregiversCount;

#[async_trait]
impl FactResolver for CaregiversCount {
    async fn resolve(&self, _params: &Value, almanac: &Almanac) -> Result<Value> {
        let caregivers = almanac.resolve(facts::CAREGIVERS).await?;
        Ok(json!(caregivers.as_array().map(Vec::len).unwrap_or(0)))
    }
}

/// `barrierTypes`: each persisted barrier's subtype, order preserved.
pub struct BarrierTypes;

#[async_trait]
impl FactResolver for BarrierTypes {
    async fn resolve(&self, _params: &Value, almanac: &Almanac) -> Result<Value> {
        let barriers = almanac.resolve(facts::BARRIERS).await?;
        let types: Vec<Value> = barriers
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|b| b.get("type").cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(types))
    }
}

/// `satisfiedBarriers` starts empty; the barrier handler overwrites it
/// as a runtime fact when barrier rules fire.
pub struct SatisfiedBarriersDefault;

#[async_trait]
impl FactResolver for SatisfiedBarriersDefault {
    async fn resolve(&self, _params: &Value, _almanac: &Almanac) -> Result<Value> {
        Ok(json!([]))
    }
}

/// The catalog's dynamic fact registrations.
pub fn dynamic_facts() -> Vec<(String, Arc<dyn FactResolver>)> {
    vec![
        (facts::CAREGIVERS_COUNT.to_string(), Arc::new(CaregiversCount) as _),
        (facts::BARRIER_TYPES.to_string(), Arc::new(BarrierTypes) as _),
        (
            facts::SATISFIED_BARRIERS.to_string(),
            Arc::new(SatisfiedBarriersDefault) as _,
        ),
    ]
}

// ── Handlers ────────────────────────────────────────────────────────

/// Appends the fired barrier's subtype to `satisfiedBarriers`.
///
/// The read-modify-write runs inside the run guard: two barrier rules
/// firing in one run must both land in the list.
pub struct BarrierSatisfiedHandler;

#[async_trait]
impl RuleHandler for BarrierSatisfiedHandler {
    async fn on_satisfied(&self, event: &Event, ctx: &HandlerContext<'_>) -> Result<()> {
        ctx.guard
            .enter(|| async {
                let current = ctx.almanac.resolve(facts::SATISFIED_BARRIERS).await?;
                let mut satisfied = current.as_array().cloned().unwrap_or_default();
                satisfied.push(json!(event.params.subtype));
                ctx.almanac
                    .set_runtime_fact(facts::SATISFIED_BARRIERS, Value::Array(satisfied))
                    .await;
                Ok(())
            })
            .await
    }
}

/// The catalog's handler table.
pub fn handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(BARRIER_HANDLER, Arc::new(BarrierSatisfiedHandler));
    registry
}

// ── Rule definitions ────────────────────────────────────────────────

/// The built-in clinical rule set.
///
/// Barrier rules get `cfg.barrier_priority` and the shared barrier
/// handler; care-plan rules get `cfg.care_plan_priority`, which must be
/// lower so the satisfied-barriers list is complete before any
/// care-plan rule reads it.
pub fn definitions(cfg: &EngineConfig) -> Vec<RuleDefinition> {
    let barrier = |name: &str, conditions: Condition, subtype: &str| {
        RuleDefinition::new(name, conditions, EventSpec::new(EntityKind::Barrier, subtype))
            .with_priority(cfg.barrier_priority)
            .with_handler(BARRIER_HANDLER)
    };

    vec![
        barrier(
            "loneliness",
            Condition::all(vec![Condition::leaf(
                Comparison::new(facts::MEMBER_INFO, "equal", json!(true)).at_path("livesAlone"),
            )]),
            barrier_types::LONELINESS,
        ),
        barrier(
            "loneliness2",
            Condition::all(vec![Condition::leaf(Comparison::new(
                facts::CAREGIVERS_COUNT,
                "lessThan",
                json!(2),
            ))]),
            barrier_types::LONELINESS2,
        ),
        barrier(
            "appointment-follow-up-unclear",
            Condition::all(vec![
                Condition::leaf(
                    Comparison::new(facts::MEMBER_INFO, "equal", json!(0))
                        .at_path("scheduledAppointments"),
                ),
                Condition::leaf(
                    Comparison::new(facts::MEMBER_INFO, "equal", json!(0))
                        .at_path("appointmentsToBeScheduled"),
                ),
            ]),
            barrier_types::APPOINTMENT_FOLLOW_UP_UNCLEAR,
        ),
        RuleDefinition::new(
            "content-about-combating-loneliness",
            Condition::all(vec![Condition::leaf(Comparison::new(
                facts::SATISFIED_BARRIERS,
                "contains",
                json!(barrier_types::LONELINESS),
            ))]),
            EventSpec::new(EntityKind::CarePlan, care_plan_types::COMBATING_LONELINESS)
                .with_parent(EntityKind::Barrier, barrier_types::LONELINESS),
        )
        .with_priority(cfg.care_plan_priority),
    ]
}

/// Assemble a ready-to-run engine from the built-in catalog.
pub fn engine(cfg: &EngineConfig) -> Result<Engine> {
    Engine::builder()
        .rules(definitions(cfg))
        .handlers(handlers())
        .dynamic_facts(dynamic_facts())
        .allow_undefined_facts(cfg.allow_undefined_facts)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn caregivers_count_resolves_list_length() {
        let mut almanac = Almanac::new(HashMap::from([(
            facts::CAREGIVERS.to_string(),
            json!(["x", "y"]),
        )]));
        almanac.add_dynamic_fact(facts::CAREGIVERS_COUNT, Arc::new(CaregiversCount));
        assert_eq!(
            almanac.resolve(facts::CAREGIVERS_COUNT).await.unwrap(),
            json!(2)
        );
    }

    #[tokio::test]
    async fn barrier_types_projects_subtypes_in_order() {
        let mut almanac = Almanac::new(HashMap::from([(
            facts::BARRIERS.to_string(),
            json!([{"type": "loneliness"}, {"type": "b"}, {"type": "a"}]),
        )]));
        almanac.add_dynamic_fact(facts::BARRIER_TYPES, Arc::new(BarrierTypes));
        assert_eq!(
            almanac.resolve(facts::BARRIER_TYPES).await.unwrap(),
            json!(["loneliness", "b", "a"])
        );
    }

    #[test]
    fn catalog_builds_a_valid_engine() {
        let engine = engine(&EngineConfig::default()).unwrap();
        let names: Vec<&str> = engine.definitions().map(|d| d.name.as_str()).collect();
        // Barrier rules first (higher priority), care plan last.
        assert_eq!(
            names,
            vec![
                "loneliness",
                "loneliness2",
                "appointment-follow-up-unclear",
                "content-about-combating-loneliness",
            ]
        );
    }
}
