use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EntityId = Uuid;

/// Kind of clinical entity the engine can infer and reconcile.
///
/// New kinds are added here plus a match strategy registration in the
/// reconciler; the reconcile loop itself stays untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Barrier,
    CarePlan,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Barrier => write!(f, "Barrier"),
            EntityKind::CarePlan => write!(f, "CarePlan"),
        }
    }
}

/// A clinical entity as it exists in storage.
///
/// The engine never writes these; it only reads them as reconciliation
/// input. `subtype` is the discriminator rules fire on (`loneliness`,
/// `appointment-follow-up-unclear`, ...).
/// Fact bundles list entities under kind-specific keys, so `id`,
/// `kind`, and `created_at` are defaultable on input; consumers
/// normalize `kind` from the key the entity arrived under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntity {
    #[serde(default = "Uuid::new_v4")]
    pub id: EntityId,
    #[serde(default = "default_kind")]
    pub kind: EntityKind,
    #[serde(rename = "type")]
    pub subtype: String,
    /// For care plans: the barrier subtype this plan addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_subtype: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_kind() -> EntityKind {
    EntityKind::Barrier
}

impl PersistedEntity {
    pub fn new(kind: EntityKind, subtype: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            subtype: subtype.into(),
            parent_subtype: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_parent(mut self, parent_subtype: impl Into<String>) -> Self {
        self.parent_subtype = Some(parent_subtype.into());
        self
    }
}

// ── Well-known subtypes ─────────────────────────────────────────────

/// Barrier subtypes produced by the built-in clinical rule set.
pub mod barrier_types {
    pub const LONELINESS: &str = "loneliness";
    pub const LONELINESS2: &str = "loneliness2";
    pub const APPOINTMENT_FOLLOW_UP_UNCLEAR: &str = "appointment-follow-up-unclear";
}

/// Care-plan subtypes produced by the built-in clinical rule set.
pub mod care_plan_types {
    pub const COMBATING_LONELINESS: &str = "content-about-combating-loneliness";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_serializes_subtype_as_type() {
        let entity = PersistedEntity::new(EntityKind::Barrier, barrier_types::LONELINESS);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "loneliness");
        assert_eq!(json["kind"], "barrier");
        assert!(json.get("parentSubtype").is_none());
    }

    #[test]
    fn care_plan_round_trips_with_parent() {
        let entity = PersistedEntity::new(EntityKind::CarePlan, care_plan_types::COMBATING_LONELINESS)
            .with_parent(barrier_types::LONELINESS);
        let json = serde_json::to_string(&entity).unwrap();
        let back: PersistedEntity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }
}
