//! Fact bundle input and the clinical-record fetcher boundary.
//!
//! The engine does not know how facts were retrieved. A [`FactFetcher`]
//! produces the static [`FactBundle`] for a member; the real
//! implementation lives in the clinical record integration, and
//! [`StubFetcher`] stands in for it here.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use coach_core::{EntityKind, PersistedEntity};

use crate::catalog::facts;
use crate::error::Result;
use crate::reconcile::CurrentState;

// ── Fact bundle ─────────────────────────────────────────────────────

/// Static facts for one engine run: the member's profile, caregivers,
/// and currently persisted barriers and care plans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactBundle {
    #[serde(default)]
    pub member_info: Value,
    #[serde(default)]
    pub caregivers: Vec<Value>,
    #[serde(default)]
    pub barriers: Vec<PersistedEntity>,
    #[serde(default)]
    pub care_plans: Vec<PersistedEntity>,
}

impl FactBundle {
    /// The bundle as almanac static facts.
    pub fn static_facts(&self) -> Result<HashMap<String, Value>> {
        Ok(HashMap::from([
            (facts::MEMBER_INFO.to_string(), self.member_info.clone()),
            (
                facts::CAREGIVERS.to_string(),
                Value::Array(self.caregivers.clone()),
            ),
            (
                facts::BARRIERS.to_string(),
                serde_json::to_value(&self.normalized_barriers())?,
            ),
            (
                facts::CARE_PLANS.to_string(),
                serde_json::to_value(&self.normalized_care_plans())?,
            ),
        ]))
    }

    /// The bundle's persisted entities as reconciliation input.
    pub fn current_state(&self) -> CurrentState {
        CurrentState::from_entities(
            self.normalized_barriers()
                .into_iter()
                .chain(self.normalized_care_plans()),
        )
    }

    fn normalized_barriers(&self) -> Vec<PersistedEntity> {
        self.barriers
            .iter()
            .cloned()
            .map(|mut e| {
                e.kind = EntityKind::Barrier;
                e
            })
            .collect()
    }

    fn normalized_care_plans(&self) -> Vec<PersistedEntity> {
        self.care_plans
            .iter()
            .cloned()
            .map(|mut e| {
                e.kind = EntityKind::CarePlan;
                e
            })
            .collect()
    }
}

// ── Fetcher boundary ────────────────────────────────────────────────

/// Retrieves the static fact bundle for a member from the clinical
/// record system.
#[async_trait]
pub trait FactFetcher: Send + Sync {
    async fn fetch(&self, member_id: &str) -> Result<FactBundle>;
}

/// In-source stand-in for the clinical record integration: returns a
/// canned bundle for any member.
pub struct StubFetcher;

#[async_trait]
impl FactFetcher for StubFetcher {
    async fn fetch(&self, member_id: &str) -> Result<FactBundle> {
        tracing::debug!(member_id = %member_id, "stub fetcher serving canned bundle");
        Ok(FactBundle {
            member_info: json!({
                "id": member_id,
                "livesAlone": true,
                "scheduledAppointments": 0,
                "appointmentsToBeScheduled": 0,
                "nested": {"example": 1},
            }),
            caregivers: vec![json!("x")],
            barriers: Vec::new(),
            care_plans: Vec::new(),
        })
    }
}
