//! Request and result types of the activity controllers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use questline_domain::{
    ActivityKind, ActivitySession, ActivityStatus, EventId, ExpeditionType, ItemId, LandmarkId,
    MilestoneOutcome, RecipeId, RewardLedger, TravelMode, ZoneId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub destination: ZoneId,
    #[serde(default)]
    pub mode: TravelMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationRequest {
    pub zone: ZoneId,
    #[serde(default)]
    pub expedition: ExpeditionType,
    #[serde(default)]
    pub supplies: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftingRequest {
    pub recipe: RecipeId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub reason: String,
}

/// What a poll reports back to the client.
///
/// `discoveries` and `rewards` only hold what this poll committed; `ledger`
/// is everything accumulated so far (the credited total once `completed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub kind: ActivityKind,
    pub progress: f64,
    pub processed_points: u8,
    pub time_spent_ms: u64,
    pub total_ms: u64,
    pub discoveries: Vec<LandmarkId>,
    pub rewards: Vec<MilestoneOutcome>,
    pub event: Option<EventId>,
    pub completed: bool,
    pub failed: Option<FailureInfo>,
    pub ledger: RewardLedger,
}

impl PollResult {
    pub(crate) fn failed(session: &ActivitySession) -> Self {
        Self {
            kind: session.kind(),
            progress: 0.0,
            processed_points: session.processed_points(),
            time_spent_ms: 0,
            total_ms: session.duration_ms(),
            discoveries: Vec::new(),
            rewards: Vec::new(),
            event: None,
            completed: false,
            failed: Some(FailureInfo {
                reason: session
                    .failure_reason()
                    .unwrap_or("The expedition failed")
                    .to_string(),
            }),
            ledger: session.ledger().clone(),
        }
    }
}

/// Ledger credited when a session is stopped, cancelled or acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedLedger {
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub processed_points: u8,
    pub ledger: RewardLedger,
    /// Inputs returned for work that was never done.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refunded: BTreeMap<ItemId, u32>,
}
