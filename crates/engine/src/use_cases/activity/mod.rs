//! Progress-driven activities: travel, exploration and crafting.
//!
//! Each kind validates and opens its own sessions; polling, stopping and
//! event resolution are shared through [`ActivityRunner`].

mod crafting;
mod error;
mod exploration;
mod runner;
mod travel;
mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use questline_domain::{ActivityKind, CharacterId, EventId};

pub use crafting::{CraftingActivity, MAX_CRAFT_QUANTITY};
pub use error::ActivityError;
pub use exploration::ExplorationActivity;
pub use runner::{ActivityRunner, MAX_STALE_RETRIES};
pub use travel::TravelActivity;
pub use types::{
    CraftingRequest, ExplorationRequest, FailureInfo, FinalizedLedger, PollResult, TravelRequest,
};

/// Container for activity use cases.
pub struct ActivityUseCases {
    pub travel: TravelActivity,
    pub exploration: ExplorationActivity,
    pub crafting: CraftingActivity,
    runner: Arc<ActivityRunner>,
}

impl ActivityUseCases {
    pub fn new(runner: Arc<ActivityRunner>) -> Self {
        Self {
            travel: TravelActivity::new(runner.clone()),
            exploration: ExplorationActivity::new(runner.clone()),
            crafting: CraftingActivity::new(runner.clone()),
            runner,
        }
    }

    pub async fn poll(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<PollResult, ActivityError> {
        self.runner.poll(character_id, kind).await
    }

    pub async fn stop(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<FinalizedLedger, ActivityError> {
        self.runner.stop(character_id, kind).await
    }

    /// Abort the activity. Accrued rewards are still credited and unused
    /// crafting inputs come back, but nothing is reported.
    pub async fn cancel(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<(), ActivityError> {
        self.runner.stop(character_id, kind).await.map(|_| ())
    }

    pub async fn resolve_event(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<Option<EventId>, ActivityError> {
        self.runner.resolve_event(character_id, kind).await
    }
}
