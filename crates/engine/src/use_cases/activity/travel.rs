//! Travel between zones.

use std::collections::BTreeMap;
use std::sync::Arc;

use questline_domain::{ActivityConfig, ActivityKind, ActivitySession, CharacterId};

use super::{ActivityError, ActivityRunner, TravelRequest};

pub struct TravelActivity {
    runner: Arc<ActivityRunner>,
}

impl TravelActivity {
    pub fn new(runner: Arc<ActivityRunner>) -> Self {
        Self { runner }
    }

    /// Set out from the character's current zone towards `destination`.
    /// The character only arrives when the session completes.
    pub async fn start(
        &self,
        character_id: CharacterId,
        request: TravelRequest,
    ) -> Result<ActivitySession, ActivityError> {
        let character = self.runner.load_character(character_id).await?;
        character.ensure_alive()?;

        let catalog = self.runner.catalog();
        let from = catalog.zone(character.zone())?;
        let to = catalog.zone(&request.destination)?;
        if from.id == to.id {
            return Err(ActivityError::Validation(format!(
                "Already in {}",
                to.name
            )));
        }

        let distance = from.distance_to(to);
        if distance == 0 {
            return Err(ActivityError::Validation(format!(
                "{} and {} share a position",
                from.name, to.name
            )));
        }

        let config = ActivityConfig::Travel {
            from: from.id.clone(),
            to: to.id.clone(),
            distance,
            speed: request.mode.speed(),
        };

        self.runner
            .ensure_idle(character_id, ActivityKind::Travel)
            .await?;
        let session = self.runner.session_for(character_id, config)?;
        self.runner.open(session, &BTreeMap::new()).await
    }
}
