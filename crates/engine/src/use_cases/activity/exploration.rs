//! Exploring a zone, with a risk roll at the outset.

use std::collections::BTreeMap;
use std::sync::Arc;

use questline_domain::{
    assess_risk, failure_ledger, failure_narrative, ActivityConfig, ActivityKind,
    ActivitySession, CharacterId, ExpeditionType, RiskAssessment, ZoneId,
};

use super::{ActivityError, ActivityRunner, ExplorationRequest};

pub struct ExplorationActivity {
    runner: Arc<ActivityRunner>,
}

impl ExplorationActivity {
    pub fn new(runner: Arc<ActivityRunner>) -> Self {
        Self { runner }
    }

    /// Failure chance the character would face, without committing anything.
    pub async fn preview_risk(
        &self,
        character_id: CharacterId,
        zone: &ZoneId,
        expedition: ExpeditionType,
    ) -> Result<RiskAssessment, ActivityError> {
        let character = self.runner.load_character(character_id).await?;
        let zone = self.runner.catalog().zone(zone)?;
        Ok(assess_risk(character.level(), zone.danger, expedition))
    }

    /// Start exploring the zone the character stands in.
    ///
    /// Supplies are consumed up front. The risk is rolled once: a failed
    /// roll still creates a session, already failed, which holds the reduced
    /// ledger until the player acknowledges it.
    pub async fn start(
        &self,
        character_id: CharacterId,
        request: ExplorationRequest,
    ) -> Result<ActivitySession, ActivityError> {
        let character = self.runner.load_character(character_id).await?;
        character.ensure_alive()?;

        let catalog = self.runner.catalog();
        let zone = catalog.zone(&request.zone)?;
        if character.zone() != &zone.id {
            return Err(ActivityError::Validation(format!(
                "{} must be in {} to explore it",
                character.name(),
                zone.name
            )));
        }

        let required = request.expedition.min_supplies();
        if request.supplies < required {
            return Err(ActivityError::Validation(format!(
                "A {:?} expedition needs at least {} supplies",
                request.expedition, required
            )));
        }

        self.runner
            .ensure_idle(character_id, ActivityKind::Exploration)
            .await?;

        let mut supplies = BTreeMap::new();
        if request.supplies > 0 {
            supplies.insert(catalog.supply_item().clone(), request.supplies);
        }

        let config = ActivityConfig::Exploration {
            zone: zone.id.clone(),
            expedition: request.expedition,
            supplies: request.supplies,
            base_seconds: zone.exploration_seconds,
        };

        let risk = assess_risk(character.level(), zone.danger, request.expedition);
        let session = if risk.rolls_failure(|min, max| self.runner.roll(min, max)) {
            let reason = failure_narrative(&zone.name, |min, max| self.runner.roll(min, max));
            tracing::info!(
                character_id = %character_id,
                zone = %zone.id,
                failure_probability = risk.failure_probability,
                "Expedition failed its risk roll"
            );
            ActivitySession::failed(
                character_id,
                config,
                self.runner.now(),
                reason,
                failure_ledger(zone.tier),
            )?
        } else {
            self.runner.session_for(character_id, config)?
        };

        self.runner.consume(character_id, &supplies).await?;
        self.runner.open(session, &supplies).await
    }
}
