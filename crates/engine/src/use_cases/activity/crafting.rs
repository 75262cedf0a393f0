//! Crafting a batch of a recipe.

use std::collections::BTreeMap;
use std::sync::Arc;

use questline_domain::{ActivityConfig, ActivityKind, ActivitySession, CharacterId, ItemId};

use super::{ActivityError, ActivityRunner, CraftingRequest};

/// Largest batch a single crafting session may hold.
pub const MAX_CRAFT_QUANTITY: u32 = 100;

pub struct CraftingActivity {
    runner: Arc<ActivityRunner>,
}

impl CraftingActivity {
    pub fn new(runner: Arc<ActivityRunner>) -> Self {
        Self { runner }
    }

    /// Consume the inputs for the whole batch and start crafting.
    pub async fn start(
        &self,
        character_id: CharacterId,
        request: CraftingRequest,
    ) -> Result<ActivitySession, ActivityError> {
        if !(1..=MAX_CRAFT_QUANTITY).contains(&request.quantity) {
            return Err(ActivityError::Validation(format!(
                "Quantity must be between 1 and {}",
                MAX_CRAFT_QUANTITY
            )));
        }

        let character = self.runner.load_character(character_id).await?;
        character.ensure_alive()?;

        let recipe = self.runner.catalog().recipe(&request.recipe)?;
        let inputs: BTreeMap<ItemId, u32> = recipe
            .inputs
            .iter()
            .map(|(item, per_unit)| (item.clone(), per_unit.saturating_mul(request.quantity)))
            .collect();
        if !character.has_items(&inputs) {
            return Err(ActivityError::Validation(format!(
                "Not enough materials for {} x {}",
                request.quantity, recipe.name
            )));
        }

        self.runner
            .ensure_idle(character_id, ActivityKind::Crafting)
            .await?;

        let config = ActivityConfig::Crafting {
            recipe: recipe.id.clone(),
            quantity: request.quantity,
            seconds_per_unit: recipe.seconds_per_unit,
        };
        let session = self.runner.session_for(character_id, config)?;
        self.runner.consume(character_id, &inputs).await?;
        self.runner.open(session, &inputs).await
    }
}
