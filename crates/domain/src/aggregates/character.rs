//! Character aggregate - the player's character as seen by the engine
//!
//! The engine only needs the parts of a character that activities and combat
//! read or credit: level, location, purse, inventory, skills and stats.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{CombatStats, DefeatPenalty, RewardLedger, Skill};
use crate::{CharacterId, ItemId, LandmarkId, ZoneId};

/// Highest reachable character level.
pub const MAX_LEVEL: u32 = 99;

/// Experience needed per level step grows quadratically.
pub fn level_for_experience(experience: u64) -> u32 {
    let steps = ((experience / 100) as f64).sqrt().floor() as u32;
    (1 + steps).min(MAX_LEVEL)
}

/// # Invariants
///
/// - `name` is non-empty after trimming
/// - `level` always matches `experience`
/// - inventory never holds zero-quantity entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    id: CharacterId,
    name: String,
    level: u32,
    experience: u64,
    gold: u64,
    zone: ZoneId,
    inventory: BTreeMap<ItemId, u32>,
    skills: BTreeMap<Skill, u64>,
    discovered: BTreeSet<LandmarkId>,
    alive: bool,
}

impl Character {
    pub fn new(name: impl Into<String>, zone: ZoneId) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Character name cannot be empty"));
        }
        Ok(Self {
            id: CharacterId::new(),
            name: trimmed.to_string(),
            level: 1,
            experience: 0,
            gold: 0,
            zone,
            inventory: BTreeMap::new(),
            skills: BTreeMap::new(),
            discovered: BTreeSet::new(),
            alive: true,
        })
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    pub fn with_id(mut self, id: CharacterId) -> Self {
        self.id = id;
        self
    }

    pub fn with_experience(mut self, experience: u64) -> Self {
        self.experience = experience;
        self.level = level_for_experience(experience);
        self
    }

    pub fn with_gold(mut self, gold: u64) -> Self {
        self.gold = gold;
        self
    }

    pub fn with_item(mut self, item: ItemId, quantity: u32) -> Self {
        if quantity > 0 {
            *self.inventory.entry(item).or_insert(0) += quantity;
        }
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> CharacterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn experience(&self) -> u64 {
        self.experience
    }

    pub fn gold(&self) -> u64 {
        self.gold
    }

    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    pub fn inventory(&self) -> &BTreeMap<ItemId, u32> {
        &self.inventory
    }

    pub fn item_count(&self, item: &ItemId) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    pub fn skills(&self) -> &BTreeMap<Skill, u64> {
        &self.skills
    }

    pub fn discovered(&self) -> &BTreeSet<LandmarkId> {
        &self.discovered
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn combat_stats(&self) -> CombatStats {
        CombatStats::for_level(self.level)
    }

    /// Fails with a validation error when the character cannot act.
    pub fn ensure_alive(&self) -> Result<(), DomainError> {
        if self.alive {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "{} has fallen and cannot act",
                self.name
            )))
        }
    }

    pub fn has_items(&self, items: &BTreeMap<ItemId, u32>) -> bool {
        items
            .iter()
            .all(|(item, quantity)| self.item_count(item) >= *quantity)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Credit a finalized ledger: gold, experience, items, skills, discoveries.
    pub fn credit(&mut self, ledger: &RewardLedger) {
        self.gold = self.gold.saturating_add(ledger.gold);
        self.experience = self.experience.saturating_add(ledger.experience);
        self.level = level_for_experience(self.experience);
        for (item, quantity) in &ledger.items {
            if *quantity > 0 {
                let entry = self.inventory.entry(item.clone()).or_insert(0);
                *entry = entry.saturating_add(*quantity);
            }
        }
        for (skill, xp) in &ledger.skill_xp {
            let entry = self.skills.entry(*skill).or_insert(0);
            *entry = entry.saturating_add(*xp);
        }
        self.discovered.extend(ledger.discoveries.iter().cloned());
    }

    /// Remove items, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` naming the first missing item.
    pub fn consume(&mut self, items: &BTreeMap<ItemId, u32>) -> Result<(), DomainError> {
        if let Some((item, needed)) = items
            .iter()
            .find(|(item, quantity)| self.item_count(item) < **quantity)
        {
            return Err(DomainError::validation(format!(
                "Not enough {}: need {}, have {}",
                item,
                needed,
                self.item_count(item)
            )));
        }
        for (item, quantity) in items {
            if let Some(held) = self.inventory.get_mut(item) {
                *held -= quantity;
                if *held == 0 {
                    self.inventory.remove(item);
                }
            }
        }
        Ok(())
    }

    pub fn move_to(&mut self, zone: ZoneId) {
        self.zone = zone;
    }

    /// Apply the configured penalty for losing a fight. Returns gold lost.
    pub fn apply_defeat(&mut self, penalty: DefeatPenalty) -> u64 {
        match penalty {
            DefeatPenalty::Permadeath => {
                self.alive = false;
                0
            }
            DefeatPenalty::GoldLoss { percent } => {
                let lost = self.gold.saturating_mul(u64::from(percent.min(100))) / 100;
                self.gold -= lost;
                lost
            }
            DefeatPenalty::None => 0,
        }
    }
}
