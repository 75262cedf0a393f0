//! Reward ledger accumulated by activities and combat.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Skill;
use crate::{ItemId, LandmarkId};

/// Currency, experience and item totals owed to a character.
///
/// Ledgers are folded together with [`RewardLedger::merge`]; merging is
/// associative, so the order in which partial ledgers arrive does not change
/// the total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLedger {
    pub gold: u64,
    pub experience: u64,
    #[serde(default)]
    pub items: BTreeMap<ItemId, u32>,
    #[serde(default)]
    pub discoveries: Vec<LandmarkId>,
    #[serde(default)]
    pub skill_xp: BTreeMap<Skill, u64>,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, item: ItemId, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let entry = self.items.entry(item).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    pub fn add_skill_xp(&mut self, skill: Skill, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.skill_xp.entry(skill).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn add_discovery(&mut self, landmark: LandmarkId) {
        if !self.discoveries.contains(&landmark) {
            self.discoveries.push(landmark);
        }
    }

    /// Fold another ledger into this one.
    pub fn merge(&mut self, other: &RewardLedger) {
        self.gold = self.gold.saturating_add(other.gold);
        self.experience = self.experience.saturating_add(other.experience);
        for (item, quantity) in &other.items {
            self.add_item(item.clone(), *quantity);
        }
        for landmark in &other.discoveries {
            self.add_discovery(landmark.clone());
        }
        for (skill, amount) in &other.skill_xp {
            self.add_skill_xp(*skill, *amount);
        }
    }

    pub fn merged(mut self, other: &RewardLedger) -> Self {
        self.merge(other);
        self
    }

    /// Scale currency, experience and item counts down to `percent`.
    /// Discoveries are facts, not quantities, and are kept as-is.
    pub fn scaled(&self, percent: u32) -> Self {
        let percent = u64::from(percent.min(100));
        let scale = |value: u64| value.saturating_mul(percent) / 100;
        let items = self
            .items
            .iter()
            .filter_map(|(item, quantity)| {
                let scaled = scale(u64::from(*quantity)) as u32;
                (scaled > 0).then(|| (item.clone(), scaled))
            })
            .collect();
        let skill_xp = self
            .skill_xp
            .iter()
            .filter_map(|(skill, xp)| {
                let scaled = scale(*xp);
                (scaled > 0).then_some((*skill, scaled))
            })
            .collect();
        Self {
            gold: scale(self.gold),
            experience: scale(self.experience),
            items,
            discoveries: self.discoveries.clone(),
            skill_xp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gold == 0
            && self.experience == 0
            && self.items.is_empty()
            && self.discoveries.is_empty()
            && self.skill_xp.is_empty()
    }

    pub fn item_count(&self) -> u64 {
        self.items.values().map(|q| u64::from(*q)).sum()
    }
}
