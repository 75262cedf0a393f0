//! Expedition risk model.

use serde::{Deserialize, Serialize};

use crate::value_objects::{ExpeditionType, RewardLedger};

pub const MIN_FAILURE_PERCENT: f64 = 5.0;
pub const MAX_FAILURE_PERCENT: f64 = 60.0;

/// Share of a single tier-scaled reward kept after a failed expedition.
pub const FAILURE_REWARD_PERCENT: u32 = 25;

/// Failure chance of an expedition, shown before it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Percent in `5.0..=60.0`.
    pub failure_probability: f64,
}

impl RiskAssessment {
    /// Roll the assessment once. `true` means the expedition failed.
    pub fn rolls_failure(&self, mut roll: impl FnMut(i32, i32) -> i32) -> bool {
        let threshold = (self.failure_probability * 100.0).round() as i32;
        roll(1, 10_000) <= threshold
    }
}

/// Failure chance from the gap between zone danger and character level.
///
/// Zones at or below the character's level still carry the minimum risk.
pub fn assess_risk(character_level: u32, zone_danger: u32, expedition: ExpeditionType) -> RiskAssessment {
    let gap = i64::from(zone_danger).saturating_sub(i64::from(character_level));
    let base = gap.saturating_mul(2).max(0);
    let scaled = base as f64 * expedition.risk_factor();
    RiskAssessment {
        failure_probability: scaled.clamp(MIN_FAILURE_PERCENT, MAX_FAILURE_PERCENT),
    }
}

const FAILURE_STORIES: [&str; 4] = [
    "A rockslide cut off the path through {zone} and the party turned back",
    "Wolves harried the party out of {zone} before nightfall",
    "The guide lost the trail in {zone} and the supplies ran out",
    "A sudden storm swept through {zone} and forced a retreat",
];

/// Human-readable reason for a failed expedition.
pub fn failure_narrative(zone_name: &str, mut roll: impl FnMut(i32, i32) -> i32) -> String {
    let last = FAILURE_STORIES.len() - 1;
    let index = (roll(0, last as i32).max(0) as usize).min(last);
    FAILURE_STORIES[index].replace("{zone}", zone_name)
}

/// Reduced ledger granted for a failed expedition: a quarter of one
/// tier-scaled reward, experience only.
pub fn failure_ledger(tier: u32) -> RewardLedger {
    let full = RewardLedger {
        experience: u64::from(tier.max(1)).saturating_mul(10),
        ..Default::default()
    };
    full.scaled(FAILURE_REWARD_PERCENT)
}
