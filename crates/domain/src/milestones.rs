//! Milestone rolls over a range of whole progress points.
//!
//! The roller is handed the half-open range `(from, to]` and rolls each
//! point in it exactly once. Callers always take `from` from the stored
//! session marker and commit the returned ledger together with the marker
//! advance, so a point is never rolled twice.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::aggregates::MAX_POINTS;
use crate::entities::Catalog;
use crate::error::DomainError;
use crate::value_objects::{RewardLedger, Skill};
use crate::{EventId, ItemId, LandmarkId, RecipeId, ZoneId};

/// Success chance of a reward roll at `point`, in basis points.
///
/// Rises linearly from 25% at the start to 50% at completion.
pub fn reward_chance_bp(point: u8) -> i32 {
    2_500 + 25 * i32::from(point.min(MAX_POINTS))
}

/// Discovery rolls happen on every fifth point.
pub const DISCOVERY_INTERVAL: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTable {
    pub tier: u32,
    /// Items with their rarity weight.
    pub loot: Vec<(ItemId, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTable {
    pub chance_percent: u32,
    /// Landmarks not yet known to the character or the session.
    pub candidates: Vec<LandmarkId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTable {
    pub chance_permille: u32,
    pub events: Vec<EventId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftingYield {
    pub item: ItemId,
    pub per_unit: u32,
    /// Quantity goal of the session.
    pub quantity: u32,
    pub experience_per_unit: u64,
}

impl CraftingYield {
    /// Units finished once the marker reaches `point`.
    pub fn units_at(&self, point: u8) -> u32 {
        let point = u64::from(point.min(MAX_POINTS));
        (u64::from(self.quantity) * point / u64::from(MAX_POINTS)) as u32
    }
}

/// What can happen while an activity progresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MilestonePlan {
    pub rewards: Option<RewardTable>,
    pub discoveries: Option<DiscoveryTable>,
    pub events: Option<EventTable>,
    pub crafting: Option<CraftingYield>,
}

impl MilestonePlan {
    /// Exploring a zone: loot, landmarks and events of that zone.
    pub fn exploration(
        catalog: &Catalog,
        zone: &ZoneId,
        known: &BTreeSet<LandmarkId>,
    ) -> Result<Self, DomainError> {
        let zone = catalog.zone(zone)?;
        Ok(Self {
            rewards: Some(RewardTable {
                tier: zone.tier,
                loot: zone
                    .loot
                    .iter()
                    .map(|item| (item.clone(), catalog.item_weight(item)))
                    .collect(),
            }),
            discoveries: Some(DiscoveryTable {
                chance_percent: zone.discovery_chance_percent,
                candidates: unknown(&zone.landmarks, known),
            }),
            events: Some(EventTable {
                chance_permille: zone.event_chance_permille,
                events: zone.events.clone(),
            }),
            crafting: None,
        })
    }

    /// Travelling: landmarks spotted along the way to the destination, and
    /// the destination's events. No loot.
    pub fn travel(
        catalog: &Catalog,
        destination: &ZoneId,
        known: &BTreeSet<LandmarkId>,
    ) -> Result<Self, DomainError> {
        let zone = catalog.zone(destination)?;
        Ok(Self {
            rewards: None,
            discoveries: Some(DiscoveryTable {
                chance_percent: zone.discovery_chance_percent,
                candidates: unknown(&zone.landmarks, known),
            }),
            events: Some(EventTable {
                chance_permille: zone.event_chance_permille,
                events: zone.events.clone(),
            }),
            crafting: None,
        })
    }

    /// Crafting: deterministic output plus occasional byproducts.
    pub fn crafting(
        catalog: &Catalog,
        recipe: &RecipeId,
        quantity: u32,
    ) -> Result<Self, DomainError> {
        let recipe = catalog.recipe(recipe)?;
        let rewards = (!recipe.byproducts.is_empty()).then(|| RewardTable {
            tier: recipe.tier,
            loot: recipe
                .byproducts
                .iter()
                .map(|item| (item.clone(), catalog.item_weight(item)))
                .collect(),
        });
        Ok(Self {
            rewards,
            discoveries: None,
            events: None,
            crafting: Some(CraftingYield {
                item: recipe.output.clone(),
                per_unit: recipe.output_quantity,
                quantity,
                experience_per_unit: recipe.experience_per_unit,
            }),
        })
    }
}

fn unknown(landmarks: &[LandmarkId], known: &BTreeSet<LandmarkId>) -> Vec<LandmarkId> {
    landmarks
        .iter()
        .filter(|landmark| !known.contains(*landmark))
        .cloned()
        .collect()
}

/// A single thing that happened within a rolled range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MilestoneOutcome {
    Reward {
        point: u8,
        gold: u64,
        experience: u64,
        items: BTreeMap<ItemId, u32>,
    },
    Discovery {
        point: u8,
        landmark: LandmarkId,
    },
    Event {
        event: EventId,
    },
    Crafted {
        item: ItemId,
        quantity: u32,
    },
}

/// Everything rolled for one range, with the folded ledger delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollBatch {
    pub outcomes: Vec<MilestoneOutcome>,
    pub ledger: RewardLedger,
    pub reward_rolls: u32,
    pub discovery_rolls: u32,
    pub event_rolled: bool,
    pub triggered_event: Option<EventId>,
}

impl RollBatch {
    pub fn discoveries(&self) -> impl Iterator<Item = &LandmarkId> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            MilestoneOutcome::Discovery { landmark, .. } => Some(landmark),
            _ => None,
        })
    }
}

/// Roll every point in `(from, to]`.
///
/// `roll(min, max)` returns an integer in the inclusive range. An empty range
/// rolls nothing, not even the event check.
///
/// # Errors
///
/// Returns `InvalidStateTransition` if `to` is past 100 or before `from`.
pub fn roll_outcomes(
    plan: &MilestonePlan,
    from: u8,
    to: u8,
    event_active: bool,
    mut roll: impl FnMut(i32, i32) -> i32,
) -> Result<RollBatch, DomainError> {
    if to > MAX_POINTS || to < from {
        return Err(DomainError::invalid_state_transition(format!(
            "cannot roll milestones from {} to {}",
            from, to
        )));
    }

    let mut batch = RollBatch::default();
    if to == from {
        return Ok(batch);
    }

    let mut candidates = plan
        .discoveries
        .as_ref()
        .map(|table| table.candidates.clone())
        .unwrap_or_default();

    for point in (from + 1)..=to {
        if let Some(table) = &plan.rewards {
            batch.reward_rolls += 1;
            if roll(1, 10_000) <= reward_chance_bp(point) {
                let outcome = roll_reward(table, point, &mut roll);
                if let MilestoneOutcome::Reward {
                    gold,
                    experience,
                    items,
                    ..
                } = &outcome
                {
                    batch.ledger.gold = batch.ledger.gold.saturating_add(*gold);
                    batch.ledger.experience = batch.ledger.experience.saturating_add(*experience);
                    for (item, quantity) in items {
                        batch.ledger.add_item(item.clone(), *quantity);
                    }
                }
                batch.outcomes.push(outcome);
            }
        }

        if let Some(table) = &plan.discoveries {
            if point % DISCOVERY_INTERVAL == 0 {
                batch.discovery_rolls += 1;
                let hit = roll(1, 100) <= to_i32(u64::from(table.chance_percent));
                if hit && !candidates.is_empty() {
                    let index = pick_index(candidates.len(), &mut roll);
                    let landmark = candidates.remove(index);
                    batch.ledger.add_discovery(landmark.clone());
                    batch
                        .outcomes
                        .push(MilestoneOutcome::Discovery { point, landmark });
                }
            }
        }
    }

    if let Some(table) = &plan.events {
        if !event_active && !table.events.is_empty() {
            batch.event_rolled = true;
            if roll(1, 1_000) <= to_i32(u64::from(table.chance_permille)) {
                let event = table.events[pick_index(table.events.len(), &mut roll)].clone();
                batch.triggered_event = Some(event.clone());
                batch.outcomes.push(MilestoneOutcome::Event { event });
            }
        }
    }

    if let Some(yield_) = &plan.crafting {
        let units = yield_.units_at(to) - yield_.units_at(from);
        if units > 0 {
            let quantity = units.saturating_mul(yield_.per_unit);
            let experience = u64::from(units).saturating_mul(yield_.experience_per_unit);
            batch.ledger.add_item(yield_.item.clone(), quantity);
            batch.ledger.experience = batch.ledger.experience.saturating_add(experience);
            batch.ledger.add_skill_xp(Skill::Crafting, experience);
            batch.outcomes.push(MilestoneOutcome::Crafted {
                item: yield_.item.clone(),
                quantity,
            });
        }
    }

    Ok(batch)
}

fn roll_reward(
    table: &RewardTable,
    point: u8,
    roll: &mut impl FnMut(i32, i32) -> i32,
) -> MilestoneOutcome {
    let mut items = BTreeMap::new();
    let count = roll(3, 8);
    for _ in 0..count {
        if let Some(item) = weighted_pick(&table.loot, roll) {
            *items.entry(item.clone()).or_insert(0) += 1;
        }
    }
    let tier = u64::from(table.tier.max(1));
    let gold = tier * roll(1, 10).max(0) as u64;
    let experience = tier * roll(5, 15).max(0) as u64;
    MilestoneOutcome::Reward {
        point,
        gold,
        experience,
        items,
    }
}

fn weighted_pick<'a>(
    table: &'a [(ItemId, u32)],
    roll: &mut impl FnMut(i32, i32) -> i32,
) -> Option<&'a ItemId> {
    let total: u64 = table.iter().map(|(_, weight)| u64::from(*weight)).sum();
    if total == 0 {
        return None;
    }
    let target = i64::from(roll(1, to_i32(total)));
    let mut cumulative = 0i64;
    for (item, weight) in table {
        cumulative += i64::from(*weight);
        if target <= cumulative {
            return Some(item);
        }
    }
    table.last().map(|(item, _)| item)
}

fn pick_index(len: usize, roll: &mut impl FnMut(i32, i32) -> i32) -> usize {
    let max = to_i32(len.saturating_sub(1) as u64);
    (roll(0, max).max(0) as usize).min(len.saturating_sub(1))
}

fn to_i32(value: u64) -> i32 {
    value.min(i32::MAX as u64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmark(name: &str) -> LandmarkId {
        LandmarkId::from(name)
    }

    fn exploration_plan(candidates: Vec<LandmarkId>) -> MilestonePlan {
        MilestonePlan {
            rewards: Some(RewardTable {
                tier: 2,
                loot: vec![(ItemId::from("herb"), 60), (ItemId::from("amber"), 10)],
            }),
            discoveries: Some(DiscoveryTable {
                chance_percent: 30,
                candidates,
            }),
            events: None,
            crafting: None,
        }
    }

    fn landmarks() -> Vec<LandmarkId> {
        ["old_well", "standing_stones", "hollow_oak", "ruined_tower"]
            .into_iter()
            .map(landmark)
            .collect()
    }

    /// Small deterministic generator standing in for a seeded RNG.
    fn lcg(seed: u64) -> impl FnMut(i32, i32) -> i32 {
        let mut state = seed;
        move |min, max| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let span = (i64::from(max) - i64::from(min) + 1) as u64;
            (i64::from(min) + ((state >> 33) % span) as i64) as i32
        }
    }

    #[test]
    fn reward_chance_rises_from_quarter_to_half() {
        assert_eq!(reward_chance_bp(0), 2_500);
        assert_eq!(reward_chance_bp(100), 5_000);
        assert!(reward_chance_bp(40) < reward_chance_bp(41));
    }

    #[test]
    fn forty_seven_points_roll_47_rewards_and_9_discoveries() {
        let plan = exploration_plan(landmarks());
        let batch = roll_outcomes(&plan, 0, 47, false, lcg(3)).unwrap();

        assert_eq!(batch.reward_rolls, 47);
        assert_eq!(batch.discovery_rolls, 9);

        // Polling again at the same marker rolls nothing at all.
        let mut again = 0;
        let repeat = roll_outcomes(&plan, 47, 47, false, |min, _| {
            again += 1;
            min
        })
        .unwrap();
        assert_eq!(again, 0);
        assert_eq!(repeat, RollBatch::default());
    }

    #[test]
    fn splitting_the_range_rolls_the_same_ledger() {
        let mut rng = lcg(7);
        let whole = roll_outcomes(&exploration_plan(landmarks()), 0, 100, false, &mut rng).unwrap();

        let mut rng = lcg(7);
        let mut ledger = RewardLedger::new();
        let mut known = BTreeSet::new();
        for (from, to) in [(0, 30), (30, 64), (64, 99), (99, 100)] {
            let plan = exploration_plan(unknown(&landmarks(), &known));
            let batch = roll_outcomes(&plan, from, to, false, &mut rng).unwrap();
            known.extend(batch.discoveries().cloned());
            ledger.merge(&batch.ledger);
        }

        assert_eq!(ledger, whole.ledger);
    }

    #[test]
    fn successful_reward_draws_three_to_eight_items() {
        let plan = MilestonePlan {
            rewards: exploration_plan(vec![]).rewards,
            ..Default::default()
        };
        // Lowest roll everywhere: every trial succeeds and draws 3 items.
        let batch = roll_outcomes(&plan, 0, 1, false, |min, _| min).unwrap();
        assert_eq!(batch.outcomes.len(), 1);
        assert_eq!(batch.ledger.item_count(), 3);
        assert_eq!(batch.ledger.gold, 2);
        assert_eq!(batch.ledger.experience, 10);

        // Highest roll: the trial fails.
        let batch = roll_outcomes(&plan, 0, 1, false, |_, max| max).unwrap();
        assert!(batch.outcomes.is_empty());
        assert!(batch.ledger.is_empty());
    }

    #[test]
    fn discoveries_never_repeat_and_run_out_quietly() {
        let plan = MilestonePlan {
            discoveries: Some(DiscoveryTable {
                chance_percent: 100,
                candidates: vec![landmark("old_well"), landmark("hollow_oak")],
            }),
            ..Default::default()
        };

        let batch = roll_outcomes(&plan, 0, 100, false, |min, _| min).unwrap();

        assert_eq!(batch.discovery_rolls, 20);
        assert_eq!(
            batch.ledger.discoveries,
            vec![landmark("old_well"), landmark("hollow_oak")]
        );
    }

    #[test]
    fn event_is_rolled_once_per_call_and_not_while_one_is_active() {
        let plan = MilestonePlan {
            events: Some(EventTable {
                chance_permille: 1_000,
                events: vec![EventId::from("ambush")],
            }),
            ..Default::default()
        };

        let batch = roll_outcomes(&plan, 0, 60, false, |min, _| min).unwrap();
        assert!(batch.event_rolled);
        assert_eq!(batch.triggered_event, Some(EventId::from("ambush")));

        let blocked = roll_outcomes(&plan, 60, 70, true, |min, _| min).unwrap();
        assert!(!blocked.event_rolled);
        assert_eq!(blocked.triggered_event, None);
    }

    #[test]
    fn crafted_units_follow_the_marker() {
        let plan = MilestonePlan {
            crafting: Some(CraftingYield {
                item: ItemId::from("iron_bar"),
                per_unit: 2,
                quantity: 3,
                experience_per_unit: 10,
            }),
            ..Default::default()
        };

        let mut total = RewardLedger::new();
        for (from, to) in [(0, 20), (20, 34), (34, 67), (67, 100)] {
            let batch = roll_outcomes(&plan, from, to, false, |min, _| min).unwrap();
            total.merge(&batch.ledger);
        }

        assert_eq!(total.items[&ItemId::from("iron_bar")], 6);
        assert_eq!(total.skill_xp[&Skill::Crafting], 30);
        assert_eq!(plan.crafting.as_ref().map(|c| c.units_at(34)), Some(1));
    }

    #[test]
    fn backwards_or_overflowing_range_is_rejected() {
        let plan = MilestonePlan::default();
        assert!(roll_outcomes(&plan, 50, 40, false, |min, _| min).is_err());
        assert!(roll_outcomes(&plan, 50, 101, false, |min, _| min).is_err());
    }
}
