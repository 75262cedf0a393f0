//! CombatInstance aggregate - turn-based fight state machine
//!
//! States: `Active -> {Won, Lost}`. Each call to [`CombatInstance::execute_turn`]
//! resolves one player strike and, if the enemy survives, one counter-strike.
//! Every strike deals at least 1 damage, so a fight always ends within
//! `enemy_max_health` turns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entities::EnemyDef;
use crate::error::DomainError;
use crate::value_objects::{
    CombatAction, CombatActionKind, CombatStats, CombatStatus, CombatStyle, Combatant,
    RewardLedger, Skill,
};
use crate::{CharacterId, CombatId, EnemyId, ItemId};

/// Result of a single resolved turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    pub player_damage: u32,
    pub enemy_damage: Option<u32>,
    pub status: CombatStatus,
}

/// Rewards granted for a won fight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRewards {
    pub experience: u64,
    pub gold: u64,
    pub loot: BTreeMap<ItemId, u32>,
    pub combat_skill_xp: BTreeMap<Skill, u64>,
}

impl CombatRewards {
    pub fn to_ledger(&self) -> RewardLedger {
        RewardLedger {
            gold: self.gold,
            experience: self.experience,
            items: self.loot.clone(),
            discoveries: Vec::new(),
            skill_xp: self.combat_skill_xp.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatInstance {
    id: CombatId,
    character_id: CharacterId,
    enemy_id: EnemyId,
    enemy_name: String,
    player_health: u32,
    player_max_health: u32,
    enemy_health: u32,
    enemy_max_health: u32,
    turn: u32,
    log: Vec<CombatAction>,
    status: CombatStatus,
    style_turns: BTreeMap<CombatStyle, u32>,
}

impl CombatInstance {
    pub fn start(character_id: CharacterId, player: &CombatStats, enemy: &EnemyDef) -> Self {
        Self {
            id: CombatId::new(),
            character_id,
            enemy_id: enemy.id.clone(),
            enemy_name: enemy.name.clone(),
            player_health: player.max_health.max(1),
            player_max_health: player.max_health.max(1),
            enemy_health: enemy.stats.max_health.max(1),
            enemy_max_health: enemy.stats.max_health.max(1),
            turn: 0,
            log: Vec::new(),
            status: CombatStatus::Active,
            style_turns: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> CombatId {
        self.id
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn enemy_id(&self) -> &EnemyId {
        &self.enemy_id
    }

    pub fn player_health(&self) -> u32 {
        self.player_health
    }

    pub fn player_max_health(&self) -> u32 {
        self.player_max_health
    }

    pub fn enemy_health(&self) -> u32 {
        self.enemy_health
    }

    pub fn enemy_max_health(&self) -> u32 {
        self.enemy_max_health
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn log(&self) -> &[CombatAction] {
        &self.log
    }

    pub fn status(&self) -> CombatStatus {
        self.status
    }

    pub fn is_over(&self) -> bool {
        self.status.is_over()
    }

    /// Resolve one turn.
    ///
    /// `roll(min, max)` returns an integer in the inclusive range and drives
    /// the critical-hit checks (player first, then enemy).
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` once the fight is over.
    pub fn execute_turn(
        &mut self,
        style: CombatStyle,
        player: &CombatStats,
        enemy: &CombatStats,
        mut roll: impl FnMut(i32, i32) -> i32,
    ) -> Result<TurnReport, DomainError> {
        if self.status.is_over() {
            return Err(DomainError::invalid_state_transition(format!(
                "combat already ended as {:?}",
                self.status
            )));
        }
        *self.style_turns.entry(style).or_insert(0) += 1;

        let (player_damage, player_crit) =
            strike(player, enemy, style.damage_percent(), &mut roll);
        self.enemy_health = self.enemy_health.saturating_sub(player_damage);
        let message = if player_crit {
            format!(
                "Critical hit! You {} the {} for {} damage",
                style.verb(),
                self.enemy_name,
                player_damage
            )
        } else {
            format!(
                "You {} the {} for {} damage",
                style.verb(),
                self.enemy_name,
                player_damage
            )
        };
        self.record(
            Combatant::Player,
            crit_kind(player_crit),
            message,
            Some(player_damage),
        );

        if self.enemy_health == 0 {
            self.status = CombatStatus::Won;
            let message = format!("The {} was defeated", self.enemy_name);
            self.record(Combatant::Enemy, CombatActionKind::Defeat, message, None);
            return Ok(TurnReport {
                player_damage,
                enemy_damage: None,
                status: self.status,
            });
        }

        let (enemy_damage, enemy_crit) = strike(enemy, player, 100, &mut roll);
        self.player_health = self.player_health.saturating_sub(enemy_damage);
        let message = if enemy_crit {
            format!(
                "The {} lands a critical blow for {} damage",
                self.enemy_name, enemy_damage
            )
        } else {
            format!("The {} hits you for {} damage", self.enemy_name, enemy_damage)
        };
        self.record(
            Combatant::Enemy,
            crit_kind(enemy_crit),
            message,
            Some(enemy_damage),
        );

        if self.player_health == 0 {
            self.status = CombatStatus::Lost;
            self.record(
                Combatant::Player,
                CombatActionKind::Defeat,
                "You were defeated".to_string(),
                None,
            );
        } else {
            self.turn += 1;
        }

        Ok(TurnReport {
            player_damage,
            enemy_damage: Some(enemy_damage),
            status: self.status,
        })
    }

    /// Roll the rewards for a won fight.
    ///
    /// Experience is split across the skills of each style used, in
    /// proportion to the turns fought in that style.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the fight was won.
    pub fn victory_rewards(
        &self,
        enemy: &EnemyDef,
        mut roll: impl FnMut(i32, i32) -> i32,
    ) -> Result<CombatRewards, DomainError> {
        if self.status != CombatStatus::Won {
            return Err(DomainError::invalid_state_transition(format!(
                "no rewards for a {:?} fight",
                self.status
            )));
        }

        let gold = roll(
            clamp_i32(u64::from(enemy.gold_min)),
            clamp_i32(u64::from(enemy.gold_max)),
        )
        .max(0) as u64;

        let mut loot = BTreeMap::new();
        for entry in &enemy.loot {
            if roll(1, 100) <= clamp_i32(u64::from(entry.chance_percent)) {
                *loot.entry(entry.item.clone()).or_insert(0) += entry.quantity;
            }
        }

        let total_turns: u64 = self.style_turns.values().map(|t| u64::from(*t)).sum();
        let mut combat_skill_xp = BTreeMap::new();
        if total_turns > 0 {
            for (style, turns) in &self.style_turns {
                let share = enemy.experience * u64::from(*turns) / total_turns;
                let skills = style.skills();
                let per_skill = share / skills.len() as u64;
                let remainder = share % skills.len() as u64;
                for (index, skill) in skills.iter().enumerate() {
                    let amount = if index == 0 {
                        per_skill + remainder
                    } else {
                        per_skill
                    };
                    *combat_skill_xp.entry(*skill).or_insert(0) += amount;
                }
            }
        }
        combat_skill_xp.retain(|_, xp| *xp > 0);

        Ok(CombatRewards {
            experience: enemy.experience,
            gold,
            loot,
            combat_skill_xp,
        })
    }

    fn record(
        &mut self,
        actor: Combatant,
        action: CombatActionKind,
        message: String,
        damage: Option<u32>,
    ) {
        self.log.push(CombatAction {
            turn: self.turn,
            actor,
            action,
            message,
            damage,
        });
    }
}

fn crit_kind(crit: bool) -> CombatActionKind {
    if crit {
        CombatActionKind::Critical
    } else {
        CombatActionKind::Attack
    }
}

fn clamp_i32(value: u64) -> i32 {
    value.min(i32::MAX as u64) as i32
}

/// Damage dealt by one strike and whether it was critical.
fn strike(
    attacker: &CombatStats,
    defender: &CombatStats,
    style_percent: i64,
    roll: &mut impl FnMut(i32, i32) -> i32,
) -> (u32, bool) {
    let raw = (i64::from(attacker.attack) * style_percent + 50) / 100;
    let mut damage = (raw - i64::from(defender.defense)).max(1);
    let crit = roll(1, 100) <= clamp_i32(u64::from(attacker.crit_chance_percent));
    if crit {
        damage = (damage * i64::from(attacker.crit_multiplier_percent) / 100).max(1);
    }
    (damage.min(i64::from(u32::MAX)) as u32, crit)
}
