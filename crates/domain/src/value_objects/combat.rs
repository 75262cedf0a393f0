//! Combat value objects: styles, stats, log entries and defeat penalties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Skill;
use crate::error::DomainError;

/// How the player fights. Changes damage output and which skills train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombatStyle {
    #[default]
    Melee,
    Ranged,
    Magic,
}

impl CombatStyle {
    /// Damage multiplier in percent.
    pub fn damage_percent(&self) -> i64 {
        match self {
            Self::Melee => 100,
            Self::Ranged => 90,
            Self::Magic => 120,
        }
    }

    /// Skills credited for turns fought in this style.
    pub fn skills(&self) -> &'static [Skill] {
        match self {
            Self::Melee => &[Skill::Attack, Skill::Strength, Skill::Defence],
            Self::Ranged => &[Skill::Ranged, Skill::Defence],
            Self::Magic => &[Skill::Magic, Skill::Defence],
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Melee => "strike",
            Self::Ranged => "shoot",
            Self::Magic => "blast",
        }
    }
}

/// Offensive and defensive numbers for either side of a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub attack: u32,
    pub defense: u32,
    pub max_health: u32,
    pub crit_chance_percent: u32,
    /// Damage multiplier applied on a critical hit, in percent (200 = double).
    pub crit_multiplier_percent: u32,
}

impl CombatStats {
    /// Baseline stats for a character of the given level.
    pub fn for_level(level: u32) -> Self {
        let level = level.max(1);
        Self {
            attack: 8 + level * 2,
            defense: 2 + level,
            max_health: 40 + level * 10,
            crit_chance_percent: 5,
            crit_multiplier_percent: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combatant {
    Player,
    Enemy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatActionKind {
    Attack,
    Critical,
    Defeat,
}

/// Immutable combat log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatAction {
    pub turn: u32,
    pub actor: Combatant,
    pub action: CombatActionKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatStatus {
    Active,
    Won,
    Lost,
}

impl CombatStatus {
    pub fn is_over(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// What happens to a character who loses a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefeatPenalty {
    /// The character is marked dead and can no longer act.
    Permadeath,
    /// A share of carried gold is lost.
    GoldLoss { percent: u32 },
    None,
}

impl Default for DefeatPenalty {
    fn default() -> Self {
        Self::GoldLoss { percent: 10 }
    }
}

impl FromStr for DefeatPenalty {
    type Err = DomainError;

    /// Parses `permadeath`, `none` or `gold_loss:<percent>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "permadeath" => Ok(Self::Permadeath),
            "none" => Ok(Self::None),
            other => {
                let percent = other
                    .strip_prefix("gold_loss:")
                    .and_then(|p| p.parse::<u32>().ok())
                    .filter(|p| *p <= 100)
                    .ok_or_else(|| {
                        DomainError::validation(format!("Unknown defeat penalty: {}", other))
                    })?;
                Ok(Self::GoldLoss { percent })
            }
        }
    }
}

impl fmt::Display for DefeatPenalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permadeath => f.write_str("permadeath"),
            Self::GoldLoss { percent } => write!(f, "gold_loss:{}", percent),
            Self::None => f.write_str("none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defeat_penalty_parses_all_forms() {
        assert_eq!("permadeath".parse::<DefeatPenalty>(), Ok(DefeatPenalty::Permadeath));
        assert_eq!("none".parse::<DefeatPenalty>(), Ok(DefeatPenalty::None));
        assert_eq!(
            "gold_loss:25".parse::<DefeatPenalty>(),
            Ok(DefeatPenalty::GoldLoss { percent: 25 })
        );
        assert!("gold_loss:150".parse::<DefeatPenalty>().is_err());
        assert!("banish".parse::<DefeatPenalty>().is_err());
    }

    #[test]
    fn defeat_penalty_display_round_trips() {
        let penalty = DefeatPenalty::GoldLoss { percent: 10 };
        assert_eq!(penalty.to_string().parse::<DefeatPenalty>(), Ok(penalty));
    }

    #[test]
    fn melee_trains_three_skills() {
        assert_eq!(CombatStyle::Melee.skills().len(), 3);
        assert!(CombatStyle::Magic.skills().contains(&Skill::Magic));
    }
}
