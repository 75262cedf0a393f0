//! Questline domain: activity sessions, progress, milestone rolls, risk and
//! turn-based combat.
//!
//! Pure business logic. No I/O, no async and no RNG crate: every random
//! decision is made through an injected `roll(min, max)` closure returning an
//! integer in the inclusive range, so callers choose the randomness source.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod ids;
pub mod milestones;
pub mod progress;
pub mod risk;
pub mod value_objects;

pub use aggregates::{
    level_for_experience, ActivitySession, Character, CombatInstance, CombatRewards, TurnReport,
    MAX_LEVEL, MAX_POINTS,
};
pub use entities::{
    Catalog, CatalogData, EnemyDef, EnemyLoot, EventDef, ItemDef, LandmarkDef, Rarity, RecipeDef,
    ZoneDef,
};
pub use error::DomainError;
pub use ids::{
    CharacterId, CombatId, EnemyId, EventId, ItemId, LandmarkId, RecipeId, SessionId, ZoneId,
};
pub use milestones::{roll_outcomes, MilestoneOutcome, MilestonePlan, RollBatch};
pub use progress::{progress_at, Progress};
pub use risk::{assess_risk, failure_ledger, failure_narrative, RiskAssessment};
pub use value_objects::{
    ActivityConfig, ActivityKind, ActivityStatus, CombatAction, CombatActionKind, CombatStats,
    CombatStatus, CombatStyle, Combatant, DefeatPenalty, ExpeditionType, RewardLedger, Skill,
    TravelMode,
};
