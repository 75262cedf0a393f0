//! Value objects - immutable values without identity.

mod activity;
mod combat;
mod ledger;
mod skill;

pub use activity::{ActivityConfig, ActivityKind, ActivityStatus, ExpeditionType, TravelMode};
pub use combat::{
    CombatAction, CombatActionKind, CombatStats, CombatStatus, CombatStyle, Combatant,
    DefeatPenalty,
};
pub use ledger::RewardLedger;
pub use skill::Skill;
