//! Aggregate roots - domain objects that own their related data
//!
//! Each aggregate keeps its fields private and exposes state changes through
//! methods that enforce its invariants.

pub mod activity_session;
pub mod character;
pub mod combat_instance;

pub use activity_session::{ActivitySession, MAX_POINTS};
pub use character::{level_for_experience, Character, MAX_LEVEL};
pub use combat_instance::{CombatInstance, CombatRewards, TurnReport};
