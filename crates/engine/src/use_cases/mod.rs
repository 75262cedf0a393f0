//! Use cases - User story orchestration.
//!
//! Each module contains use cases for a specific domain area.
//! Use cases orchestrate across ports to fulfill player requests.

pub mod activity;
pub mod character;
pub mod combat;

// Re-export main types
pub use activity::{ActivityRunner, ActivityUseCases};
pub use character::CharacterOps;
pub use combat::CombatController;
