//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Activity session storage (SQLite or in-memory)
//! - Combat storage
//! - Character access
//! - Clock/Random (for testing)

mod error;
mod repos;
mod testing;

pub use error::{RepoError, StoreError};
pub use repos::{CharacterRepo, CombatStore, SessionStore};
pub use testing::{ClockPort, RandomPort};

#[cfg(test)]
pub use repos::{MockCharacterRepo, MockSessionStore};
