//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod catalog;
pub mod characters;
pub mod clock;
pub mod combats;
pub mod database;
pub mod memory;
pub mod ports;
pub mod sessions;
pub mod settings;
