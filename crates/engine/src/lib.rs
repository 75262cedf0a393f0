//! Questline Engine library.
//!
//! Server-side controllers for progress-driven activities and turn-based
//! combat.
//!
//! ## Structure
//!
//! - `use_cases/` - Activity and combat controllers
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
