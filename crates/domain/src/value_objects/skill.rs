//! Trainable skills credited by combat and crafting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A skill that accumulates experience independently of character level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Attack,
    Strength,
    Defence,
    Ranged,
    Magic,
    Crafting,
}

impl Skill {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Strength => "strength",
            Self::Defence => "defence",
            Self::Ranged => "ranged",
            Self::Magic => "magic",
            Self::Crafting => "crafting",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
