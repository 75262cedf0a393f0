//! Activity kinds, lifecycle status and per-kind configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{RecipeId, ZoneId};

/// The three time-based activities a character can run. A character may have
/// one live session of each kind at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Travel,
    Exploration,
    Crafting,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Travel => "travel",
            Self::Exploration => "exploration",
            Self::Crafting => "crafting",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "travel" => Ok(Self::Travel),
            "exploration" => Ok(Self::Exploration),
            "crafting" => Ok(Self::Crafting),
            other => Err(DomainError::validation(format!(
                "Unknown activity kind: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

/// Expedition variants trade duration against danger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpeditionType {
    /// Light and fast: half the time, half the risk.
    Scout,
    #[default]
    Standard,
    /// Slow and deep: twice the time, half again the risk.
    Deep,
}

impl ExpeditionType {
    pub fn duration_factor_percent(&self) -> u64 {
        match self {
            Self::Scout => 50,
            Self::Standard => 100,
            Self::Deep => 200,
        }
    }

    pub fn risk_factor(&self) -> f64 {
        match self {
            Self::Scout => 0.5,
            Self::Standard => 1.0,
            Self::Deep => 1.5,
        }
    }

    /// Supply units that must be packed before setting out.
    pub fn min_supplies(&self) -> u32 {
        match self {
            Self::Scout => 0,
            Self::Standard => 1,
            Self::Deep => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Walk,
    Ride,
}

impl TravelMode {
    /// Distance units covered per minute.
    pub fn speed(&self) -> u32 {
        match self {
            Self::Walk => 2,
            Self::Ride => 5,
        }
    }
}

/// Resolved configuration stored on an activity session.
///
/// Everything needed to recompute the session's duration is captured here at
/// start time, so later catalog edits never shift the progress of a running
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityConfig {
    Travel {
        from: ZoneId,
        to: ZoneId,
        distance: u32,
        speed: u32,
    },
    Exploration {
        zone: ZoneId,
        expedition: ExpeditionType,
        supplies: u32,
        /// Base exploration time of the zone, in seconds.
        base_seconds: u64,
    },
    Crafting {
        recipe: RecipeId,
        quantity: u32,
        seconds_per_unit: u64,
    },
}

impl ActivityConfig {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Self::Travel { .. } => ActivityKind::Travel,
            Self::Exploration { .. } => ActivityKind::Exploration,
            Self::Crafting { .. } => ActivityKind::Crafting,
        }
    }

    /// Total duration in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Inconsistent` when the config cannot produce a
    /// positive duration.
    pub fn duration_ms(&self) -> Result<u64, DomainError> {
        let ms = match self {
            Self::Travel {
                distance, speed, ..
            } => {
                if *speed == 0 {
                    return Err(DomainError::inconsistent("Travel speed is zero"));
                }
                u64::from(*distance).saturating_mul(60_000) / u64::from(*speed)
            }
            Self::Exploration {
                expedition,
                base_seconds,
                ..
            } => base_seconds
                .saturating_mul(1_000)
                .saturating_mul(expedition.duration_factor_percent())
                / 100,
            Self::Crafting {
                quantity,
                seconds_per_unit,
                ..
            } => seconds_per_unit
                .saturating_mul(1_000)
                .saturating_mul(u64::from(*quantity)),
        };

        if ms == 0 {
            return Err(DomainError::inconsistent(format!(
                "{} config produces a zero duration",
                self.kind()
            )));
        }
        Ok(ms)
    }
}
