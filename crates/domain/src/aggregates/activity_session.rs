//! ActivitySession aggregate - a persisted, time-driven activity
//!
//! # Design
//!
//! - **Authoritative start**: progress is always derived from `started_at`
//!   and the server clock, never from a client counter.
//! - **Monotonic marker**: `processed_points` (whole percentage points) only
//!   moves forward, and the reward ledger only changes together with it.
//! - **Private fields**: state changes go through methods that enforce the
//!   above.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{ActivityConfig, ActivityKind, ActivityStatus, RewardLedger};
use crate::{CharacterId, EventId, SessionId};

/// Highest value of the progress marker.
pub const MAX_POINTS: u8 = 100;

/// A character's in-progress travel, exploration or crafting activity.
///
/// # Invariants
///
/// - `duration_ms` is strictly positive
/// - `processed_points` is in `0..=100` and never decreases
/// - a failed session carries a failure reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySession {
    id: SessionId,
    character_id: CharacterId,
    config: ActivityConfig,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    processed_points: u8,
    ledger: RewardLedger,
    active_event: Option<EventId>,
    status: ActivityStatus,
    failure_reason: Option<String>,
}

impl ActivitySession {
    /// Start a new active session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Inconsistent` if the config produces no positive
    /// duration.
    pub fn start(
        character_id: CharacterId,
        config: ActivityConfig,
        started_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let duration_ms = config.duration_ms()?;
        Ok(Self {
            id: SessionId::new(),
            character_id,
            config,
            started_at,
            duration_ms,
            processed_points: 0,
            ledger: RewardLedger::new(),
            active_event: None,
            status: ActivityStatus::Active,
            failure_reason: None,
        })
    }

    /// Create a session that failed its risk roll at the outset. It never
    /// accrues progress and only holds the reduced ledger until acknowledged.
    pub fn failed(
        character_id: CharacterId,
        config: ActivityConfig,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
        ledger: RewardLedger,
    ) -> Result<Self, DomainError> {
        let mut session = Self::start(character_id, config, started_at)?;
        session.status = ActivityStatus::Failed;
        session.failure_reason = Some(reason.into());
        session.ledger = ledger;
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn kind(&self) -> ActivityKind {
        self.config.kind()
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn processed_points(&self) -> u8 {
        self.processed_points
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn active_event(&self) -> Option<&EventId> {
        self.active_event.as_ref()
    }

    pub fn status(&self) -> ActivityStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.status == ActivityStatus::Failed
    }

    /// Advance the marker to `new_points`, folding `delta` into the ledger.
    ///
    /// `expected_points` is the marker value the caller computed from; a
    /// mismatch means someone else already advanced the session.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if the session is not active, the marker
    ///   has moved past `expected_points`, or `new_points` does not move it
    ///   forward
    pub fn advance(
        &mut self,
        expected_points: u8,
        new_points: u8,
        delta: &RewardLedger,
        triggered_event: Option<EventId>,
    ) -> Result<(), DomainError> {
        if self.status != ActivityStatus::Active {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot advance a {:?} session",
                self.status
            )));
        }
        if self.processed_points != expected_points {
            return Err(DomainError::invalid_state_transition(format!(
                "marker is at {}, expected {}",
                self.processed_points, expected_points
            )));
        }
        if new_points <= expected_points || new_points > MAX_POINTS {
            return Err(DomainError::invalid_state_transition(format!(
                "marker cannot move from {} to {}",
                expected_points, new_points
            )));
        }

        self.processed_points = new_points;
        self.ledger.merge(delta);
        if triggered_event.is_some() && self.active_event.is_none() {
            self.active_event = triggered_event;
        }
        Ok(())
    }

    /// Resolve the currently active event, if any. Returns the cleared event.
    pub fn clear_event(&mut self) -> Option<EventId> {
        self.active_event.take()
    }

    /// Close the session with a terminal status.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` when completing before the marker reaches
    ///   100, or when re-labelling a failed session as anything but failed
    pub fn close(&mut self, status: ActivityStatus) -> Result<(), DomainError> {
        match status {
            ActivityStatus::Active => Err(DomainError::invalid_state_transition(
                "cannot close a session as active",
            )),
            ActivityStatus::Completed if self.processed_points < MAX_POINTS => {
                Err(DomainError::invalid_state_transition(format!(
                    "cannot complete at {}%",
                    self.processed_points
                )))
            }
            _ if self.is_failed() && status != ActivityStatus::Failed => {
                Err(DomainError::invalid_state_transition(
                    "a failed session can only be acknowledged",
                ))
            }
            ActivityStatus::Failed if !self.is_failed() => Err(
                DomainError::invalid_state_transition("only a failed session closes as failed"),
            ),
            _ => {
                self.status = status;
                Ok(())
            }
        }
    }
}
