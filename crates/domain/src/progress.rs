//! Progress calculation for time-driven activities.
//!
//! Progress is a pure function of the session's server-side start time and
//! the current server time. A reloaded client gets the same answer as the
//! one that started the activity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregates::{ActivitySession, MAX_POINTS};
use crate::error::DomainError;

/// Progress of a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Completion in `0.0..=100.0`.
    pub percent: f64,
    /// Elapsed time, capped at `total_ms`.
    pub elapsed_ms: u64,
    pub total_ms: u64,
}

impl Progress {
    /// Whole percentage points reached, floored.
    ///
    /// Computed in integer space so that the boundary is exact: a session
    /// exactly 47% in reports 47, never 46.
    pub fn whole_points(&self) -> u8 {
        if self.total_ms == 0 {
            return 0;
        }
        let points = u128::from(self.elapsed_ms) * u128::from(MAX_POINTS) / u128::from(self.total_ms);
        points.min(u128::from(MAX_POINTS)) as u8
    }
}

/// Compute the progress of `session` at `now`.
///
/// A `now` before the start yields zero progress; a `now` past the end
/// yields exactly 100.
///
/// # Errors
///
/// Returns `DomainError::Inconsistent` if the session has no positive
/// duration. Such a session is never treated as instantly complete.
pub fn progress_at(session: &ActivitySession, now: DateTime<Utc>) -> Result<Progress, DomainError> {
    let total_ms = session.duration_ms();
    if total_ms == 0 {
        return Err(DomainError::inconsistent(format!(
            "session {} has no positive duration",
            session.id()
        )));
    }

    let elapsed = now.signed_duration_since(session.started_at()).num_milliseconds();
    let elapsed_ms = u64::try_from(elapsed).unwrap_or(0).min(total_ms);
    let percent = (elapsed_ms as f64 / total_ms as f64 * 100.0).clamp(0.0, 100.0);

    Ok(Progress {
        percent,
        elapsed_ms,
        total_ms,
    })
}
