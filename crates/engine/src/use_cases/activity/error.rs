//! Activity controller errors.

use questline_domain::{ActivityKind, CharacterId, DomainError};

use crate::infrastructure::ports::{RepoError, StoreError};

/// Errors that can occur while driving an activity.
///
/// A failed risk roll is not an error: it is reported through
/// [`super::PollResult::failed`].
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("A {kind} session is already active")]
    Conflict { kind: ActivityKind },

    #[error("No active {kind} session")]
    NoActiveSession { kind: ActivityKind },

    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Engine-internal inconsistency; never shown verbatim to players.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl From<DomainError> for ActivityError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(msg) | DomainError::InvalidStateTransition(msg) => {
                Self::Validation(msg)
            }
            DomainError::Inconsistent(msg) => Self::Inconsistent(msg),
        }
    }
}

impl ActivityError {
    /// Map a store error that the controller did not handle itself.
    pub(crate) fn from_store(error: StoreError, kind: ActivityKind) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::Conflict { kind },
            StoreError::NotFound(_) => Self::NoActiveSession { kind },
            StoreError::Stale { expected, actual } => Self::Inconsistent(format!(
                "{} session marker kept moving ({} -> {})",
                kind, expected, actual
            )),
            StoreError::Rejected(e) => e.into(),
            StoreError::Repo(e) => Self::Repo(e),
        }
    }

    /// Insufficient items surface as validation failures.
    pub(crate) fn from_consume(error: RepoError) -> Self {
        match error {
            RepoError::ConstraintViolation(msg) => Self::Validation(msg),
            other => Self::Repo(other),
        }
    }
}
