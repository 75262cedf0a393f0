//! Error types for port operations.

use questline_domain::{CharacterId, DomainError};

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Business constraint violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    /// Create a NotFound error with entity type and ID context.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from the activity session and combat stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A live record already exists for this character.
    #[error("{what} already active for character {character_id}")]
    Conflict {
        what: &'static str,
        character_id: CharacterId,
    },

    /// Optimistic concurrency loss: someone else moved the record first.
    #[error("Stale marker: expected {expected}, found {actual}")]
    Stale { expected: u8, actual: u8 },

    /// The record is gone, usually because it was finalized concurrently.
    #[error("{0} not found")]
    NotFound(String),

    /// The aggregate refused the change.
    #[error("Rejected: {0}")]
    Rejected(#[from] DomainError),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl StoreError {
    /// Stale and NotFound both mean another caller got there first.
    pub fn is_lost_race(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::NotFound(_))
    }
}
