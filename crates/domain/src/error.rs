//! Unified error types for the domain layer
//!
//! Provides a common error type that can be used across all domain operations,
//! enabling consistent error handling without forcing adapters to use String or anyhow.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed (malformed config, insufficient resources)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Engine-internal inconsistency, e.g. a session whose config yields no
    /// positive duration. Never coerced into a successful outcome.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),
}

impl DomainError {
    /// Creates a validation error for business rule violations.
    ///
    /// Use this when the caller supplied something the engine refuses to act
    /// on:
    /// - Unknown zones, recipes or enemies
    /// - Values outside allowed ranges
    /// - Missing items or supplies
    ///
    /// # Example
    /// ```ignore
    /// if quantity == 0 {
    ///     return Err(DomainError::validation("Quantity must be at least 1"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    /// Create an inconsistency error
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
