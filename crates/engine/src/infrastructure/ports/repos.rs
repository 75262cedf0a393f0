//! Storage port traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use questline_domain::{
    ActivityKind, ActivitySession, ActivityStatus, Character, CharacterId, CombatId,
    CombatInstance, DefeatPenalty, EventId, ItemId, RewardLedger, SessionId, ZoneId,
};

use super::error::{RepoError, StoreError};

// =============================================================================
// Activity Sessions
// =============================================================================

/// Durable storage for live activity sessions, at most one per
/// (character, kind).
///
/// `advance` and `finalize` are compare-and-set operations on the session's
/// progress marker. They are the only way ledger-affecting state changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. `Conflict` if one is live for the same pair.
    async fn create(&self, session: &ActivitySession) -> Result<(), StoreError>;

    async fn get_active(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<Option<ActivitySession>, StoreError>;

    /// Move the marker from `expected_points` to `new_points` and merge
    /// `delta` into the stored ledger in the same write.
    ///
    /// Returns the updated session, or `Stale` if the marker moved.
    async fn advance(
        &self,
        session_id: SessionId,
        expected_points: u8,
        new_points: u8,
        delta: &RewardLedger,
        triggered_event: Option<EventId>,
    ) -> Result<ActivitySession, StoreError>;

    /// Clear the active event. Returns the event that was cleared.
    async fn clear_event(&self, session_id: SessionId) -> Result<Option<EventId>, StoreError>;

    /// Close the session with `status` and remove it, iff the marker still
    /// equals `expected_points`. The caller that gets `Ok` owns the ledger.
    async fn finalize(
        &self,
        session_id: SessionId,
        expected_points: u8,
        status: ActivityStatus,
    ) -> Result<ActivitySession, StoreError>;
}

// =============================================================================
// Combat
// =============================================================================

/// Storage for in-progress fights, at most one per character.
#[async_trait]
pub trait CombatStore: Send + Sync {
    /// `Conflict` if the character is already fighting.
    async fn create(&self, combat: &CombatInstance) -> Result<(), StoreError>;

    async fn get(&self, character_id: CharacterId) -> Result<Option<CombatInstance>, StoreError>;

    /// Overwrite an existing fight. `NotFound` if it was removed meanwhile.
    async fn save(&self, combat: &CombatInstance) -> Result<(), StoreError>;

    /// Remove the fight. `None` means somebody else already removed it.
    async fn remove(
        &self,
        character_id: CharacterId,
        combat_id: CombatId,
    ) -> Result<Option<CombatInstance>, StoreError>;
}

// =============================================================================
// Characters
// =============================================================================

/// Characters as the engine sees them. Each mutation is applied atomically
/// to the stored character and returns the result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn get(&self, id: CharacterId) -> Result<Option<Character>, RepoError>;
    async fn save(&self, character: &Character) -> Result<(), RepoError>;

    async fn credit(&self, id: CharacterId, ledger: &RewardLedger) -> Result<Character, RepoError>;

    /// Remove items, all or nothing. `ConstraintViolation` when short.
    async fn consume_items(
        &self,
        id: CharacterId,
        items: &BTreeMap<ItemId, u32>,
    ) -> Result<Character, RepoError>;

    async fn set_zone(&self, id: CharacterId, zone: &ZoneId) -> Result<Character, RepoError>;

    /// Apply a lost fight's penalty. Returns the gold taken.
    async fn apply_defeat(&self, id: CharacterId, penalty: DefeatPenalty)
        -> Result<u64, RepoError>;
}
