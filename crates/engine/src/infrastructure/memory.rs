//! In-memory adapters.
//!
//! Used by tests and by ephemeral deployments (`SESSION_DB=:memory:`). The
//! activity store serializes writers behind one lock, which gives the same
//! compare-and-set semantics as the SQLite store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use questline_domain::{
    ActivityKind, ActivitySession, ActivityStatus, Character, CharacterId, CombatId,
    CombatInstance, DefeatPenalty, EventId, ItemId, RewardLedger, SessionId, ZoneId,
};
use tokio::sync::RwLock;

use crate::infrastructure::ports::{
    CharacterRepo, CombatStore, RepoError, SessionStore, StoreError,
};

// =============================================================================
// Activity sessions
// =============================================================================

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, ActivitySession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn session_not_found(id: SessionId) -> StoreError {
    StoreError::NotFound(format!("activity session {}", id))
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &ActivitySession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let taken = sessions.values().any(|existing| {
            existing.character_id() == session.character_id() && existing.kind() == session.kind()
        });
        if taken {
            return Err(StoreError::Conflict {
                what: "activity session",
                character_id: session.character_id(),
            });
        }
        sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_active(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<Option<ActivitySession>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|session| session.character_id() == character_id && session.kind() == kind)
            .cloned())
    }

    async fn advance(
        &self,
        session_id: SessionId,
        expected_points: u8,
        new_points: u8,
        delta: &RewardLedger,
        triggered_event: Option<EventId>,
    ) -> Result<ActivitySession, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        if stored.processed_points() != expected_points {
            return Err(StoreError::Stale {
                expected: expected_points,
                actual: stored.processed_points(),
            });
        }
        let mut updated = stored.clone();
        updated.advance(expected_points, new_points, delta, triggered_event)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn clear_event(&self, session_id: SessionId) -> Result<Option<EventId>, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        Ok(stored.clear_event())
    }

    async fn finalize(
        &self,
        session_id: SessionId,
        expected_points: u8,
        status: ActivityStatus,
    ) -> Result<ActivitySession, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get(&session_id)
            .ok_or_else(|| session_not_found(session_id))?;
        if stored.processed_points() != expected_points {
            return Err(StoreError::Stale {
                expected: expected_points,
                actual: stored.processed_points(),
            });
        }
        let mut closed = stored.clone();
        closed.close(status)?;
        sessions.remove(&session_id);
        Ok(closed)
    }
}

// =============================================================================
// Combat
// =============================================================================

#[derive(Default)]
pub struct InMemoryCombatStore {
    combats: DashMap<CharacterId, CombatInstance>,
}

impl InMemoryCombatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CombatStore for InMemoryCombatStore {
    async fn create(&self, combat: &CombatInstance) -> Result<(), StoreError> {
        match self.combats.entry(combat.character_id()) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                what: "combat",
                character_id: combat.character_id(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(combat.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, character_id: CharacterId) -> Result<Option<CombatInstance>, StoreError> {
        Ok(self.combats.get(&character_id).map(|c| c.value().clone()))
    }

    async fn save(&self, combat: &CombatInstance) -> Result<(), StoreError> {
        match self.combats.get_mut(&combat.character_id()) {
            Some(mut stored) if stored.id() == combat.id() => {
                *stored = combat.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("combat {}", combat.id()))),
        }
    }

    async fn remove(
        &self,
        character_id: CharacterId,
        combat_id: CombatId,
    ) -> Result<Option<CombatInstance>, StoreError> {
        Ok(self
            .combats
            .remove_if(&character_id, |_, combat| combat.id() == combat_id)
            .map(|(_, combat)| combat))
    }
}

// =============================================================================
// Characters
// =============================================================================

#[derive(Default)]
pub struct InMemoryCharacterRepo {
    characters: DashMap<CharacterId, Character>,
}

impl InMemoryCharacterRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(
        &self,
        id: CharacterId,
        apply: impl FnOnce(&mut Character) -> Result<T, RepoError>,
    ) -> Result<(T, Character), RepoError> {
        let mut stored = self
            .characters
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("Character", id))?;
        let mut updated = stored.clone();
        let value = apply(&mut updated)?;
        *stored = updated.clone();
        Ok((value, updated))
    }
}

#[async_trait]
impl CharacterRepo for InMemoryCharacterRepo {
    async fn get(&self, id: CharacterId) -> Result<Option<Character>, RepoError> {
        Ok(self.characters.get(&id).map(|c| c.value().clone()))
    }

    async fn save(&self, character: &Character) -> Result<(), RepoError> {
        self.characters.insert(character.id(), character.clone());
        Ok(())
    }

    async fn credit(&self, id: CharacterId, ledger: &RewardLedger) -> Result<Character, RepoError> {
        self.update(id, |character| {
            character.credit(ledger);
            Ok(())
        })
        .map(|(_, character)| character)
    }

    async fn consume_items(
        &self,
        id: CharacterId,
        items: &BTreeMap<ItemId, u32>,
    ) -> Result<Character, RepoError> {
        self.update(id, |character| {
            character.consume(items).map_err(RepoError::constraint)
        })
        .map(|(_, character)| character)
    }

    async fn set_zone(&self, id: CharacterId, zone: &ZoneId) -> Result<Character, RepoError> {
        self.update(id, |character| {
            character.move_to(zone.clone());
            Ok(())
        })
        .map(|(_, character)| character)
    }

    async fn apply_defeat(
        &self,
        id: CharacterId,
        penalty: DefeatPenalty,
    ) -> Result<u64, RepoError> {
        self.update(id, |character| Ok(character.apply_defeat(penalty)))
            .map(|(lost, _)| lost)
    }
}
