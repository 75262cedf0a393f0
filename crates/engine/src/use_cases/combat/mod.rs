//! Turn-based combat against catalog enemies.
//!
//! The fight lives in the combat store between calls. Turns, endings and
//! abandonment for one character are serialized by [`SingleFlight`]; a call
//! that finds the character busy is rejected rather than queued.

mod single_flight;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use questline_domain::{
    Catalog, Character, CharacterId, CombatInstance, CombatStatus, CombatStyle, DefeatPenalty,
    DomainError, EnemyId, ItemId, Skill,
};

pub use single_flight::{FlightGuard, SingleFlight};

use crate::infrastructure::ports::{CharacterRepo, CombatStore, RandomPort, RepoError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CombatError {
    #[error("Character is already in combat")]
    Conflict,

    #[error("No active combat")]
    NoActiveCombat,

    #[error("A combat action is already in progress")]
    TurnInFlight,

    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl From<DomainError> for CombatError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(msg) | DomainError::InvalidStateTransition(msg) => {
                Self::Validation(msg)
            }
            DomainError::Inconsistent(msg) => Self::Inconsistent(msg),
        }
    }
}

impl From<StoreError> for CombatError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::Conflict,
            StoreError::NotFound(_) | StoreError::Stale { .. } => Self::NoActiveCombat,
            StoreError::Rejected(e) => e.into(),
            StoreError::Repo(e) => Self::Repo(e),
        }
    }
}

/// State of the fight after a turn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub combat: CombatInstance,
    pub is_over: bool,
    pub victory: bool,
    /// Turns resolved by this call.
    pub turns_played: u32,
}

impl TurnOutcome {
    fn new(combat: CombatInstance, turns_played: u32) -> Self {
        Self {
            is_over: combat.is_over(),
            victory: combat.status() == CombatStatus::Won,
            combat,
            turns_played,
        }
    }
}

/// What an ended fight paid out or cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatResult {
    pub victory: bool,
    pub experience: u64,
    pub gold: u64,
    pub loot: BTreeMap<ItemId, u32>,
    pub combat_skill_xp: BTreeMap<Skill, u64>,
    pub gold_lost: u64,
}

pub struct CombatController {
    combats: Arc<dyn CombatStore>,
    characters: Arc<dyn CharacterRepo>,
    catalog: Arc<Catalog>,
    random: Arc<dyn RandomPort>,
    penalty: DefeatPenalty,
    max_auto_turns: u32,
    in_flight: SingleFlight,
}

impl CombatController {
    pub fn new(
        combats: Arc<dyn CombatStore>,
        characters: Arc<dyn CharacterRepo>,
        catalog: Arc<Catalog>,
        random: Arc<dyn RandomPort>,
        penalty: DefeatPenalty,
        max_auto_turns: u32,
    ) -> Self {
        Self {
            combats,
            characters,
            catalog,
            random,
            penalty,
            max_auto_turns: max_auto_turns.max(1),
            in_flight: SingleFlight::new(),
        }
    }

    pub async fn start(
        &self,
        character_id: CharacterId,
        enemy_id: &EnemyId,
    ) -> Result<CombatInstance, CombatError> {
        let character = self.character(character_id).await?;
        character.ensure_alive()?;
        let enemy = self.catalog.enemy(enemy_id)?;

        let combat = CombatInstance::start(character_id, &character.combat_stats(), enemy);
        self.combats.create(&combat).await?;

        tracing::info!(
            character_id = %character_id,
            combat_id = %combat.id(),
            enemy = %enemy.id,
            "Combat started"
        );
        Ok(combat)
    }

    pub async fn current(&self, character_id: CharacterId) -> Result<CombatInstance, CombatError> {
        self.combats
            .get(character_id)
            .await?
            .ok_or(CombatError::NoActiveCombat)
    }

    /// Resolve one turn.
    pub async fn turn(
        &self,
        character_id: CharacterId,
        style: CombatStyle,
    ) -> Result<TurnOutcome, CombatError> {
        let _guard = self.claim(character_id)?;
        let mut combat = self.current(character_id).await?;
        if combat.is_over() {
            return Err(CombatError::Validation(format!(
                "The fight is over ({:?}); end it to collect the result",
                combat.status()
            )));
        }
        self.play(&mut combat, style, 1).await?;
        Ok(TurnOutcome::new(combat, 1))
    }

    /// Resolve turns until the fight ends or `max_turns` have been played.
    /// The limit is capped by the configured maximum.
    pub async fn auto_turns(
        &self,
        character_id: CharacterId,
        style: CombatStyle,
        max_turns: Option<u32>,
    ) -> Result<TurnOutcome, CombatError> {
        let limit = max_turns
            .unwrap_or(self.max_auto_turns)
            .clamp(1, self.max_auto_turns);

        let _guard = self.claim(character_id)?;
        let mut combat = self.current(character_id).await?;
        let played = self.play(&mut combat, style, limit).await?;
        Ok(TurnOutcome::new(combat, played))
    }

    /// Settle a finished fight.
    ///
    /// `victory` is the caller's claim and must match how the fight ended.
    /// Removing the fight from the store is the claim on its result, so
    /// rewards and penalties apply exactly once.
    pub async fn end(
        &self,
        character_id: CharacterId,
        victory: bool,
    ) -> Result<CombatResult, CombatError> {
        let _guard = self.claim(character_id)?;
        let combat = self.current(character_id).await?;
        if !combat.is_over() {
            return Err(CombatError::Validation(
                "The fight is still going".to_string(),
            ));
        }
        let won = combat.status() == CombatStatus::Won;
        if won != victory {
            return Err(CombatError::Validation(format!(
                "Claimed {} but the fight ended as {:?}",
                if victory { "victory" } else { "defeat" },
                combat.status()
            )));
        }

        let combat = self
            .combats
            .remove(character_id, combat.id())
            .await?
            .ok_or(CombatError::NoActiveCombat)?;
        let result = self.settle(&combat, won).await?;

        tracing::info!(
            character_id = %character_id,
            combat_id = %combat.id(),
            victory = result.victory,
            experience = result.experience,
            gold = result.gold,
            gold_lost = result.gold_lost,
            "Combat ended"
        );
        Ok(result)
    }

    /// Walk away from a fight. Counts as a loss whatever its state.
    pub async fn abandon(&self, character_id: CharacterId) -> Result<CombatResult, CombatError> {
        let _guard = self.claim(character_id)?;
        let combat = self.current(character_id).await?;
        let combat = self
            .combats
            .remove(character_id, combat.id())
            .await?
            .ok_or(CombatError::NoActiveCombat)?;
        let result = self.settle(&combat, false).await?;
        tracing::info!(
            character_id = %character_id,
            combat_id = %combat.id(),
            gold_lost = result.gold_lost,
            "Combat abandoned"
        );
        Ok(result)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn claim(&self, character_id: CharacterId) -> Result<FlightGuard, CombatError> {
        self.in_flight.try_acquire(character_id).ok_or_else(|| {
            tracing::warn!(character_id = %character_id, "Rejected concurrent combat action");
            CombatError::TurnInFlight
        })
    }

    /// Apply the outcome of a removed fight. If that fails the fight goes
    /// back into the store so the player can end it again.
    async fn settle(
        &self,
        combat: &CombatInstance,
        won: bool,
    ) -> Result<CombatResult, CombatError> {
        let outcome = if won {
            self.reward(combat).await
        } else {
            self.defeat(combat.character_id()).await
        };
        if outcome.is_err() {
            match self.combats.create(combat).await {
                Ok(()) => tracing::warn!(
                    character_id = %combat.character_id(),
                    combat_id = %combat.id(),
                    "Combat settle failed, fight restored"
                ),
                Err(e) => tracing::error!(
                    character_id = %combat.character_id(),
                    combat_id = %combat.id(),
                    error = %e,
                    "Combat settle failed and the fight could not be restored"
                ),
            }
        }
        outcome
    }

    async fn reward(&self, combat: &CombatInstance) -> Result<CombatResult, CombatError> {
        let enemy = self.catalog.enemy(combat.enemy_id())?;
        let rewards = combat.victory_rewards(enemy, |min, max| self.random.gen_range(min, max))?;
        self.characters
            .credit(combat.character_id(), &rewards.to_ledger())
            .await?;
        Ok(CombatResult {
            victory: true,
            experience: rewards.experience,
            gold: rewards.gold,
            loot: rewards.loot,
            combat_skill_xp: rewards.combat_skill_xp,
            gold_lost: 0,
        })
    }

    async fn character(&self, character_id: CharacterId) -> Result<Character, CombatError> {
        self.characters
            .get(character_id)
            .await?
            .ok_or(CombatError::CharacterNotFound(character_id))
    }

    /// Play up to `limit` turns and persist the fight. Returns turns played.
    async fn play(
        &self,
        combat: &mut CombatInstance,
        style: CombatStyle,
        limit: u32,
    ) -> Result<u32, CombatError> {
        let player = self.character(combat.character_id()).await?.combat_stats();
        let enemy = self.catalog.enemy(combat.enemy_id())?.stats;

        let mut played = 0;
        while played < limit && !combat.is_over() {
            let report =
                combat.execute_turn(style, &player, &enemy, |min, max| {
                    self.random.gen_range(min, max)
                })?;
            played += 1;
            tracing::debug!(
                character_id = %combat.character_id(),
                turn = combat.turn(),
                player_damage = report.player_damage,
                enemy_damage = ?report.enemy_damage,
                status = ?report.status,
                "Combat turn resolved"
            );
        }

        if played > 0 {
            self.combats.save(combat).await?;
        }
        Ok(played)
    }

    async fn defeat(&self, character_id: CharacterId) -> Result<CombatResult, CombatError> {
        let gold_lost = self
            .characters
            .apply_defeat(character_id, self.penalty)
            .await?;
        Ok(CombatResult {
            gold_lost,
            ..Default::default()
        })
    }
}
