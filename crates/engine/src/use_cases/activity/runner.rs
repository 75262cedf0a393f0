//! Shared poll/finalize machinery for all activity kinds.
//!
//! Every ledger change goes through a compare-and-set on the session's
//! progress marker. A poller that loses the race re-reads the session and
//! rolls only the points still unprocessed, so each point is rolled once no
//! matter how many clients poll at the same time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use questline_domain::{
    progress_at, roll_outcomes, ActivityConfig, ActivityKind, ActivitySession, ActivityStatus,
    Catalog, Character, CharacterId, EventId, ItemId, LandmarkId, MilestoneOutcome,
    MilestonePlan, Progress, RewardLedger, RollBatch, MAX_POINTS,
};

use super::error::ActivityError;
use super::types::{FinalizedLedger, PollResult};
use crate::infrastructure::ports::{CharacterRepo, ClockPort, RandomPort, SessionStore};

/// How often a poll re-reads the session after losing a marker race.
pub const MAX_STALE_RETRIES: usize = 8;

pub struct ActivityRunner {
    sessions: Arc<dyn SessionStore>,
    characters: Arc<dyn CharacterRepo>,
    catalog: Arc<Catalog>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl ActivityRunner {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        characters: Arc<dyn CharacterRepo>,
        catalog: Arc<Catalog>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            sessions,
            characters,
            catalog,
            clock,
            random,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub(crate) fn roll(&self, min: i32, max: i32) -> i32 {
        self.random.gen_range(min, max)
    }

    // =========================================================================
    // Start helpers
    // =========================================================================

    pub(crate) async fn load_character(
        &self,
        character_id: CharacterId,
    ) -> Result<Character, ActivityError> {
        self.characters
            .get(character_id)
            .await?
            .ok_or(ActivityError::CharacterNotFound(character_id))
    }

    /// Fails with `Conflict` when a session of `kind` is already live.
    pub(crate) async fn ensure_idle(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<(), ActivityError> {
        let live = self
            .sessions
            .get_active(character_id, kind)
            .await
            .map_err(|e| ActivityError::from_store(e, kind))?;
        match live {
            Some(_) => Err(ActivityError::Conflict { kind }),
            None => Ok(()),
        }
    }

    pub(crate) async fn consume(
        &self,
        character_id: CharacterId,
        items: &BTreeMap<ItemId, u32>,
    ) -> Result<(), ActivityError> {
        if items.values().all(|quantity| *quantity == 0) {
            return Ok(());
        }
        self.characters
            .consume_items(character_id, items)
            .await
            .map_err(ActivityError::from_consume)?;
        Ok(())
    }

    /// Build a session from `config` at the current server time.
    pub(crate) fn session_for(
        &self,
        character_id: CharacterId,
        config: ActivityConfig,
    ) -> Result<ActivitySession, ActivityError> {
        Ok(ActivitySession::start(character_id, config, self.clock.now())?)
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Persist a freshly started session. Items consumed for it are handed
    /// back if the store refuses it.
    pub(crate) async fn open(
        &self,
        session: ActivitySession,
        consumed: &BTreeMap<ItemId, u32>,
    ) -> Result<ActivitySession, ActivityError> {
        let kind = session.kind();
        if let Err(e) = self.sessions.create(&session).await {
            if !consumed.is_empty() {
                let refund = RewardLedger {
                    items: consumed.clone(),
                    ..Default::default()
                };
                self.characters
                    .credit(session.character_id(), &refund)
                    .await?;
            }
            return Err(ActivityError::from_store(e, kind));
        }

        tracing::info!(
            character_id = %session.character_id(),
            session_id = %session.id(),
            kind = ?kind,
            duration_ms = session.duration_ms(),
            failed = session.is_failed(),
            "Activity started"
        );
        Ok(session)
    }

    // =========================================================================
    // Poll
    // =========================================================================

    pub async fn poll(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<PollResult, ActivityError> {
        let mut last_seen = None;

        for attempt in 0..MAX_STALE_RETRIES {
            let session = self.active(character_id, kind).await?;
            if session.is_failed() {
                return Ok(PollResult::failed(&session));
            }

            let progress = progress_at(&session, self.clock.now())?;
            let from = session.processed_points();
            let to = progress.whole_points().max(from);

            if to == from {
                if from < MAX_POINTS {
                    return Ok(snapshot(&session, &progress, RollBatch::default(), false));
                }
                // Reached 100 earlier but the finalize never landed.
                return self
                    .complete(session, progress, RollBatch::default())
                    .await;
            }

            let known = self.known_landmarks(&session).await?;
            let plan = self.plan(session.config(), &known)?;
            let batch = roll_outcomes(
                &plan,
                from,
                to,
                session.active_event().is_some(),
                |min, max| self.roll(min, max),
            )?;

            match self
                .sessions
                .advance(
                    session.id(),
                    from,
                    to,
                    &batch.ledger,
                    batch.triggered_event.clone(),
                )
                .await
            {
                Ok(updated) => {
                    tracing::debug!(
                        character_id = %character_id,
                        kind = ?kind,
                        from,
                        to,
                        outcomes = batch.outcomes.len(),
                        "Rolled milestones"
                    );
                    if to == MAX_POINTS {
                        return self.complete(updated, progress, batch).await;
                    }
                    return Ok(snapshot(&updated, &progress, batch, false));
                }
                Err(e) if e.is_lost_race() => {
                    tracing::debug!(
                        character_id = %character_id,
                        kind = ?kind,
                        attempt,
                        error = %e,
                        "Lost marker race, re-reading session"
                    );
                    last_seen = Some((session, progress));
                }
                Err(e) => return Err(ActivityError::from_store(e, kind)),
            }
        }

        // Heavy contention: report what is committed and let the next poll
        // pick up the rest.
        tracing::warn!(
            character_id = %character_id,
            kind = ?kind,
            retries = MAX_STALE_RETRIES,
            "Giving up on rolling this poll"
        );
        match last_seen {
            Some((session, progress)) => Ok(snapshot(&session, &progress, RollBatch::default(), false)),
            None => Err(ActivityError::Inconsistent(format!(
                "{} poll made no attempt",
                kind
            ))),
        }
    }

    /// Finalize a session whose marker reached 100. Losing the finalize race
    /// still reports completion: the winner credited the ledger.
    async fn complete(
        &self,
        session: ActivitySession,
        progress: Progress,
        batch: RollBatch,
    ) -> Result<PollResult, ActivityError> {
        match self
            .sessions
            .finalize(session.id(), MAX_POINTS, ActivityStatus::Completed)
            .await
        {
            Ok(closed) => {
                if let Err(e) = self.settle(&closed, &BTreeMap::new()).await {
                    self.reopen(&session).await;
                    return Err(e);
                }
                Ok(snapshot(&closed, &progress, batch, true))
            }
            Err(e) if e.is_lost_race() => {
                tracing::debug!(
                    character_id = %session.character_id(),
                    session_id = %session.id(),
                    "Session already finalized by another poll"
                );
                Ok(snapshot(&session, &progress, batch, true))
            }
            Err(e) => Err(ActivityError::from_store(e, session.kind())),
        }
    }

    // =========================================================================
    // Stop / cancel / events
    // =========================================================================

    /// Close the session at its current marker and credit what it holds.
    ///
    /// No new points are rolled. A failed session is acknowledged, a session
    /// at 100 completes, anything else is cancelled.
    pub async fn stop(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<FinalizedLedger, ActivityError> {
        // A lost race means the marker moved or an event was cleared. Both
        // are bounded, so this terminates.
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let session = self.active(character_id, kind).await?;
            let points = session.processed_points();
            let status = if session.is_failed() {
                ActivityStatus::Failed
            } else if points == MAX_POINTS {
                ActivityStatus::Completed
            } else {
                ActivityStatus::Cancelled
            };

            match self.sessions.finalize(session.id(), points, status).await {
                Ok(closed) => {
                    let refunded = if status == ActivityStatus::Cancelled {
                        self.unused_inputs(closed.config(), points)?
                    } else {
                        BTreeMap::new()
                    };
                    if let Err(e) = self.settle(&closed, &refunded).await {
                        self.reopen(&session).await;
                        return Err(e);
                    }
                    return Ok(FinalizedLedger {
                        kind,
                        status,
                        processed_points: points,
                        ledger: closed.ledger().clone(),
                        refunded,
                    });
                }
                Err(e) if e.is_lost_race() => {
                    tracing::debug!(
                        character_id = %character_id,
                        kind = ?kind,
                        attempt,
                        "Session moved while stopping, retrying"
                    );
                }
                Err(e) => return Err(ActivityError::from_store(e, kind)),
            }
        }
    }

    pub async fn resolve_event(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<Option<EventId>, ActivityError> {
        let session = self.active(character_id, kind).await?;
        let cleared = match self.sessions.clear_event(session.id()).await {
            Ok(cleared) => cleared,
            Err(e) if e.is_lost_race() => {
                // Finalized underneath, or pollers kept winning. Either way
                // there is no event this call cleared.
                tracing::warn!(
                    character_id = %character_id,
                    kind = ?kind,
                    error = %e,
                    "Event not cleared"
                );
                None
            }
            Err(e) => return Err(ActivityError::from_store(e, kind)),
        };
        if let Some(event) = &cleared {
            tracing::info!(
                character_id = %character_id,
                kind = ?kind,
                event = %event,
                "Activity event resolved"
            );
        }
        Ok(cleared)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn active(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<ActivitySession, ActivityError> {
        self.sessions
            .get_active(character_id, kind)
            .await
            .map_err(|e| ActivityError::from_store(e, kind))?
            .ok_or(ActivityError::NoActiveSession { kind })
    }

    /// Landmarks the character knows, counting ones found earlier in this
    /// session but not yet credited.
    async fn known_landmarks(
        &self,
        session: &ActivitySession,
    ) -> Result<BTreeSet<LandmarkId>, ActivityError> {
        let mut known = self
            .load_character(session.character_id())
            .await?
            .discovered()
            .clone();
        known.extend(session.ledger().discoveries.iter().cloned());
        Ok(known)
    }

    fn plan(
        &self,
        config: &ActivityConfig,
        known: &BTreeSet<LandmarkId>,
    ) -> Result<MilestonePlan, ActivityError> {
        let plan = match config {
            ActivityConfig::Travel { to, .. } => MilestonePlan::travel(&self.catalog, to, known)?,
            ActivityConfig::Exploration { zone, .. } => {
                MilestonePlan::exploration(&self.catalog, zone, known)?
            }
            ActivityConfig::Crafting {
                recipe, quantity, ..
            } => MilestonePlan::crafting(&self.catalog, recipe, *quantity)?,
        };
        Ok(plan)
    }

    /// Inputs of crafting units not finished by `points`.
    fn unused_inputs(
        &self,
        config: &ActivityConfig,
        points: u8,
    ) -> Result<BTreeMap<ItemId, u32>, ActivityError> {
        let ActivityConfig::Crafting {
            recipe, quantity, ..
        } = config
        else {
            return Ok(BTreeMap::new());
        };

        let plan = MilestonePlan::crafting(&self.catalog, recipe, *quantity)?;
        let done = plan
            .crafting
            .as_ref()
            .map(|output| output.units_at(points))
            .unwrap_or(0);
        let remaining = quantity.saturating_sub(done);
        if remaining == 0 {
            return Ok(BTreeMap::new());
        }

        Ok(self
            .catalog
            .recipe(recipe)?
            .inputs
            .iter()
            .map(|(item, per_unit)| (item.clone(), per_unit.saturating_mul(remaining)))
            .collect())
    }

    /// Put back a session whose settle failed so a later poll or stop can
    /// credit it.
    async fn reopen(&self, session: &ActivitySession) {
        match self.sessions.create(session).await {
            Ok(()) => tracing::warn!(
                character_id = %session.character_id(),
                session_id = %session.id(),
                "Settle failed, session reopened"
            ),
            Err(e) => tracing::error!(
                character_id = %session.character_id(),
                session_id = %session.id(),
                ledger = ?session.ledger(),
                error = %e,
                "Settle failed and the session could not be reopened"
            ),
        }
    }

    /// Credit a finalized session to its character and apply completion
    /// effects. Only the caller that won the finalize gets here.
    ///
    /// The zone move is idempotent and runs first, so a failed credit can be
    /// retried without applying anything twice.
    async fn settle(
        &self,
        closed: &ActivitySession,
        refunded: &BTreeMap<ItemId, u32>,
    ) -> Result<(), ActivityError> {
        let character_id = closed.character_id();
        let credited = closed.ledger().clone().merged(&RewardLedger {
            items: refunded.clone(),
            ..Default::default()
        });

        if closed.status() == ActivityStatus::Completed {
            if let ActivityConfig::Travel { to, .. } = closed.config() {
                self.characters.set_zone(character_id, to).await?;
            }
        }

        if !credited.is_empty() {
            self.characters.credit(character_id, &credited).await?;
        }

        tracing::info!(
            character_id = %character_id,
            session_id = %closed.id(),
            kind = ?closed.kind(),
            status = ?closed.status(),
            points = closed.processed_points(),
            gold = credited.gold,
            experience = credited.experience,
            "Activity finalized"
        );
        Ok(())
    }
}

fn snapshot(
    session: &ActivitySession,
    progress: &Progress,
    batch: RollBatch,
    completed: bool,
) -> PollResult {
    let discoveries = batch.discoveries().cloned().collect();
    let rewards = batch
        .outcomes
        .into_iter()
        .filter(|outcome| {
            matches!(
                outcome,
                MilestoneOutcome::Reward { .. } | MilestoneOutcome::Crafted { .. }
            )
        })
        .collect();

    PollResult {
        kind: session.kind(),
        progress: progress.percent,
        processed_points: session.processed_points(),
        time_spent_ms: progress.elapsed_ms,
        total_ms: progress.total_ms,
        discoveries,
        rewards,
        event: session.active_event().cloned(),
        completed,
        failed: None,
        ledger: session.ledger().clone(),
    }
}
