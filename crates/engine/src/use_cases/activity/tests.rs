use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use questline_domain::{
    ActivityConfig, ActivityKind, ActivitySession, ActivityStatus, Character, CharacterId,
    EventId, ExpeditionType, ItemId, RecipeId, RewardLedger, SessionId, TravelMode, ZoneId,
    MAX_POINTS,
};
use tokio::sync::Barrier;

use super::*;
use crate::infrastructure::catalog::builtin_catalog;
use crate::infrastructure::clock::{FixedClock, FixedRandom, ManualClock};
use crate::infrastructure::memory::{InMemoryCharacterRepo, InMemorySessionStore};
use crate::infrastructure::ports::{
    CharacterRepo, ClockPort, MockCharacterRepo, MockSessionStore, RandomPort, RepoError,
    SessionStore, StoreError,
};
use crate::infrastructure::sessions::SqliteSessionStore;

/// Every roll lands on its minimum: rewards, discoveries, events and risk
/// failures all hit.
const ALWAYS: i32 = i32::MIN;
/// Every roll lands on its maximum: nothing random ever hits.
const NEVER: i32 = i32::MAX;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn hero() -> Character {
    Character::new("Aldric", ZoneId::from("old_forest"))
        .unwrap()
        .with_item(ItemId::from("ration"), 5)
        .with_item(ItemId::from("herb"), 9)
}

/// Standard exploration of the Old Forest: 600 seconds.
fn forest_exploration() -> ActivityConfig {
    ActivityConfig::Exploration {
        zone: ZoneId::from("old_forest"),
        expedition: ExpeditionType::Standard,
        supplies: 1,
        base_seconds: 600,
    }
}

struct Harness {
    activities: ActivityUseCases,
    runner: Arc<ActivityRunner>,
    sessions: Arc<dyn SessionStore>,
    characters: Arc<InMemoryCharacterRepo>,
    clock: Arc<ManualClock>,
    hero: CharacterId,
}

async fn harness_with(sessions: Arc<dyn SessionStore>, random: i32) -> Harness {
    let characters = Arc::new(InMemoryCharacterRepo::new());
    let hero = hero();
    characters.save(&hero).await.unwrap();

    let clock = Arc::new(ManualClock::new(t0()));
    let runner = Arc::new(ActivityRunner::new(
        sessions.clone(),
        characters.clone(),
        Arc::new(builtin_catalog().unwrap()),
        clock.clone(),
        Arc::new(FixedRandom(random)),
    ));

    Harness {
        activities: ActivityUseCases::new(runner.clone()),
        runner,
        sessions,
        characters,
        clock,
        hero: hero.id(),
    }
}

async fn harness(random: i32) -> Harness {
    harness_with(Arc::new(InMemorySessionStore::new()), random).await
}

impl Harness {
    async fn begin(&self, config: ActivityConfig) -> ActivitySession {
        let session = ActivitySession::start(self.hero, config, t0()).unwrap();
        self.sessions.create(&session).await.unwrap();
        session
    }

    async fn character(&self) -> Character {
        self.characters.get(self.hero).await.unwrap().unwrap()
    }

    /// A second runner over the same stores with its own clock.
    fn runner_at(&self, now: DateTime<Utc>, sessions: Arc<dyn SessionStore>) -> ActivityRunner {
        ActivityRunner::new(
            sessions,
            self.characters.clone(),
            Arc::new(builtin_catalog().unwrap()),
            Arc::new(FixedClock(now)),
            Arc::new(FixedRandom(ALWAYS)),
        )
    }
}

// =============================================================================
// Poll
// =============================================================================

#[tokio::test]
async fn when_polled_at_47_percent_then_each_point_is_rolled_once() {
    let h = harness(ALWAYS).await;
    h.begin(forest_exploration()).await;
    h.clock.set(t0() + Duration::seconds(282));

    let first = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    assert_eq!(first.processed_points, 47);
    assert_eq!(first.time_spent_ms, 282_000);
    assert_eq!(first.rewards.len(), 47);
    // Nine discovery rolls, but the forest only hides three landmarks.
    assert_eq!(first.discoveries.len(), 3);
    assert_eq!(first.event, Some(EventId::from("wolf_pack")));
    assert!(!first.completed);
    // Tier 2: every reward is 2 gold and 10 experience.
    assert_eq!(first.ledger.gold, 94);
    assert_eq!(first.ledger.experience, 470);

    let second = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    assert_eq!(second.processed_points, 47);
    assert!(second.rewards.is_empty());
    assert!(second.discoveries.is_empty());
    assert_eq!(second.ledger, first.ledger);
}

#[tokio::test]
async fn when_polled_through_sqlite_then_marker_survives_between_polls() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("sessions.db");
    let store = SqliteSessionStore::new(path.to_str().unwrap()).await.unwrap();
    let h = harness_with(Arc::new(store), ALWAYS).await;
    h.begin(forest_exploration()).await;

    h.clock.set(t0() + Duration::seconds(282));
    let first = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    h.clock.set(t0() + Duration::seconds(288));
    let second = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();

    assert_eq!(first.rewards.len(), 47);
    assert_eq!(second.rewards.len(), 1);
    assert_eq!(second.processed_points, 48);
    assert_eq!(second.ledger.gold, 96);
}

#[tokio::test]
async fn when_no_time_passed_then_nothing_is_rolled() {
    let h = harness(ALWAYS).await;
    h.begin(forest_exploration()).await;

    let result = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    assert_eq!(result.processed_points, 0);
    assert_eq!(result.progress, 0.0);
    assert!(result.rewards.is_empty());
    assert!(result.event.is_none());
}

#[tokio::test]
async fn when_nothing_is_running_then_poll_reports_no_session() {
    let h = harness(ALWAYS).await;
    let result = h.activities.poll(h.hero, ActivityKind::Crafting).await;
    assert!(matches!(
        result,
        Err(ActivityError::NoActiveSession {
            kind: ActivityKind::Crafting
        })
    ));
}

/// Stalls the first two `get_active` calls until both have read, so two
/// pollers are guaranteed to start from the same marker.
struct OverlappingReads {
    inner: Arc<InMemorySessionStore>,
    barrier: Barrier,
    reads: AtomicUsize,
}

#[async_trait]
impl SessionStore for OverlappingReads {
    async fn create(&self, session: &ActivitySession) -> Result<(), StoreError> {
        self.inner.create(session).await
    }

    async fn get_active(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<Option<ActivitySession>, StoreError> {
        let session = self.inner.get_active(character_id, kind).await;
        if self.reads.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        session
    }

    async fn advance(
        &self,
        session_id: SessionId,
        expected_points: u8,
        new_points: u8,
        delta: &RewardLedger,
        triggered_event: Option<EventId>,
    ) -> Result<ActivitySession, StoreError> {
        self.inner
            .advance(session_id, expected_points, new_points, delta, triggered_event)
            .await
    }

    async fn clear_event(&self, session_id: SessionId) -> Result<Option<EventId>, StoreError> {
        self.inner.clear_event(session_id).await
    }

    async fn finalize(
        &self,
        session_id: SessionId,
        expected_points: u8,
        status: ActivityStatus,
    ) -> Result<ActivitySession, StoreError> {
        self.inner.finalize(session_id, expected_points, status).await
    }
}

#[tokio::test]
async fn when_two_pollers_overlap_then_ledger_matches_a_single_poller() {
    let inner = Arc::new(InMemorySessionStore::new());
    let h = harness_with(inner.clone(), ALWAYS).await;
    h.begin(forest_exploration()).await;

    let racing: Arc<dyn SessionStore> = Arc::new(OverlappingReads {
        inner: inner.clone(),
        barrier: Barrier::new(2),
        reads: AtomicUsize::new(0),
    });
    let early = h.runner_at(t0() + Duration::seconds(282), racing.clone());
    let late = h.runner_at(t0() + Duration::seconds(288), racing);

    let (a, b) = tokio::join!(
        early.poll(h.hero, ActivityKind::Exploration),
        late.poll(h.hero, ActivityKind::Exploration)
    );
    let rolled = a.unwrap().rewards.len() + b.unwrap().rewards.len();
    assert_eq!(rolled, 48);

    let raced = inner
        .get_active(h.hero, ActivityKind::Exploration)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raced.processed_points(), 48);

    let sequential = harness(ALWAYS).await;
    sequential.begin(forest_exploration()).await;
    sequential.clock.set(t0() + Duration::seconds(288));
    let expected = sequential
        .activities
        .poll(sequential.hero, ActivityKind::Exploration)
        .await
        .unwrap();

    assert_eq!(raced.ledger(), &expected.ledger);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn when_many_clients_poll_at_once_then_no_point_is_paid_twice() {
    let h = harness(ALWAYS).await;
    h.begin(forest_exploration()).await;
    h.clock.set(t0() + Duration::seconds(282));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let runner = h.runner.clone();
            let hero = h.hero;
            tokio::spawn(async move { runner.poll(hero, ActivityKind::Exploration).await })
        })
        .collect();

    let mut rolled = 0;
    for handle in handles {
        rolled += handle.await.unwrap().unwrap().rewards.len();
    }
    assert_eq!(rolled, 47);

    let session = h
        .sessions
        .get_active(h.hero, ActivityKind::Exploration)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.ledger().gold, 94);
}

#[tokio::test]
async fn when_marker_keeps_moving_then_poll_gives_up_with_a_snapshot() {
    let session = ActivitySession::start(CharacterId::new(), forest_exploration(), t0()).unwrap();
    let character = hero().with_id(session.character_id());

    let mut sessions = MockSessionStore::new();
    let stored = session.clone();
    sessions
        .expect_get_active()
        .returning(move |_, _| Ok(Some(stored.clone())));
    sessions
        .expect_advance()
        .times(MAX_STALE_RETRIES)
        .returning(|_, expected, _, _, _| {
            Err(StoreError::Stale {
                expected,
                actual: expected + 5,
            })
        });

    let mut characters = MockCharacterRepo::new();
    characters
        .expect_get()
        .returning(move |_| Ok(Some(character.clone())));

    let runner = ActivityRunner::new(
        Arc::new(sessions),
        Arc::new(characters),
        Arc::new(builtin_catalog().unwrap()),
        Arc::new(FixedClock(t0() + Duration::seconds(60))),
        Arc::new(FixedRandom(ALWAYS)),
    );

    let result = runner
        .poll(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap();
    assert_eq!(result.processed_points, 0);
    assert!(result.rewards.is_empty());
    assert!(!result.completed);
}

// =============================================================================
// Travel
// =============================================================================

#[tokio::test]
async fn when_travel_completes_then_character_arrives_once() {
    let h = harness(NEVER).await;
    let session = h
        .activities
        .travel
        .start(
            h.hero,
            TravelRequest {
                destination: ZoneId::from("village"),
                mode: TravelMode::Walk,
            },
        )
        .await
        .unwrap();
    // Distance 10 at walking speed 2 per minute.
    assert_eq!(session.duration_ms(), 300_000);

    h.clock.advance(Duration::seconds(150));
    let halfway = h.activities.poll(h.hero, ActivityKind::Travel).await.unwrap();
    assert_eq!(halfway.processed_points, 50);
    assert_eq!(h.character().await.zone(), &ZoneId::from("old_forest"));

    h.clock.advance(Duration::seconds(200));
    let arrived = h.activities.poll(h.hero, ActivityKind::Travel).await.unwrap();
    assert!(arrived.completed);
    assert_eq!(arrived.progress, 100.0);
    assert_eq!(h.character().await.zone(), &ZoneId::from("village"));

    let after = h.activities.poll(h.hero, ActivityKind::Travel).await;
    assert!(matches!(after, Err(ActivityError::NoActiveSession { .. })));
}

#[tokio::test]
async fn when_already_travelling_then_second_start_conflicts() {
    let h = harness(NEVER).await;
    let request = TravelRequest {
        destination: ZoneId::from("iron_hills"),
        mode: TravelMode::Ride,
    };

    h.activities.travel.start(h.hero, request.clone()).await.unwrap();
    let second = h.activities.travel.start(h.hero, request).await;

    assert!(matches!(
        second,
        Err(ActivityError::Conflict {
            kind: ActivityKind::Travel
        })
    ));
}

#[tokio::test]
async fn when_destination_is_current_zone_then_travel_is_rejected() {
    let h = harness(NEVER).await;
    let result = h
        .activities
        .travel
        .start(
            h.hero,
            TravelRequest {
                destination: ZoneId::from("old_forest"),
                mode: TravelMode::Walk,
            },
        )
        .await;
    assert!(matches!(result, Err(ActivityError::Validation(_))));

    let unknown = h
        .activities
        .travel
        .start(
            h.hero,
            TravelRequest {
                destination: ZoneId::from("atlantis"),
                mode: TravelMode::Walk,
            },
        )
        .await;
    assert!(matches!(unknown, Err(ActivityError::Validation(_))));
}

#[tokio::test]
async fn when_character_is_missing_then_start_reports_it() {
    let mut characters = MockCharacterRepo::new();
    characters.expect_get().returning(|_| Ok(None));

    let runner = Arc::new(ActivityRunner::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(characters),
        Arc::new(builtin_catalog().unwrap()),
        Arc::new(FixedClock(t0())),
        Arc::new(FixedRandom(NEVER)),
    ));
    let activities = ActivityUseCases::new(runner);
    let ghost = CharacterId::new();

    let result = activities
        .travel
        .start(
            ghost,
            TravelRequest {
                destination: ZoneId::from("village"),
                mode: TravelMode::Walk,
            },
        )
        .await;
    assert!(matches!(result, Err(ActivityError::CharacterNotFound(id)) if id == ghost));
}

// =============================================================================
// Exploration
// =============================================================================

#[tokio::test]
async fn when_risk_roll_fails_then_session_reports_failure_until_acknowledged() {
    let h = harness(ALWAYS).await;
    let session = h
        .activities
        .exploration
        .start(
            h.hero,
            ExplorationRequest {
                zone: ZoneId::from("old_forest"),
                expedition: ExpeditionType::Standard,
                supplies: 1,
            },
        )
        .await
        .unwrap();
    assert!(session.is_failed());
    assert_eq!(h.character().await.item_count(&ItemId::from("ration")), 4);

    h.clock.advance(Duration::seconds(300));
    let polled = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    let failure = polled.failed.expect("failure info");
    assert!(failure.reason.contains("Old Forest"));
    assert!(!polled.completed);
    assert!(polled.rewards.is_empty());

    let acknowledged = h.activities.stop(h.hero, ActivityKind::Exploration).await.unwrap();
    assert_eq!(acknowledged.status, ActivityStatus::Failed);
    // A quarter of one tier 2 reward.
    assert_eq!(acknowledged.ledger.experience, 5);
    assert_eq!(h.character().await.experience(), 5);

    let gone = h.activities.poll(h.hero, ActivityKind::Exploration).await;
    assert!(matches!(gone, Err(ActivityError::NoActiveSession { .. })));
}

#[tokio::test]
async fn when_risk_is_previewed_then_nothing_is_committed() {
    let h = harness(ALWAYS).await;
    let risk = h
        .activities
        .exploration
        .preview_risk(h.hero, &ZoneId::from("iron_hills"), ExpeditionType::Deep)
        .await
        .unwrap();
    // Danger 18 at level 1: 34% base, half again for a deep expedition.
    assert_eq!(risk.failure_probability, 51.0);

    let live = h
        .sessions
        .get_active(h.hero, ActivityKind::Exploration)
        .await
        .unwrap();
    assert!(live.is_none());
}

#[tokio::test]
async fn when_exploration_request_is_invalid_then_nothing_is_consumed() {
    let h = harness(NEVER).await;
    let explore = |zone: &str, expedition, supplies| ExplorationRequest {
        zone: ZoneId::from(zone),
        expedition,
        supplies,
    };

    let elsewhere = h
        .activities
        .exploration
        .start(h.hero, explore("iron_hills", ExpeditionType::Scout, 0))
        .await;
    assert!(matches!(elsewhere, Err(ActivityError::Validation(_))));

    let underpacked = h
        .activities
        .exploration
        .start(h.hero, explore("old_forest", ExpeditionType::Deep, 1))
        .await;
    assert!(matches!(underpacked, Err(ActivityError::Validation(_))));

    let overpacked = h
        .activities
        .exploration
        .start(h.hero, explore("old_forest", ExpeditionType::Standard, 6))
        .await;
    assert!(matches!(overpacked, Err(ActivityError::Validation(_))));

    assert_eq!(h.character().await.item_count(&ItemId::from("ration")), 5);
    let live = h
        .sessions
        .get_active(h.hero, ActivityKind::Exploration)
        .await
        .unwrap();
    assert!(live.is_none());
}

#[tokio::test]
async fn when_exploration_completes_then_discoveries_are_recorded() {
    let h = harness(ALWAYS).await;
    h.begin(forest_exploration()).await;
    h.clock.set(t0() + Duration::seconds(600));

    let done = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    assert!(done.completed);
    assert_eq!(done.rewards.len(), 100);

    let character = h.character().await;
    assert_eq!(character.gold(), 200);
    assert_eq!(character.discovered().len(), 3);
}

#[tokio::test]
async fn when_event_is_resolved_then_it_is_cleared() {
    let h = harness(ALWAYS).await;
    h.begin(forest_exploration()).await;
    h.clock.set(t0() + Duration::seconds(60));

    let polled = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    assert_eq!(polled.event, Some(EventId::from("wolf_pack")));

    let cleared = h
        .activities
        .resolve_event(h.hero, ActivityKind::Exploration)
        .await
        .unwrap();
    assert_eq!(cleared, Some(EventId::from("wolf_pack")));

    let again = h.activities.poll(h.hero, ActivityKind::Exploration).await.unwrap();
    assert!(again.event.is_none());
}

// =============================================================================
// Crafting
// =============================================================================

fn salves(quantity: u32) -> CraftingRequest {
    CraftingRequest {
        recipe: RecipeId::from("healing_salve"),
        quantity,
    }
}

#[tokio::test]
async fn when_crafting_is_stopped_early_then_unused_inputs_come_back() {
    let h = harness(NEVER).await;
    let session = h.activities.crafting.start(h.hero, salves(3)).await.unwrap();
    assert_eq!(session.duration_ms(), 90_000);
    assert_eq!(h.character().await.item_count(&ItemId::from("herb")), 0);

    h.clock.advance(Duration::seconds(45));
    let halfway = h.activities.poll(h.hero, ActivityKind::Crafting).await.unwrap();
    assert_eq!(halfway.processed_points, 50);

    let stopped = h.activities.stop(h.hero, ActivityKind::Crafting).await.unwrap();
    assert_eq!(stopped.status, ActivityStatus::Cancelled);
    // One of three units done by 50%: two units' worth of herbs return.
    assert_eq!(
        stopped.refunded,
        BTreeMap::from([(ItemId::from("herb"), 6)])
    );

    let character = h.character().await;
    assert_eq!(character.item_count(&ItemId::from("herb")), 6);
    assert_eq!(character.item_count(&ItemId::from("healing_salve")), 2);
    assert_eq!(character.experience(), 8);
}

#[tokio::test]
async fn when_crafting_is_cancelled_before_any_progress_then_everything_is_refunded() {
    let h = harness(NEVER).await;
    h.activities.crafting.start(h.hero, salves(2)).await.unwrap();
    assert_eq!(h.character().await.item_count(&ItemId::from("herb")), 3);

    h.activities.cancel(h.hero, ActivityKind::Crafting).await.unwrap();
    assert_eq!(h.character().await.item_count(&ItemId::from("herb")), 9);
}

#[tokio::test]
async fn when_crafting_request_is_invalid_then_it_is_rejected() {
    let h = harness(NEVER).await;

    for quantity in [0, MAX_CRAFT_QUANTITY + 1] {
        let result = h.activities.crafting.start(h.hero, salves(quantity)).await;
        assert!(matches!(result, Err(ActivityError::Validation(_))));
    }

    let short = h.activities.crafting.start(h.hero, salves(4)).await;
    assert!(matches!(short, Err(ActivityError::Validation(_))));
    assert_eq!(h.character().await.item_count(&ItemId::from("herb")), 9);

    let unknown = h
        .activities
        .crafting
        .start(
            h.hero,
            CraftingRequest {
                recipe: RecipeId::from("philosophers_stone"),
                quantity: 1,
            },
        )
        .await;
    assert!(matches!(unknown, Err(ActivityError::Validation(_))));
}

#[tokio::test]
async fn when_kinds_differ_then_sessions_run_side_by_side() {
    let h = harness(NEVER).await;
    h.activities.crafting.start(h.hero, salves(1)).await.unwrap();
    h.activities
        .travel
        .start(
            h.hero,
            TravelRequest {
                destination: ZoneId::from("village"),
                mode: TravelMode::Ride,
            },
        )
        .await
        .unwrap();

    h.clock.advance(Duration::seconds(30));
    let crafted = h.activities.poll(h.hero, ActivityKind::Crafting).await.unwrap();
    let travelling = h.activities.poll(h.hero, ActivityKind::Travel).await.unwrap();

    assert!(crafted.completed);
    assert!(!travelling.completed);
    assert_eq!(h.character().await.item_count(&ItemId::from("healing_salve")), 2);
}

#[test]
fn random_port_is_object_safe() {
    let random: Arc<dyn RandomPort> = Arc::new(FixedRandom(4));
    let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(t0()));
    assert_eq!(random.gen_range(1, 10), 4);
    assert_eq!(clock.now(), t0());
}

// =============================================================================
// Settle failures and contention
// =============================================================================

#[tokio::test]
async fn when_credit_fails_then_session_is_kept_for_a_retry() {
    let character = hero();
    let sessions = Arc::new(InMemorySessionStore::new());
    let session = ActivitySession::start(character.id(), forest_exploration(), t0()).unwrap();
    sessions.create(&session).await.unwrap();
    let earned = RewardLedger {
        gold: 100,
        ..Default::default()
    };
    sessions
        .advance(session.id(), 0, 50, &earned, None)
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let credited = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut characters = MockCharacterRepo::new();
    {
        let calls = calls.clone();
        let credited = credited.clone();
        characters.expect_credit().returning(move |_, ledger| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RepoError::database("credit", "disk full"));
            }
            credited.lock().unwrap().push(ledger.gold);
            Ok(character.clone())
        });
    }

    let runner = ActivityRunner::new(
        sessions.clone(),
        Arc::new(characters),
        Arc::new(builtin_catalog().unwrap()),
        Arc::new(FixedClock(t0() + Duration::seconds(300))),
        Arc::new(FixedRandom(ALWAYS)),
    );

    let err = runner
        .stop(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap_err();
    assert!(matches!(err, ActivityError::Repo(_)));

    let kept = sessions
        .get_active(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap()
        .expect("session is still active");
    assert_eq!(kept.processed_points(), 50);
    assert_eq!(kept.ledger().gold, 100);

    let stopped = runner
        .stop(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap();
    assert_eq!(stopped.status, ActivityStatus::Cancelled);
    assert_eq!(stopped.ledger.gold, 100);
    assert_eq!(*credited.lock().unwrap(), vec![100]);
    assert!(sessions
        .get_active(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn when_credit_fails_at_completion_then_the_next_poll_completes() {
    let character = hero();
    let sessions = Arc::new(InMemorySessionStore::new());
    let session = ActivitySession::start(character.id(), forest_exploration(), t0()).unwrap();
    sessions.create(&session).await.unwrap();
    let earned = RewardLedger {
        gold: 100,
        ..Default::default()
    };
    sessions
        .advance(session.id(), 0, MAX_POINTS, &earned, None)
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut characters = MockCharacterRepo::new();
    {
        let calls = calls.clone();
        characters.expect_credit().returning(move |_, _| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RepoError::database("credit", "disk full"))
            } else {
                Ok(character.clone())
            }
        });
    }

    let runner = ActivityRunner::new(
        sessions.clone(),
        Arc::new(characters),
        Arc::new(builtin_catalog().unwrap()),
        Arc::new(FixedClock(t0() + Duration::seconds(600))),
        Arc::new(FixedRandom(ALWAYS)),
    );

    let failed = runner
        .poll(session.character_id(), ActivityKind::Exploration)
        .await;
    assert!(matches!(failed, Err(ActivityError::Repo(_))));

    let done = runner
        .poll(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap();
    assert!(done.completed);
    assert_eq!(done.ledger.gold, 100);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn when_event_clear_keeps_losing_then_nothing_is_reported_cleared() {
    let session = ActivitySession::start(CharacterId::new(), forest_exploration(), t0()).unwrap();

    let mut sessions = MockSessionStore::new();
    let stored = session.clone();
    sessions
        .expect_get_active()
        .returning(move |_, _| Ok(Some(stored.clone())));
    sessions.expect_clear_event().returning(|_| {
        Err(StoreError::Stale {
            expected: 40,
            actual: 40,
        })
    });

    let runner = ActivityRunner::new(
        Arc::new(sessions),
        Arc::new(MockCharacterRepo::new()),
        Arc::new(builtin_catalog().unwrap()),
        Arc::new(FixedClock(t0())),
        Arc::new(FixedRandom(ALWAYS)),
    );

    let cleared = runner
        .resolve_event(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap();
    assert_eq!(cleared, None);
}

#[tokio::test]
async fn when_stop_keeps_losing_races_then_it_still_closes_the_session() {
    let session = ActivitySession::start(CharacterId::new(), forest_exploration(), t0()).unwrap();
    let losses = MAX_STALE_RETRIES + 3;

    let mut sessions = MockSessionStore::new();
    let stored = session.clone();
    sessions
        .expect_get_active()
        .returning(move |_, _| Ok(Some(stored.clone())));
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        let stored = session.clone();
        sessions
            .expect_finalize()
            .returning(move |_, expected, status| {
                if calls.fetch_add(1, Ordering::SeqCst) < losses {
                    return Err(StoreError::Stale {
                        expected,
                        actual: expected + 1,
                    });
                }
                let mut closed = stored.clone();
                closed.close(status)?;
                Ok(closed)
            });
    }

    let runner = ActivityRunner::new(
        Arc::new(sessions),
        Arc::new(MockCharacterRepo::new()),
        Arc::new(builtin_catalog().unwrap()),
        Arc::new(FixedClock(t0())),
        Arc::new(FixedRandom(ALWAYS)),
    );

    let stopped = runner
        .stop(session.character_id(), ActivityKind::Exploration)
        .await
        .unwrap();
    assert_eq!(stopped.status, ActivityStatus::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), losses + 1);
}
