//! Application state and composition.

use std::sync::Arc;

use questline_domain::{Catalog, DefeatPenalty};

use crate::infrastructure::{
    characters::SqliteCharacterRepo,
    combats::SqliteCombatStore,
    database,
    memory::{InMemoryCharacterRepo, InMemoryCombatStore, InMemorySessionStore},
    ports::{CharacterRepo, ClockPort, CombatStore, RandomPort, RepoError, SessionStore},
    sessions::SqliteSessionStore,
    settings::DEFAULT_MAX_AUTO_TURNS,
};
use crate::use_cases;

/// Main application state.
///
/// Holds all repositories and use cases.
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub repositories: Repositories,
    pub use_cases: UseCases,
    pub catalog: Arc<Catalog>,
}

/// Container for all repositories, injected as port traits.
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionStore>,
    pub combats: Arc<dyn CombatStore>,
    pub characters: Arc<dyn CharacterRepo>,
}

impl Repositories {
    /// Everything in process memory. Nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            combats: Arc::new(InMemoryCombatStore::new()),
            characters: Arc::new(InMemoryCharacterRepo::new()),
        }
    }

    /// Sessions, characters and fights in one SQLite database.
    pub async fn sqlite(db_path: &str) -> Result<Self, RepoError> {
        let pool = database::connect(db_path).await?;
        Ok(Self {
            sessions: Arc::new(SqliteSessionStore::with_pool(pool.clone()).await?),
            combats: Arc::new(SqliteCombatStore::with_pool(pool.clone()).await?),
            characters: Arc::new(SqliteCharacterRepo::with_pool(pool).await?),
        })
    }
}

/// Container for all use cases.
pub struct UseCases {
    pub activities: use_cases::ActivityUseCases,
    pub combat: use_cases::CombatController,
    pub characters: use_cases::CharacterOps,
}

/// Rules that vary per deployment.
#[derive(Debug, Clone, Copy)]
pub struct GameRules {
    pub defeat_penalty: DefeatPenalty,
    pub max_auto_turns: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            defeat_penalty: DefeatPenalty::default(),
            max_auto_turns: DEFAULT_MAX_AUTO_TURNS,
        }
    }
}

impl App {
    pub fn new(
        repositories: Repositories,
        catalog: Catalog,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        rules: GameRules,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let Repositories {
            sessions,
            combats,
            characters,
        } = repositories;

        let runner = Arc::new(use_cases::ActivityRunner::new(
            sessions.clone(),
            characters.clone(),
            catalog.clone(),
            clock,
            random.clone(),
        ));

        let use_cases = UseCases {
            activities: use_cases::ActivityUseCases::new(runner),
            combat: use_cases::CombatController::new(
                combats.clone(),
                characters.clone(),
                catalog.clone(),
                random,
                rules.defeat_penalty,
                rules.max_auto_turns,
            ),
            characters: use_cases::CharacterOps::new(characters.clone(), catalog.clone()),
        };

        Self {
            repositories: Repositories {
                sessions,
                combats,
                characters,
            },
            use_cases,
            catalog,
        }
    }
}
