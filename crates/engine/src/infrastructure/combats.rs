//! SQLite-backed storage for in-progress fights.

use async_trait::async_trait;
use questline_domain::{CharacterId, CombatId, CombatInstance};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::database::{self, is_unique_violation};
use crate::infrastructure::ports::{CombatStore, RepoError, StoreError};

pub struct SqliteCombatStore {
    pool: SqlitePool,
}

impl SqliteCombatStore {
    pub async fn new(db_path: &str) -> Result<Self, RepoError> {
        Self::with_pool(database::connect(db_path).await?).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS combats (
                character_id TEXT PRIMARY KEY,
                combat_id TEXT NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("combats", e))?;

        Ok(Self { pool })
    }
}

fn encode(combat: &CombatInstance) -> Result<String, StoreError> {
    serde_json::to_string(combat).map_err(|e| RepoError::serialization(e).into())
}

fn decode(json: &str) -> Result<CombatInstance, StoreError> {
    serde_json::from_str(json).map_err(|e| RepoError::serialization(e).into())
}

#[async_trait]
impl CombatStore for SqliteCombatStore {
    async fn create(&self, combat: &CombatInstance) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO combats (character_id, combat_id, data) VALUES (?, ?, ?)")
            .bind(combat.character_id().to_string())
            .bind(combat.id().to_string())
            .bind(encode(combat)?)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                what: "combat",
                character_id: combat.character_id(),
            }),
            Err(e) => Err(RepoError::database("create_combat", e).into()),
        }
    }

    async fn get(&self, character_id: CharacterId) -> Result<Option<CombatInstance>, StoreError> {
        let row = sqlx::query("SELECT data FROM combats WHERE character_id = ?")
            .bind(character_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_combat", e))?;

        row.map(|row| decode(&row.get::<String, _>("data"))).transpose()
    }

    async fn save(&self, combat: &CombatInstance) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE combats SET data = ? WHERE character_id = ? AND combat_id = ?")
            .bind(encode(combat)?)
            .bind(combat.character_id().to_string())
            .bind(combat.id().to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("save_combat", e))?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("combat {}", combat.id())))
        }
    }

    async fn remove(
        &self,
        character_id: CharacterId,
        combat_id: CombatId,
    ) -> Result<Option<CombatInstance>, StoreError> {
        let row = sqlx::query(
            "DELETE FROM combats WHERE character_id = ? AND combat_id = ? RETURNING data",
        )
        .bind(character_id.to_string())
        .bind(combat_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("remove_combat", e))?;

        row.map(|row| decode(&row.get::<String, _>("data"))).transpose()
    }
}
