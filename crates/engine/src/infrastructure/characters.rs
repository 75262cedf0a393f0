//! SQLite-backed character storage.
//!
//! Characters are stored as JSON next to a `revision` column. Every mutation
//! reads the row, applies the change to the aggregate and writes it back only
//! if the revision is unchanged, retrying when another writer got in first.

use std::collections::BTreeMap;

use async_trait::async_trait;
use questline_domain::{Character, CharacterId, DefeatPenalty, ItemId, RewardLedger, ZoneId};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::database;
use crate::infrastructure::ports::{CharacterRepo, RepoError};

/// Read-modify-write attempts before a busy character gives up.
const UPDATE_ATTEMPTS: usize = 16;

pub struct SqliteCharacterRepo {
    pool: SqlitePool,
}

impl SqliteCharacterRepo {
    pub async fn new(db_path: &str) -> Result<Self, RepoError> {
        Self::with_pool(database::connect(db_path).await?).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                revision INTEGER NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("characters", e))?;

        Ok(Self { pool })
    }

    async fn load(&self, id: CharacterId) -> Result<Option<(Character, i64)>, RepoError> {
        let row = sqlx::query("SELECT data, revision FROM characters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("load_character", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("data");
                let character = serde_json::from_str(&json).map_err(RepoError::serialization)?;
                Ok(Some((character, row.get("revision"))))
            }
            None => Ok(None),
        }
    }

    /// Apply `change` to the stored character under optimistic locking.
    async fn update<T>(
        &self,
        id: CharacterId,
        change: impl Fn(&mut Character) -> Result<T, RepoError> + Send,
    ) -> Result<(T, Character), RepoError> {
        for _ in 0..UPDATE_ATTEMPTS {
            let (mut character, revision) = self
                .load(id)
                .await?
                .ok_or_else(|| RepoError::not_found("Character", id))?;
            let value = change(&mut character)?;
            let data = serde_json::to_string(&character).map_err(RepoError::serialization)?;

            let result = sqlx::query(
                "UPDATE characters SET data = ?, revision = revision + 1 WHERE id = ? AND revision = ?",
            )
            .bind(data)
            .bind(id.to_string())
            .bind(revision)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("update_character", e))?;

            if result.rows_affected() == 1 {
                return Ok((value, character));
            }
            tracing::debug!(character_id = %id, "Character changed underneath, retrying");
        }

        Err(RepoError::database(
            "update_character",
            format!("character {} kept changing", id),
        ))
    }
}

#[async_trait]
impl CharacterRepo for SqliteCharacterRepo {
    async fn get(&self, id: CharacterId) -> Result<Option<Character>, RepoError> {
        Ok(self.load(id).await?.map(|(character, _)| character))
    }

    async fn save(&self, character: &Character) -> Result<(), RepoError> {
        let data = serde_json::to_string(character).map_err(RepoError::serialization)?;
        sqlx::query(
            r#"
            INSERT INTO characters (id, revision, data) VALUES (?, 0, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, revision = revision + 1
            "#,
        )
        .bind(character.id().to_string())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_character", e))?;
        Ok(())
    }

    async fn credit(&self, id: CharacterId, ledger: &RewardLedger) -> Result<Character, RepoError> {
        self.update(id, |character| {
            character.credit(ledger);
            Ok(())
        })
        .await
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
        .await
        .map(|(_, character)| character)
    }

    async fn set_zone(&self, id: CharacterId, zone: &ZoneId) -> Result<Character, RepoError> {
        self.update(id, |character| {
            character.move_to(zone.clone());
            Ok(())
        })
        .await
        .map(|(_, character)| character)
    }

    async fn apply_defeat(
        &self,
        id: CharacterId,
        penalty: DefeatPenalty,
    ) -> Result<u64, RepoError> {
        self.update(id, |character| Ok(character.apply_defeat(penalty)))
            .await
            .map(|(lost, _)| lost)
    }
}
