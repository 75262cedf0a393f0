//! SQLite-backed activity session storage.
//!
//! Each row stores the whole session as JSON next to the columns the store
//! needs to query or guard on. Writes are optimistic: every update carries
//! the `revision` it read and succeeds only if the row still has it, so two
//! pollers racing on one session get exactly one winner.

use async_trait::async_trait;
use questline_domain::{
    ActivityKind, ActivitySession, ActivityStatus, CharacterId, EventId, RewardLedger, SessionId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::infrastructure::database::{self, is_unique_violation};
use crate::infrastructure::ports::{RepoError, SessionStore, StoreError};

/// Attempts at an event clear before giving up to a busier writer.
const CLEAR_EVENT_ATTEMPTS: usize = 8;

/// SQLite implementation of the session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub async fn new(db_path: &str) -> Result<Self, RepoError> {
        Self::with_pool(database::connect(db_path).await?).await
    }

    /// Use an existing pool, creating the table if it is missing.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activity_sessions (
                id TEXT PRIMARY KEY,
                character_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                processed_points INTEGER NOT NULL,
                revision INTEGER NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (character_id, kind)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("sessions", e))?;

        Ok(Self { pool })
    }

    /// Load a session together with the revision it was read at.
    async fn load(&self, session_id: SessionId) -> Result<(ActivitySession, i64), StoreError> {
        let row = sqlx::query("SELECT data, revision FROM activity_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("load_session", e))?
            .ok_or_else(|| StoreError::NotFound(format!("activity session {}", session_id)))?;

        let session = decode(&row)?;
        let revision: i64 = row.get("revision");
        Ok((session, revision))
    }

    /// Write back a modified session iff nobody wrote since `revision`.
    async fn store_if_unchanged(
        &self,
        session: &ActivitySession,
        revision: i64,
    ) -> Result<bool, StoreError> {
        let data = encode(session)?;
        let result = sqlx::query(
            r#"
            UPDATE activity_sessions
            SET data = ?, processed_points = ?, revision = revision + 1
            WHERE id = ? AND revision = ?
            "#,
        )
        .bind(data)
        .bind(i64::from(session.processed_points()))
        .bind(session.id().to_string())
        .bind(revision)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("update_session", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Marker after a lost write, for the `Stale` report.
    async fn current_points(&self, session_id: SessionId, expected: u8) -> Result<u8, StoreError> {
        let row = sqlx::query("SELECT processed_points FROM activity_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("load_marker", e))?;
        match row {
            Some(row) => {
                let points: i64 = row.get("processed_points");
                Ok(u8::try_from(points).unwrap_or(expected))
            }
            None => Err(StoreError::NotFound(format!(
                "activity session {}",
                session_id
            ))),
        }
    }

    async fn stale(&self, session_id: SessionId, expected: u8) -> StoreError {
        match self.current_points(session_id, expected).await {
            Ok(actual) => StoreError::Stale { expected, actual },
            Err(e) => e,
        }
    }
}

fn encode(session: &ActivitySession) -> Result<String, StoreError> {
    serde_json::to_string(session).map_err(|e| RepoError::serialization(e).into())
}

fn decode(row: &SqliteRow) -> Result<ActivitySession, StoreError> {
    let json: String = row.get("data");
    serde_json::from_str(&json).map_err(|e| RepoError::serialization(e).into())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, session: &ActivitySession) -> Result<(), StoreError> {
        let data = encode(session)?;
        let result = sqlx::query(
            r#"
            INSERT INTO activity_sessions (id, character_id, kind, processed_points, revision, data)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.character_id().to_string())
        .bind(session.kind().as_str())
        .bind(i64::from(session.processed_points()))
        .bind(data)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                what: "activity session",
                character_id: session.character_id(),
            }),
            Err(e) => Err(RepoError::database("create_session", e).into()),
        }
    }

    async fn get_active(
        &self,
        character_id: CharacterId,
        kind: ActivityKind,
    ) -> Result<Option<ActivitySession>, StoreError> {
        let row =
            sqlx::query("SELECT data FROM activity_sessions WHERE character_id = ? AND kind = ?")
                .bind(character_id.to_string())
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::database("get_active_session", e))?;

        row.map(|row| decode(&row)).transpose()
    }

    async fn advance(
        &self,
        session_id: SessionId,
        expected_points: u8,
        new_points: u8,
        delta: &RewardLedger,
        triggered_event: Option<EventId>,
    ) -> Result<ActivitySession, StoreError> {
        let (mut session, revision) = self.load(session_id).await?;
        if session.processed_points() != expected_points {
            return Err(StoreError::Stale {
                expected: expected_points,
                actual: session.processed_points(),
            });
        }

        session.advance(expected_points, new_points, delta, triggered_event)?;

        if self.store_if_unchanged(&session, revision).await? {
            Ok(session)
        } else {
            Err(self.stale(session_id, expected_points).await)
        }
    }

    async fn clear_event(&self, session_id: SessionId) -> Result<Option<EventId>, StoreError> {
        for _ in 0..CLEAR_EVENT_ATTEMPTS {
            let (mut session, revision) = self.load(session_id).await?;
            let cleared = session.clear_event();
            if cleared.is_none() {
                return Ok(None);
            }
            if self.store_if_unchanged(&session, revision).await? {
                return Ok(cleared);
            }
            tracing::debug!(session_id = %session_id, "Event clear raced a writer, retrying");
        }
        let points = self.current_points(session_id, 0).await?;
        Err(StoreError::Stale {
            expected: points,
            actual: points,
        })
    }

    async fn finalize(
        &self,
        session_id: SessionId,
        expected_points: u8,
        status: ActivityStatus,
    ) -> Result<ActivitySession, StoreError> {
        let (mut session, revision) = self.load(session_id).await?;
        if session.processed_points() != expected_points {
            return Err(StoreError::Stale {
                expected: expected_points,
                actual: session.processed_points(),
            });
        }

        session.close(status)?;

        let result = sqlx::query("DELETE FROM activity_sessions WHERE id = ? AND revision = ?")
            .bind(session_id.to_string())
            .bind(revision)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("finalize_session", e))?;

        if result.rows_affected() == 1 {
            Ok(session)
        } else {
            Err(self.stale(session_id, expected_points).await)
        }
    }
}
