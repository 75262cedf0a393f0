//! SQLite connection shared by the durable stores.
//!
//! Sessions, characters and fights live in one database file, so a restart
//! finds every character a stored session points at.

use sqlx::SqlitePool;

use crate::infrastructure::ports::RepoError;

/// Open the database at `db_path`, creating the file if needed.
pub async fn connect(db_path: &str) -> Result<SqlitePool, RepoError> {
    let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await
        .map_err(|e| RepoError::database("connect", e))?;
    tracing::debug!(path = %db_path, "Connected to SQLite");
    Ok(pool)
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
