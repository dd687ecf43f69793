//! Database gateway for users and their last played score
//!
//! Each call opens its own short-lived connection, runs exactly one statement
//! and drops the connection again. Nothing is pooled or cached: the database
//! is shared with other clients and is always read fresh.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Upper bound on the stored title, in characters.
pub const MAX_LAST_PLAYED_LEN: usize = 512;

// ============================================================
// ERROR TYPES
// ============================================================

#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::QueryFailed(err.to_string())
    }
}

// ============================================================
// DATA TYPES
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created: i64,         // Unix timestamp ms
    pub deleted: Option<i64>, // Unix timestamp ms
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLastPlayed {
    pub id: i64,
    pub last_played: String,
}

// ============================================================
// GATEWAY
// ============================================================

#[derive(Debug, Clone)]
pub struct Gateway {
    db_path: PathBuf,
}

impl Gateway {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.db_path
    }

    fn open_read(&self) -> Result<Connection, DbError> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))
    }

    fn open_write(&self) -> Result<Connection, DbError> {
        Connection::open(&self.db_path).map_err(|e| DbError::ConnectionFailed(e.to_string()))
    }

    /// Create the tables when the database is new
    pub fn ensure_schema(&self) -> Result<(), DbError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbError::ConnectionFailed(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = self.open_write()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                created INTEGER NOT NULL,
                deleted INTEGER
            );

            CREATE TABLE IF NOT EXISTS user_last_played (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                last_played TEXT NOT NULL,
                played_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_last_played_user
                ON user_last_played(user_id, seq DESC);
        ",
        )
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    /// All users, in whatever order the database returns them
    pub fn get_users(&self) -> Result<Vec<User>, DbError> {
        let conn = self.open_read()?;
        let mut stmt = conn.prepare("SELECT id, name, created, deleted FROM users")?;

        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created: row.get(2)?,
                    deleted: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }

    /// Most recent last-played entry for a user, if any
    pub fn get_user_last_played(&self, user_id: i64) -> Result<Option<UserLastPlayed>, DbError> {
        let conn = self.open_read()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, last_played FROM user_last_played
             WHERE user_id = ?1 ORDER BY seq DESC LIMIT 1",
        )?;

        let entry = stmt
            .query_row(params![user_id], |row| {
                Ok(UserLastPlayed {
                    id: row.get(0)?,
                    last_played: row.get(1)?,
                })
            })
            .optional()?;

        Ok(entry)
    }

    /// Record a new last-played title for a user
    pub fn save_user_last_played(&self, user_id: i64, last_played: &str) -> Result<(), DbError> {
        validate_last_played(last_played)?;

        let conn = self.open_write()?;
        conn.execute(
            "INSERT INTO user_last_played (user_id, last_played, played_at) VALUES (?1, ?2, ?3)",
            params![user_id, last_played, current_timestamp_ms()],
        )?;

        debug!(user_id, "Saved last played");
        Ok(())
    }
}

/// Reject titles the database would not accept.
pub fn validate_last_played(last_played: &str) -> Result<(), DbError> {
    if last_played.chars().count() > MAX_LAST_PLAYED_LEN {
        return Err(DbError::InvalidInput(format!(
            "Last played title exceeds {} characters",
            MAX_LAST_PLAYED_LEN
        )));
    }
    Ok(())
}

/// Helper to get current timestamp in milliseconds
fn current_timestamp_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ============================================================
// TESTS
// ============================================================
