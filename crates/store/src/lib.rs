//! SQLite persistence for voxtask.
//!
//! One database file, three gateways:
//! - [`TaskStore`] — typed CRUD and search over tasks
//! - [`HistoryStore`] — the append-only conversation log
//! - [`CostLog`] — per-invocation API cost records
//!
//! The pool runs in WAL mode; every mutation is a single transaction, which
//! is the ACID granularity the system needs. Pass `"sqlite::memory:"` for an
//! ephemeral database in tests.

pub mod costs;
pub mod history;
pub mod tasks;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

use voxtask_core::StoreError;

pub use costs::{CostEntry, CostLog, CostRecord};
pub use history::HistoryStore;
pub use tasks::{BulkOutcome, TaskStore};

/// Handle to the opened database. Cheap to clone; gateways share the pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) and migrate the database at `path`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let db = Self { pool };
        db.run_migrations().await?;
        info!("SQLite database initialized at {path}");
        Ok(db)
    }

    /// Ephemeral in-process database (tests).
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub fn tasks(&self) -> TaskStore {
        TaskStore::new(self.pool.clone())
    }

    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.pool.clone())
    }

    pub fn costs(&self) -> CostLog {
        CostLog::new(self.pool.clone())
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                title          TEXT NOT NULL,
                description    TEXT,
                notes          TEXT,
                priority       TEXT NOT NULL DEFAULT 'medium',
                status         TEXT NOT NULL DEFAULT 'todo',
                scheduled_date TEXT NOT NULL,
                deadline       TEXT,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL,
                completed_at   TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tasks table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_scheduled ON tasks(scheduled_date)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tasks index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                role         TEXT NOT NULL,
                content      TEXT NOT NULL,
                tool_calls   TEXT,
                tool_results TEXT,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_costs (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                user_query       TEXT NOT NULL,
                model            TEXT NOT NULL,
                input_tokens     INTEGER NOT NULL,
                output_tokens    INTEGER NOT NULL,
                total_tokens     INTEGER NOT NULL,
                cache_write_tokens INTEGER NOT NULL DEFAULT 0,
                cache_read_tokens  INTEGER NOT NULL DEFAULT 0,
                input_cost       REAL NOT NULL,
                output_cost      REAL NOT NULL,
                total_cost       REAL NOT NULL,
                iterations       INTEGER NOT NULL DEFAULT 1,
                tool_calls_count INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("api_costs table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }
}

/// Parse an RFC 3339 column value.
pub(crate) fn parse_datetime(
    raw: &str,
    column: &str,
) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_and_migrate_in_memory() {
        let db = Database::in_memory().await.unwrap();
        // Tables exist: a trivial query against each must succeed.
        assert_eq!(db.tasks().stats().await.unwrap().total, 0);
        assert_eq!(db.history().count().await.unwrap(), 0);
        assert!(db.costs().recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
    }
}
