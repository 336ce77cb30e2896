//! SQLite-backed ledger. Optimistic concurrency rides on a version
//! column: updates are `WHERE path = ? AND version = ?` and a zero
//! row count means somebody else got there first.

use super::{CasOutcome, CasUpdate, CasVerdict, LedgerError, LedgerStore, CAS_ATTEMPTS};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info, warn};

/// Initialize the ledger database with schema and pragmas.
pub async fn init_ledger_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas_conn(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool).await?;

    info!("Ledger database initialized at {}", db_path);
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema_sql = include_str!("schema.sql");

    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    Ok(())
}

async fn configure_pragmas_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the actual mode set; must use fetch to get result
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    debug!("SQLite journal_mode set to: {}", journal_mode);

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Persistent [`LedgerStore`] over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteLedger { pool }
    }

    /// Open (creating if needed) the ledger database at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(db_path: &str) -> Result<Self, sqlx::Error> {
        Ok(SqliteLedger::new(init_ledger_db(db_path).await?))
    }

    async fn read_versioned(&self, path: &str) -> Result<Option<(Value, i64)>, LedgerError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, version FROM ledger_records WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((raw, version)) => Ok(Some((serde_json::from_str(&raw)?, version))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn read(&self, path: &str) -> Result<Option<Value>, LedgerError> {
        Ok(self
            .read_versioned(path)
            .await?
            .map(|(value, _version)| value))
    }

    async fn compare_and_swap(
        &self,
        path: &str,
        update: CasUpdate<'_>,
    ) -> Result<CasOutcome, LedgerError> {
        for attempt in 1..=CAS_ATTEMPTS {
            let current = self.read_versioned(path).await?;

            match update(current.as_ref().map(|(value, _)| value)) {
                CasVerdict::Abort => {
                    return Ok(CasOutcome {
                        committed: false,
                        value: current.map(|(value, _)| value),
                    });
                }
                CasVerdict::Commit(next) => {
                    let raw = serde_json::to_string(&next)?;
                    let now_ms = Utc::now().timestamp_millis();

                    let applied = match current {
                        Some((_, version)) => {
                            sqlx::query(
                                r#"
                                UPDATE ledger_records
                                SET value = ?, version = version + 1, updated_at_ms = ?
                                WHERE path = ? AND version = ?
                                "#,
                            )
                            .bind(&raw)
                            .bind(now_ms)
                            .bind(path)
                            .bind(version)
                            .execute(&self.pool)
                            .await?
                            .rows_affected()
                                == 1
                        }
                        None => {
                            sqlx::query(
                                r#"
                                INSERT OR IGNORE INTO ledger_records (path, value, version, updated_at_ms)
                                VALUES (?, ?, 1, ?)
                                "#,
                            )
                            .bind(path)
                            .bind(&raw)
                            .bind(now_ms)
                            .execute(&self.pool)
                            .await?
                            .rows_affected()
                                == 1
                        }
                    };

                    if applied {
                        return Ok(CasOutcome {
                            committed: true,
                            value: Some(next),
                        });
                    }
                    debug!(path, attempt, "ledger cas lost version race, retrying");
                }
            }
        }

        warn!(path, attempts = CAS_ATTEMPTS, "ledger cas exhausted retries");
        Err(LedgerError::Contention {
            path: path.to_string(),
            attempts: CAS_ATTEMPTS,
        })
    }

    async fn write_many(&self, writes: Vec<(String, Value)>) -> Result<(), LedgerError> {
        if writes.is_empty() {
            return Ok(());
        }

        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for (path, value) in &writes {
            let raw = serde_json::to_string(value)?;
            sqlx::query(
                r#"
                INSERT INTO ledger_records (path, value, version, updated_at_ms)
                VALUES (?, ?, 1, ?)
                ON CONFLICT(path) DO UPDATE SET
                    value = excluded.value,
                    version = ledger_records.version + 1,
                    updated_at_ms = excluded.updated_at_ms
                "#,
            )
            .bind(path)
            .bind(&raw)
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
