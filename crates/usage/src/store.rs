//! Batched persistence for [`UsageRecord`]s, the `usage_records` table.
//!
//! Grounded on `omgpointless-aspy`'s `pipeline/lifestats.rs`: one pooled connection, one
//! `INSERT` transaction per batch rather than per row.

use std::path::Path;

use r2d2_sqlite::SqliteConnectionManager;

use crate::{error::UsageError, record::UsageRecord};

type Pool = r2d2::Pool<SqliteConnectionManager>;

/// A pooled SQLite-backed sink for usage records.
#[derive(Clone)]
pub struct UsageStore {
    pool: Pool,
}

impl UsageStore {
    /// Open (creating if necessary) the `usage_records` table in the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, UsageError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::new(manager)?;
        Self::init(&pool)?;
        Ok(Self { pool })
    }

    /// An in-memory store, for tests and dry-run configurations without a `config-dir`.
    pub fn in_memory() -> Result<Self, UsageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::new(manager)?;
        Self::init(&pool)?;
        Ok(Self { pool })
    }

    fn init(pool: &Pool) -> Result<(), UsageError> {
        pool.get()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS usage_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                provider_id TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                estimated INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL,
                status_code INTEGER NOT NULL,
                streamed INTEGER NOT NULL,
                error_kind TEXT
            )",
        )?;

        Ok(())
    }

    /// Write a batch of records in a single transaction.
    pub fn write_batch(&self, records: &[UsageRecord]) -> Result<(), UsageError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        {
            let mut statement = tx.prepare_cached(
                "INSERT INTO usage_records
                    (timestamp, rule_id, provider_id, model, input_tokens, output_tokens,
                     estimated, latency_ms, status_code, streamed, error_kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for record in records {
                statement.execute(rusqlite::params![
                    record.timestamp.to_string(),
                    record.rule_id.to_string(),
                    record.provider_id.to_string(),
                    record.model,
                    record.input_tokens,
                    record.output_tokens,
                    record.estimated,
                    record.latency_ms,
                    record.status_code,
                    record.streamed,
                    record.error_kind,
                ])?;
            }
        }

        tx.commit()?;

        Ok(())
    }
}
