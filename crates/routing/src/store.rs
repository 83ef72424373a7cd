//! Durable storage for a Rule's `current_service_index`, the `rule_rotation` table.
//! Rotation survives a restart; Service-level observability counters
//! (request/token/error counts, last-used) do not and live in [`crate::stats`] instead.

use std::path::Path;

use dashmap::DashMap;
use r2d2_sqlite::SqliteConnectionManager;
use uuid::Uuid;

use crate::error::RoutingError;

/// Persists and retrieves a Rule's current rotation index.
///
/// Mirrors `rate-limit`'s storage-trait split (Redis-backed vs. in-memory
/// implementations behind one interface), generalized to SQLite since the rest of
/// this product's durable state already lives in a sibling SQLite file.
pub trait RotationStore: Send + Sync {
    /// The last persisted rotation index for `rule_id`, if any has been recorded yet.
    fn current_index(&self, rule_id: Uuid) -> Result<Option<u32>, RoutingError>;

    /// Persist `index` as the current rotation index for `rule_id`.
    fn set_current_index(&self, rule_id: Uuid, index: u32) -> Result<(), RoutingError>;
}

/// An in-memory [`RotationStore`], used by unit tests and dry-run configurations
/// without a `config-dir`.
#[derive(Debug, Default)]
pub struct InMemoryRotationStore {
    indices: DashMap<Uuid, u32>,
}

impl InMemoryRotationStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RotationStore for InMemoryRotationStore {
    fn current_index(&self, rule_id: Uuid) -> Result<Option<u32>, RoutingError> {
        Ok(self.indices.get(&rule_id).map(|entry| *entry))
    }

    fn set_current_index(&self, rule_id: Uuid, index: u32) -> Result<(), RoutingError> {
        self.indices.insert(rule_id, index);
        Ok(())
    }
}

type Pool = r2d2::Pool<SqliteConnectionManager>;

/// A pooled SQLite-backed [`RotationStore`], the `rule_rotation` table.
#[derive(Clone)]
pub struct SqliteRotationStore {
    pool: Pool,
}

impl SqliteRotationStore {
    /// Open (creating if necessary) the `rule_rotation` table in the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RoutingError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::new(manager)?;

        pool.get()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS rule_rotation (
                rule_id TEXT PRIMARY KEY,
                current_service_index INTEGER NOT NULL
            )",
        )?;

        Ok(Self { pool })
    }

    /// An in-memory SQLite-backed store, for tests that want the real query path.
    pub fn in_memory() -> Result<Self, RoutingError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::new(manager)?;

        pool.get()?.execute_batch(
            "CREATE TABLE rule_rotation (
                rule_id TEXT PRIMARY KEY,
                current_service_index INTEGER NOT NULL
            )",
        )?;

        Ok(Self { pool })
    }
}

impl RotationStore for SqliteRotationStore {
    fn current_index(&self, rule_id: Uuid) -> Result<Option<u32>, RoutingError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            "SELECT current_service_index FROM rule_rotation WHERE rule_id = ?1",
            [rule_id.to_string()],
            |row| row.get::<_, i64>(0),
        );

        match result {
            Ok(index) => Ok(Some(index as u32)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_current_index(&self, rule_id: Uuid, index: u32) -> Result<(), RoutingError> {
        self.pool.get()?.execute(
            "INSERT INTO rule_rotation (rule_id, current_service_index) VALUES (?1, ?2)
             ON CONFLICT(rule_id) DO UPDATE SET current_service_index = excluded.current_service_index",
            rusqlite::params![rule_id.to_string(), index],
        )?;

        Ok(())
    }
}
