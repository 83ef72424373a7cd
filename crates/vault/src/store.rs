//! Persistence for [`CredentialRecord`]s, the `credentials` table of `state.db`.
//! Static API keys never touch this table; only OAuth-derived credentials
//! are persisted here, updated in place on every refresh.

use std::path::Path;

use jiff::Timestamp;
use r2d2_sqlite::SqliteConnectionManager;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::{credential::CredentialRecord, error::VaultError};

type Pool = r2d2::Pool<SqliteConnectionManager>;

/// A pooled SQLite-backed store for OAuth credential records.
#[derive(Clone)]
pub struct CredentialStore {
    pool: Pool,
}

impl CredentialStore {
    /// Open (creating if necessary) the `credentials` table in the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::new(manager)?;

        pool.get()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                provider_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                id_token TEXT,
                expiry TEXT NOT NULL,
                token_type TEXT NOT NULL,
                resource_url TEXT,
                provider_metadata TEXT NOT NULL
            )",
        )?;

        Ok(Self { pool })
    }

    /// An in-memory store, for tests and dry-run configurations without a `config-dir`.
    pub fn in_memory() -> Result<Self, VaultError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::new(manager)?;

        pool.get()?.execute_batch(
            "CREATE TABLE credentials (
                provider_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                id_token TEXT,
                expiry TEXT NOT NULL,
                token_type TEXT NOT NULL,
                resource_url TEXT,
                provider_metadata TEXT NOT NULL
            )",
        )?;

        Ok(Self { pool })
    }

    /// Load the credential record for a provider, if one has been persisted.
    pub fn load(&self, provider_id: Uuid) -> Result<Option<CredentialRecord>, VaultError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            "SELECT access_token, refresh_token, id_token, expiry, token_type, resource_url, provider_metadata
             FROM credentials WHERE provider_id = ?1",
            [provider_id.to_string()],
            |row| {
                let expiry: String = row.get(3)?;
                let metadata: String = row.get(6)?;

                Ok(CredentialRecord {
                    provider_id,
                    access_token: SecretString::from(row.get::<_, String>(0)?),
                    refresh_token: row.get::<_, Option<String>>(1)?.map(SecretString::from),
                    id_token: row.get::<_, Option<String>>(2)?.map(SecretString::from),
                    expiry: expiry.parse().unwrap_or_else(|_| Timestamp::now()),
                    token_type: row.get(4)?,
                    resource_url: row.get(5)?,
                    provider_metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or overwrite the credential record for `record.provider_id`.
    pub fn upsert(&self, record: &CredentialRecord) -> Result<(), VaultError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO credentials
                (provider_id, access_token, refresh_token, id_token, expiry, token_type, resource_url, provider_metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(provider_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                id_token = excluded.id_token,
                expiry = excluded.expiry,
                token_type = excluded.token_type,
                resource_url = excluded.resource_url,
                provider_metadata = excluded.provider_metadata",
            rusqlite::params![
                record.provider_id.to_string(),
                record.access_token.expose_secret(),
                record.refresh_token.as_ref().map(ExposeSecret::expose_secret),
                record.id_token.as_ref().map(ExposeSecret::expose_secret),
                record.expiry.to_string(),
                record.token_type,
                record.resource_url,
                serde_json::to_string(&record.provider_metadata).unwrap_or_default(),
            ],
        )?;

        Ok(())
    }

    /// Drop the credential for a provider, returning it to the `None` state.
    pub fn delete(&self, provider_id: Uuid) -> Result<(), VaultError> {
        self.pool
            .get()?
            .execute("DELETE FROM credentials WHERE provider_id = ?1", [provider_id.to_string()])?;

        Ok(())
    }
}
