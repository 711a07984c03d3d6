//! # SQL Certificate Store
//!
//! [`CertStorer`] over SQLite or PostgreSQL. Rows live in `issued_certs`:
//!
//! | column | contents |
//! |---|---|
//! | `key_id` | primary key |
//! | `principals` | JSON array of strings |
//! | `created_at`, `expires_at` | epoch seconds |
//! | `revoked` | 0 or 1 |
//! | `raw_key` | OpenSSH certificate text |
//!
//! Each operation is a single statement, so every call is atomic on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyRow, Row};
use tracing::instrument;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::errors::{KeymintError, Result};
use crate::observability::record_certificate_revoked;
use crate::storage::record::listing_cutoff;
use crate::storage::{create_pool, observe, CertRecord, CertStorer, DbPool};

const SELECT_COLUMNS: &str =
    "SELECT key_id, principals, created_at, expires_at, revoked, raw_key FROM issued_certs";

/// Map a row to a record
impl TryFrom<AnyRow> for CertRecord {
    type Error = KeymintError;

    fn try_from(row: AnyRow) -> Result<Self> {
        let key_id: String = row.try_get("key_id")?;
        let principals: String = row.try_get("principals")?;
        let created_at: i64 = row.try_get("created_at")?;
        let expires_at: i64 = row.try_get("expires_at")?;
        let revoked: i64 = row.try_get("revoked")?;
        let raw: String = row.try_get("raw_key")?;

        let principals: Vec<String> = serde_json::from_str(&principals).map_err(|e| {
            KeymintError::Serialization {
                source: e,
                context: format!("Invalid principals stored for certificate '{}'", key_id),
            }
        })?;

        Ok(CertRecord {
            created_at: from_epoch(&key_id, created_at)?,
            expires: from_epoch(&key_id, expires_at)?,
            key_id,
            principals,
            raw,
            revoked: revoked != 0,
        })
    }
}

fn from_epoch(key_id: &str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        KeymintError::internal(format!("Stored timestamp {} out of range for '{}'", secs, key_id))
    })
}

/// Certificate store backed by a SQL database.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: DbPool,
    backend: StoreBackend,
}

impl SqlStore {
    /// Connect, and migrate if `auto_migrate` is set.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let backend = config.backend()?;
        let pool = create_pool(config).await?;
        Ok(Self { pool, backend })
    }

    /// Wrap an existing pool whose schema is already migrated.
    pub fn with_pool(pool: DbPool, backend: StoreBackend) -> Self {
        Self { pool, backend }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn fetch(&self, sql: &str, now: Option<i64>) -> Result<Vec<CertRecord>> {
        let mut query = sqlx::query(sql);
        if let Some(now) = now {
            query = query.bind(now);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| KeymintError::storage(e, "Failed to list certificates"))?;

        rows.into_iter().map(CertRecord::try_from).collect()
    }

    async fn upsert(&self, record: CertRecord) -> Result<()> {
        let record = record.prepared()?;
        let principals = serde_json::to_string(&record.principals)?;

        // New rows start unrevoked; an update never touches the revoked column.
        sqlx::query(
            "INSERT INTO issued_certs (key_id, principals, created_at, expires_at, revoked, raw_key) \
             VALUES ($1, $2, $3, $4, 0, $5) \
             ON CONFLICT (key_id) DO UPDATE SET \
             principals = excluded.principals, \
             created_at = excluded.created_at, \
             expires_at = excluded.expires_at, \
             raw_key = excluded.raw_key",
        )
        .bind(record.key_id.as_str())
        .bind(principals)
        .bind(record.created_at.timestamp())
        .bind(record.expires.timestamp())
        .bind(record.raw.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            KeymintError::storage(e, format!("Failed to store certificate '{}'", record.key_id))
        })?;

        Ok(())
    }

    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<CertRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE key_id = $1"))
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| KeymintError::storage(e, format!("Failed to get certificate '{}'", key_id)))?;

        row.map(CertRecord::try_from).transpose()
    }

    async fn mark_revoked(&self, key_id: &str) -> Result<()> {
        let outcome = sqlx::query("UPDATE issued_certs SET revoked = 1 WHERE key_id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                KeymintError::storage(e, format!("Failed to revoke certificate '{}'", key_id))
            })?;

        if outcome.rows_affected() == 0 {
            return Err(KeymintError::not_found("certificate", key_id));
        }
        record_certificate_revoked(self.backend.as_str());
        Ok(())
    }
}

#[async_trait]
impl CertStorer for SqlStore {
    fn backend(&self) -> StoreBackend {
        self.backend
    }

    #[instrument(skip(self, record), fields(key_id = %record.key_id), name = "db_set_record")]
    async fn set_record(&self, record: CertRecord) -> Result<()> {
        observe(self.backend, "set_record", self.upsert(record).await)
    }

    #[instrument(skip(self), name = "db_get")]
    async fn get(&self, key_id: &str) -> Result<Option<CertRecord>> {
        observe(self.backend, "get", self.find_by_key_id(key_id).await)
    }

    #[instrument(skip(self), name = "db_list")]
    async fn list(&self, include_expired: bool) -> Result<Vec<CertRecord>> {
        let result = if include_expired {
            self.fetch(&format!("{SELECT_COLUMNS} ORDER BY key_id"), None).await
        } else {
            self.fetch(
                &format!("{SELECT_COLUMNS} WHERE expires_at > $1 ORDER BY key_id"),
                Some(listing_cutoff().timestamp()),
            )
            .await
        };
        observe(self.backend, "list", result)
    }

    #[instrument(skip(self), name = "db_revoke")]
    async fn revoke(&self, key_id: &str) -> Result<()> {
        observe(self.backend, "revoke", self.mark_revoked(key_id).await)
    }

    #[instrument(skip(self), name = "db_get_revoked")]
    async fn get_revoked(&self) -> Result<Vec<CertRecord>> {
        let result =
            self.fetch(&format!("{SELECT_COLUMNS} WHERE revoked = 1 ORDER BY key_id"), None).await;
        observe(self.backend, "get_revoked", result)
    }

    async fn close(&self) -> Result<()> {
        // Pool::close is idempotent
        self.pool.close().await;
        Ok(())
    }
}
