//! # Certificate Storage
//!
//! The [`CertStorer`] contract and its backends. Every backend honours the
//! same observable semantics; [`MemoryStore`] is the reference and the
//! persistent backends replay its conformance suite.
//!
//! - [`MemoryStore`]: process-local map, no durability
//! - [`SqlStore`]: SQLite or PostgreSQL through the sqlx `Any` driver
//! - [`MongoStore`]: MongoDB collection
//!
//! Use [`open_store`] to pick a backend from a [`DatabaseConfig`].

use std::sync::Arc;

use async_trait::async_trait;
use ssh_key::Certificate;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::errors::Result;
use crate::observability::record_store_operation;

pub mod memory;
pub mod migrations;
pub mod mongo;
pub mod pool;
pub mod record;
pub mod revocation;
pub mod sql;

#[cfg(test)]
pub(crate) mod conformance;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use memory::MemoryStore;
pub use migrations::run_migrations;
pub use mongo::MongoStore;
pub use pool::{create_pool, DbPool};
pub use record::{parse_certificate, timestamp_from_epoch, CertRecord};
pub use revocation::RevocationList;
pub use sql::SqlStore;

/// Persistence and revocation tracking for issued certificates.
///
/// All operations may be called concurrently. Writes for one key id are
/// serialized by the backend, so a `revoke` that completes before a
/// `set_record` starts is never undone by it.
#[async_trait]
pub trait CertStorer: Send + Sync {
    /// Which backend serves this store.
    fn backend(&self) -> StoreBackend;

    /// Upsert a record keyed by `key_id`. The last write wins, except that a
    /// revoked record stays revoked.
    async fn set_record(&self, record: CertRecord) -> Result<()>;

    /// Parse a signed certificate and store the resulting record.
    async fn set_cert(&self, cert: &Certificate) -> Result<()> {
        let record = parse_certificate(cert)?;
        self.set_record(record).await
    }

    /// Parse an OpenSSH text certificate and store it. Parse failures propagate.
    async fn set_cert_openssh(&self, encoded: &str) -> Result<CertRecord> {
        let record = CertRecord::from_openssh(encoded)?;
        self.set_record(record.clone()).await?;
        Ok(record)
    }

    /// Most recently stored record for `key_id`. Expired records are returned
    /// like any other.
    async fn get(&self, key_id: &str) -> Result<Option<CertRecord>>;

    /// All records ordered by key id, optionally hiding those that expired
    /// before the call.
    async fn list(&self, include_expired: bool) -> Result<Vec<CertRecord>>;

    /// Mark a record revoked. Revoking twice succeeds; an unknown key id is
    /// `NotFound` and leaves every other record untouched.
    async fn revoke(&self, key_id: &str) -> Result<()>;

    /// Every revoked record, ordered by key id.
    async fn get_revoked(&self) -> Result<Vec<CertRecord>>;

    /// Release connections and handles. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Open the store selected by the URL scheme in `config`.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn CertStorer>> {
    let backend = config.backend()?;
    tracing::info!(backend = backend.as_str(), "Opening certificate store");

    let store: Arc<dyn CertStorer> = match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite | StoreBackend::Postgres => Arc::new(SqlStore::connect(config).await?),
        StoreBackend::Mongo => Arc::new(MongoStore::connect(config).await?),
    };
    Ok(store)
}

/// Count the outcome of a store call and pass the result through.
pub(crate) fn observe<T>(
    backend: StoreBackend,
    operation: &'static str,
    result: Result<T>,
) -> Result<T> {
    record_store_operation(backend.as_str(), operation, result.is_ok());
    result
}
