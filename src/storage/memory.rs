//! In-process certificate store.
//!
//! The reference implementation of [`CertStorer`]: every other backend is
//! checked against the behaviour of this one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::config::StoreBackend;
use crate::errors::{KeymintError, Result};
use crate::observability::record_certificate_revoked;
use crate::storage::record::listing_cutoff;
use crate::storage::{observe, CertRecord, CertStorer};

/// Certificate store held entirely in memory.
///
/// Records live in a `BTreeMap` so listings come back in key-id order. One
/// lock guards the whole map, which serializes writes per key id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, CertRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CertStorer for MemoryStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }

    #[instrument(skip(self, record), fields(key_id = %record.key_id), name = "memory_set_record")]
    async fn set_record(&self, record: CertRecord) -> Result<()> {
        let result = match record.prepared() {
            Ok(mut record) => {
                let mut records = self.records.write().await;
                if let Some(existing) = records.get(&record.key_id) {
                    record.revoked = existing.revoked;
                }
                records.insert(record.key_id.clone(), record);
                Ok(())
            }
            Err(e) => Err(e),
        };
        observe(self.backend(), "set_record", result)
    }

    #[instrument(skip(self), name = "memory_get")]
    async fn get(&self, key_id: &str) -> Result<Option<CertRecord>> {
        let record = self.records.read().await.get(key_id).cloned();
        observe(self.backend(), "get", Ok(record))
    }

    #[instrument(skip(self), name = "memory_list")]
    async fn list(&self, include_expired: bool) -> Result<Vec<CertRecord>> {
        let now = listing_cutoff();
        let records = self
            .records
            .read()
            .await
            .values()
            .filter(|r| include_expired || !r.is_expired_at(now))
            .cloned()
            .collect();
        observe(self.backend(), "list", Ok(records))
    }

    #[instrument(skip(self), name = "memory_revoke")]
    async fn revoke(&self, key_id: &str) -> Result<()> {
        let result = match self.records.write().await.get_mut(key_id) {
            Some(record) => {
                record.revoked = true;
                record_certificate_revoked(self.backend().as_str());
                Ok(())
            }
            None => Err(KeymintError::not_found("certificate", key_id)),
        };
        observe(self.backend(), "revoke", result)
    }

    #[instrument(skip(self), name = "memory_get_revoked")]
    async fn get_revoked(&self) -> Result<Vec<CertRecord>> {
        let records =
            self.records.read().await.values().filter(|r| r.revoked).cloned().collect();
        observe(self.backend(), "get_revoked", Ok(records))
    }

    async fn close(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }
}
