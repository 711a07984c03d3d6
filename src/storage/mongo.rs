//! # MongoDB Certificate Store
//!
//! Records are documents in the `issued_certs` collection with a unique index
//! on `keyid`. Writes are single-document updates, which MongoDB applies
//! atomically; the revoked flag is only written on insert (`$setOnInsert`) and
//! by `revoke`, so an upsert never changes it.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    options::{ClientOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::{sanitize_url, DatabaseConfig, StoreBackend};
use crate::errors::{KeymintError, Result};
use crate::observability::record_certificate_revoked;
use crate::storage::record::listing_cutoff;
use crate::storage::{observe, CertRecord, CertStorer};

const DEFAULT_DATABASE: &str = "keymint";
const COLLECTION: &str = "issued_certs";

/// Stored document shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CertDocument {
    keyid: String,
    #[serde(default)]
    principals: Vec<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    expires: DateTime<Utc>,
    #[serde(default)]
    raw: String,
    #[serde(default)]
    revoked: bool,
}

impl From<CertDocument> for CertRecord {
    fn from(doc: CertDocument) -> Self {
        CertRecord {
            key_id: doc.keyid,
            principals: doc.principals,
            created_at: doc.created_at,
            expires: doc.expires,
            raw: doc.raw,
            revoked: doc.revoked,
        }
    }
}

/// Certificate store backed by a MongoDB collection.
#[derive(Debug)]
pub struct MongoStore {
    client: Client,
    collection: Collection<CertDocument>,
    closed: AtomicBool,
}

impl MongoStore {
    /// Connect, verify the server answers and ensure the key id index exists.
    ///
    /// The database comes from the URL path and defaults to `keymint`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.url).await.map_err(|e| {
            KeymintError::config_with_source(
                format!("Invalid MongoDB URL: {}", sanitize_url(&config.url)),
                e,
            )
        })?;
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.connect_timeout());
        options.max_pool_size = Some(config.max_connections);
        options.min_pool_size = Some(config.min_connections);
        options.max_idle_time = config.idle_timeout();
        options.app_name.get_or_insert_with(|| DEFAULT_DATABASE.to_string());

        let database_name =
            options.default_database.clone().unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let client = Client::with_options(options).map_err(|e| {
            KeymintError::config_with_source("Failed to build MongoDB client", e)
        })?;

        let database = client.database(&database_name);
        database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            tracing::error!(
                error = %e,
                url = %sanitize_url(&config.url),
                "Failed to reach MongoDB"
            );
            KeymintError::config_with_source(
                format!("MongoDB unreachable: {}", sanitize_url(&config.url)),
                e,
            )
        })?;

        let collection = database.collection::<CertDocument>(COLLECTION);
        let index = IndexModel::builder()
            .keys(doc! { "keyid": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection
            .create_index(index)
            .await
            .map_err(|e| KeymintError::storage(e, "Failed to create keyid index"))?;

        tracing::info!(database = %database_name, collection = COLLECTION, "MongoDB store ready");
        Ok(Self { client, collection, closed: AtomicBool::new(false) })
    }

    async fn find(&self, filter: Document) -> Result<Vec<CertRecord>> {
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "keyid": 1 })
            .await
            .map_err(|e| KeymintError::storage(e, "Failed to list certificates"))?;

        let documents: Vec<CertDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| KeymintError::storage(e, "Failed to read certificate documents"))?;

        Ok(documents.into_iter().map(CertRecord::from).collect())
    }

    async fn upsert(&self, record: CertRecord) -> Result<()> {
        let record = record.prepared()?;
        let update = doc! {
            "$set": {
                "principals": record.principals.clone(),
                "created_at": bson::DateTime::from_chrono(record.created_at),
                "expires": bson::DateTime::from_chrono(record.expires),
                "raw": record.raw.as_str(),
            },
            "$setOnInsert": { "revoked": false },
        };

        self.collection
            .update_one(doc! { "keyid": record.key_id.as_str() }, update)
            .upsert(true)
            .await
            .map_err(|e| {
                KeymintError::storage(e, format!("Failed to store certificate '{}'", record.key_id))
            })?;
        Ok(())
    }

    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<CertRecord>> {
        let document = self
            .collection
            .find_one(doc! { "keyid": key_id })
            .await
            .map_err(|e| KeymintError::storage(e, format!("Failed to get certificate '{}'", key_id)))?;
        Ok(document.map(CertRecord::from))
    }

    async fn mark_revoked(&self, key_id: &str) -> Result<()> {
        let outcome = self
            .collection
            .update_one(doc! { "keyid": key_id }, doc! { "$set": { "revoked": true } })
            .await
            .map_err(|e| {
                KeymintError::storage(e, format!("Failed to revoke certificate '{}'", key_id))
            })?;

        if outcome.matched_count == 0 {
            return Err(KeymintError::not_found("certificate", key_id));
        }
        record_certificate_revoked(StoreBackend::Mongo.as_str());
        Ok(())
    }
}

#[async_trait]
impl CertStorer for MongoStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Mongo
    }

    #[instrument(skip(self, record), fields(key_id = %record.key_id), name = "mongo_set_record")]
    async fn set_record(&self, record: CertRecord) -> Result<()> {
        observe(self.backend(), "set_record", self.upsert(record).await)
    }

    #[instrument(skip(self), name = "mongo_get")]
    async fn get(&self, key_id: &str) -> Result<Option<CertRecord>> {
        observe(self.backend(), "get", self.find_by_key_id(key_id).await)
    }

    #[instrument(skip(self), name = "mongo_list")]
    async fn list(&self, include_expired: bool) -> Result<Vec<CertRecord>> {
        let filter = if include_expired {
            doc! {}
        } else {
            doc! { "expires": { "$gt": bson::DateTime::from_chrono(listing_cutoff()) } }
        };
        observe(self.backend(), "list", self.find(filter).await)
    }

    #[instrument(skip(self), name = "mongo_revoke")]
    async fn revoke(&self, key_id: &str) -> Result<()> {
        observe(self.backend(), "revoke", self.mark_revoked(key_id).await)
    }

    #[instrument(skip(self), name = "mongo_get_revoked")]
    async fn get_revoked(&self) -> Result<Vec<CertRecord>> {
        observe(self.backend(), "get_revoked", self.find(doc! { "revoked": true }).await)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.clone().shutdown().await;
        }
        Ok(())
    }
}
