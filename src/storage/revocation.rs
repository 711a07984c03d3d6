//! Revocation lists for SSH hosts.
//!
//! `sshd` reads `RevokedKeys` files with one public key per line. The list
//! here also keeps the revoked key ids so a caller holding a certificate can
//! check it without going back to the store.

use std::collections::BTreeSet;

use ssh_key::{public::KeyData, Certificate, PublicKey};
use tracing::{warn, Instrument};

use crate::errors::{KeymintError, Result};
use crate::storage::{CertRecord, CertStorer};

#[derive(Debug, Clone, Default)]
pub struct RevocationList {
    key_ids: BTreeSet<String>,
    public_keys: Vec<KeyData>,
}

impl RevocationList {
    /// Build from store records, ignoring any that are not revoked.
    ///
    /// Records without a parseable `raw` certificate contribute their key id
    /// only.
    pub fn from_records(records: &[CertRecord]) -> Self {
        let mut list = Self::default();
        for record in records.iter().filter(|r| r.revoked) {
            list.key_ids.insert(record.key_id.clone());

            if record.raw.is_empty() {
                continue;
            }
            match Certificate::from_openssh(record.raw.trim()) {
                Ok(cert) => {
                    let key = cert.public_key().clone();
                    if !list.public_keys.contains(&key) {
                        list.public_keys.push(key);
                    }
                }
                Err(e) => {
                    warn!(key_id = %record.key_id, error = %e, "Revoked record has unparseable certificate")
                }
            }
        }
        list
    }

    /// Snapshot the revoked records of a store.
    pub async fn load(store: &dyn CertStorer) -> Result<Self> {
        let span = crate::store_span!("load_revocation_list", backend = store.backend().as_str());
        let revoked = store.get_revoked().instrument(span).await?;
        Ok(Self::from_records(&revoked))
    }

    pub fn contains_key_id(&self, key_id: &str) -> bool {
        self.key_ids.contains(key_id)
    }

    /// A certificate is revoked if its key id or its certified key is listed.
    pub fn is_revoked(&self, cert: &Certificate) -> bool {
        self.contains_key_id(cert.key_id()) || self.public_keys.contains(cert.public_key())
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.key_ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.key_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_ids.is_empty()
    }

    /// Render an OpenSSH `RevokedKeys` file.
    pub fn to_revoked_keys_file(&self) -> Result<String> {
        let mut out = String::new();
        for key in &self.public_keys {
            let line = PublicKey::from(key.clone())
                .to_openssh()
                .map_err(|e| KeymintError::certificate("Failed to encode revoked key", e))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}
