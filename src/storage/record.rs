//! Certificate records and the wire-certificate parser.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ssh_key::Certificate;

use crate::errors::{KeymintError, Result};

/// The durable representation of one issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertRecord {
    /// Key id copied from the certificate; the lookup key in every store
    pub key_id: String,

    /// Principals the certificate authorizes, in certificate order
    pub principals: Vec<String>,

    /// Start of the validity window (`valid-after`)
    pub created_at: DateTime<Utc>,

    /// End of the validity window (`valid-before`)
    pub expires: DateTime<Utc>,

    /// OpenSSH text encoding of the certificate; empty for hand-built records
    #[serde(default)]
    pub raw: String,

    /// Set only by `CertStorer::revoke`, never cleared
    #[serde(default)]
    pub revoked: bool,
}

impl CertRecord {
    /// Build a record without a backing certificate.
    pub fn new(
        key_id: impl Into<String>,
        principals: Vec<String>,
        created_at: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            principals,
            created_at,
            expires,
            raw: String::new(),
            revoked: false,
        }
    }

    /// Parse an authorized-keys formatted certificate (`ssh-ed25519-cert-v01@openssh.com AAAA...`).
    pub fn from_openssh(encoded: &str) -> Result<Self> {
        let cert = Certificate::from_openssh(encoded.trim())
            .map_err(|e| KeymintError::certificate("Failed to parse OpenSSH certificate", e))?;
        parse_certificate(&cert)
    }

    /// Whether the validity window has closed at `now`. A certificate is
    /// valid strictly before `valid-before`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Reject records no store should accept.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.key_id.is_empty() {
            return Err(KeymintError::validation_field("key id must not be empty", "key_id"));
        }
        if self.expires <= self.created_at {
            return Err(KeymintError::validation_field(
                format!(
                    "certificate '{}' expires at {} which is not after its creation at {}",
                    self.key_id, self.expires, self.created_at
                ),
                "expires",
            ));
        }
        Ok(())
    }

    /// Truncate timestamps to whole seconds, drop the incoming revoked flag
    /// and validate.
    ///
    /// Every backend stores second precision, which is all a certificate carries.
    /// Only `CertStorer::revoke` sets `revoked`; an upsert keeps whatever the
    /// stored record had and inserts new records unrevoked.
    pub(crate) fn prepared(mut self) -> Result<Self> {
        self.created_at = self.created_at.trunc_subsecs(0);
        self.expires = self.expires.trunc_subsecs(0);
        self.revoked = false;
        self.ensure_valid()?;
        Ok(self)
    }
}

/// The instant `list(false)` compares against, in whole seconds like the
/// stored timestamps. A record is listed while `expires > listing_cutoff()`.
pub(crate) fn listing_cutoff() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Convert an OpenSSH validity timestamp to UTC.
///
/// Every value up to `DateTime::<Utc>::MAX_UTC` converts exactly. Larger values,
/// including the `u64::MAX` "forever" marker, clamp to `MAX_UTC`.
pub fn timestamp_from_epoch(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Map a signed certificate to a record.
///
/// Does not verify the signature; callers hand in certificates they signed or
/// already checked. The only failure is re-encoding the certificate for `raw`.
pub fn parse_certificate(cert: &Certificate) -> Result<CertRecord> {
    let raw = cert
        .to_openssh()
        .map_err(|e| KeymintError::certificate("Failed to encode certificate", e))?;

    Ok(CertRecord {
        key_id: cert.key_id().to_string(),
        principals: cert.valid_principals().to_vec(),
        created_at: timestamp_from_epoch(cert.valid_after()),
        expires: timestamp_from_epoch(cert.valid_before()),
        raw,
        revoked: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conformance::sign_certificate;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn test_parse_certificate_copies_fields() {
        let now = Utc::now().timestamp() as u64;
        let cert = sign_certificate("id", &["principal"], now - 60, now + 3600);

        let record = parse_certificate(&cert).unwrap();

        assert_eq!(record.key_id, "id");
        assert_eq!(record.principals, vec!["principal".to_string()]);
        assert_eq!(record.created_at.timestamp() as u64, now - 60);
        assert_eq!(record.expires.timestamp() as u64, now + 3600);
        assert!(!record.revoked);
        assert!(record.raw.contains("-cert-v01@openssh.com"));
    }

    #[test]
    fn test_principal_order_is_preserved() {
        let cert = sign_certificate("ordered", &["zed", "alice", "mallory"], 1_000, 2_000);
        let record = parse_certificate(&cert).unwrap();
        assert_eq!(record.principals, vec!["zed", "alice", "mallory"]);
    }

    #[test]
    fn test_from_openssh_round_trips_raw() {
        let cert = sign_certificate("text", &["bob"], 1_700_000_000, 1_700_003_600);
        let encoded = cert.to_openssh().unwrap();

        let record = CertRecord::from_openssh(&format!("{encoded}\n")).unwrap();
        assert_eq!(record.key_id, "text");
        assert_eq!(record, parse_certificate(&cert).unwrap());
    }

    #[test]
    fn test_from_openssh_rejects_garbage() {
        let err = CertRecord::from_openssh("ssh-ed25519-cert-v01@openssh.com bm90IGEgY2VydA==")
            .unwrap_err();
        assert!(matches!(err, KeymintError::CertificateParse { .. }));
    }

    #[test]
    fn test_forever_certificate_clamps() {
        assert_eq!(timestamp_from_epoch(u64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(timestamp_from_epoch(0), DateTime::from_timestamp(0, 0).unwrap());
    }

    #[test]
    fn test_ensure_valid() {
        let now = Utc::now();
        let ok = CertRecord::new("a", vec![], now, now + Duration::minutes(1));
        assert!(ok.ensure_valid().is_ok());

        let empty = CertRecord::new("", vec![], now, now + Duration::minutes(1));
        assert!(matches!(empty.ensure_valid(), Err(KeymintError::Validation { .. })));

        let inverted = CertRecord::new("b", vec![], now, now - Duration::minutes(1));
        assert!(matches!(inverted.ensure_valid(), Err(KeymintError::Validation { .. })));

        let zero_length = CertRecord::new("c", vec![], now, now);
        assert!(zero_length.ensure_valid().is_err());
    }

    #[test]
    fn test_prepared_truncates_to_seconds() {
        let created = DateTime::from_timestamp(1_700_000_000, 750_000_000).unwrap();
        let record = CertRecord::new("k", vec![], created, created + Duration::hours(1));

        let prepared = record.prepared().unwrap();
        assert_eq!(prepared.created_at, DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        assert_eq!(prepared.expires.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let record = CertRecord::new("a", vec![], now - Duration::hours(2), now - Duration::hours(1));
        assert!(record.is_expired());
        assert!(!record.is_expired_at(now - Duration::hours(3)));
        assert!(record.is_expired_at(record.expires));
        assert!(!record.is_expired_at(record.expires - Duration::seconds(1)));
    }

    #[test]
    fn test_prepared_clears_revoked_flag() {
        let now = Utc::now();
        let mut record = CertRecord::new("r", vec![], now, now + Duration::hours(1));
        record.revoked = true;
        assert!(!record.prepared().unwrap().revoked);
    }

    proptest! {
        #[test]
        fn timestamps_convert_exactly(secs in 0u64..=253_402_300_799u64) {
            let converted = timestamp_from_epoch(secs);
            prop_assert_eq!(converted.timestamp(), secs as i64);
        }
    }
}
