//! Behaviour every [`CertStorer`] backend must share.
//!
//! Each check uses its own key prefix, so [`run_all`] can replay the whole
//! suite against one store instance. [`scenario`] must start from an empty
//! store, so run it before anything else; its outcome is compared across
//! backends.
//!
//! ```ignore
//! #[tokio::test]
//! async fn test_backend_conformance() {
//!     conformance::run_all(&MemoryStore::new()).await;
//! }
//! ```

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use rand::rngs::OsRng;
use ssh_key::{
    certificate::{Builder, CertType},
    Algorithm, Certificate, PrivateKey,
};

use crate::errors::KeymintError;
use crate::storage::{CertRecord, CertStorer};

/// Sign a throwaway Ed25519 user certificate with a throwaway CA.
pub fn sign_certificate(
    key_id: &str,
    principals: &[&str],
    valid_after: u64,
    valid_before: u64,
) -> Certificate {
    let ca = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("generate CA key");
    let user = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("generate user key");

    let mut builder = Builder::new_with_random_nonce(
        &mut OsRng,
        user.public_key().key_data().clone(),
        valid_after,
        valid_before,
    )
    .expect("certificate builder");
    builder.serial(1).expect("serial");
    builder.key_id(key_id).expect("key id");
    builder.cert_type(CertType::User).expect("cert type");
    if principals.is_empty() {
        builder.all_principals_valid().expect("all principals");
    }
    for principal in principals {
        builder.valid_principal(*principal).expect("principal");
    }
    builder.sign(&ca).expect("sign certificate")
}

/// A record valid from a minute ago until an hour from now.
pub fn future_record(key_id: &str, principal: &str) -> CertRecord {
    let now = Utc::now().trunc_subsecs(0);
    CertRecord::new(
        key_id,
        vec![principal.to_string()],
        now - Duration::minutes(1),
        now + Duration::hours(1),
    )
}

/// A record that expired an hour ago.
pub fn expired_record(key_id: &str) -> CertRecord {
    let now = Utc::now().trunc_subsecs(0);
    CertRecord::new(
        key_id,
        vec!["old".to_string()],
        now - Duration::hours(2),
        now - Duration::hours(1),
    )
}

fn with_prefix(records: Vec<CertRecord>, prefix: &str) -> Vec<String> {
    records.into_iter().map(|r| r.key_id).filter(|k| k.starts_with(prefix)).collect()
}

/// `get` of an unknown key is `Ok(None)`.
pub async fn get_missing_returns_none(store: &dyn CertStorer) {
    let found = store.get("missing/nothing-here").await.expect("get should not fail on a miss");
    assert_eq!(found, None);
}

/// `set_record` then `get` returns the stored fields.
pub async fn set_record_then_get(store: &dyn CertStorer) {
    let mut record = future_record("roundtrip/a", "alice");
    record.principals.push("ops".to_string());
    store.set_record(record.clone()).await.expect("set_record");

    let found = store.get("roundtrip/a").await.expect("get").expect("record should exist");
    assert_eq!(found, record);
}

/// A second `set_record` for the same key wins.
pub async fn set_record_overwrites(store: &dyn CertStorer) {
    let first = future_record("overwrite/a", "alice");
    let mut second = future_record("overwrite/a", "bob");
    second.expires += Duration::hours(5);

    store.set_record(first).await.expect("first set");
    store.set_record(second.clone()).await.expect("second set");

    let found = store.get("overwrite/a").await.expect("get").expect("record should exist");
    assert_eq!(found, second);
}

/// Structurally invalid records are rejected and nothing is written.
pub async fn set_record_rejects_invalid(store: &dyn CertStorer) {
    let empty = future_record("", "alice");
    let err = store.set_record(empty).await.unwrap_err();
    assert!(matches!(err, KeymintError::Validation { .. }), "{err:?}");
    assert!(!err.is_retryable());

    let mut inverted = future_record("invalid/inverted", "alice");
    inverted.expires = inverted.created_at - Duration::seconds(1);
    let err = store.set_record(inverted).await.unwrap_err();
    assert!(matches!(err, KeymintError::Validation { .. }), "{err:?}");

    assert_eq!(store.get("invalid/inverted").await.expect("get"), None);
}

/// `set_cert` stores the parsed certificate, including its OpenSSH text.
pub async fn set_cert_stores_parsed_record(store: &dyn CertStorer) {
    let now = Utc::now().timestamp() as u64;
    let cert = sign_certificate("cert/a", &["alice", "root"], now - 300, now + 3600);
    store.set_cert(&cert).await.expect("set_cert");

    let found = store.get("cert/a").await.expect("get").expect("record should exist");
    assert_eq!(found.principals, vec!["alice", "root"]);
    assert_eq!(found.created_at.timestamp() as u64, now - 300);
    assert_eq!(found.expires.timestamp() as u64, now + 3600);
    assert!(!found.revoked);

    let reparsed = Certificate::from_openssh(&found.raw).expect("raw should parse");
    assert_eq!(reparsed.key_id(), "cert/a");
}

/// Text certificates parse on the way in; garbage fails and stores nothing.
pub async fn set_cert_openssh_propagates_parse_errors(store: &dyn CertStorer) {
    let cert = sign_certificate("text/a", &["alice"], 1_700_000_000, 4_000_000_000);
    let encoded = cert.to_openssh().expect("encode");
    let record = store.set_cert_openssh(&encoded).await.expect("set_cert_openssh");
    assert_eq!(record.key_id, "text/a");
    assert!(store.get("text/a").await.expect("get").is_some());

    let err = store.set_cert_openssh("ssh-ed25519-cert-v01@openssh.com AAAA").await.unwrap_err();
    assert!(matches!(err, KeymintError::CertificateParse { .. }), "{err:?}");
}

/// Expired records are still returned by `get`.
pub async fn get_returns_expired_records(store: &dyn CertStorer) {
    store.set_record(expired_record("expired/a")).await.expect("set");
    let found = store.get("expired/a").await.expect("get").expect("expired record returned");
    assert!(found.is_expired());
}

/// `list(false)` hides expired records, `list(true)` shows all.
pub async fn list_filters_expired(store: &dyn CertStorer) {
    store.set_record(expired_record("filter/past")).await.expect("set past");
    store.set_record(future_record("filter/future", "alice")).await.expect("set future");

    let live = with_prefix(store.list(false).await.expect("list live"), "filter/");
    assert_eq!(live, vec!["filter/future"]);

    let all = with_prefix(store.list(true).await.expect("list all"), "filter/");
    assert_eq!(all, vec!["filter/future", "filter/past"]);
}

/// A record whose `expires` is the current second is already expired, in
/// every backend, however far into that second the listing runs.
pub async fn list_excludes_record_expiring_this_second(store: &dyn CertStorer) {
    let now = Utc::now().trunc_subsecs(0);
    let edge = CertRecord::new("edge/now", vec!["alice".to_string()], now - Duration::hours(1), now);
    let next = CertRecord::new(
        "edge/next",
        vec!["alice".to_string()],
        now - Duration::hours(1),
        now + Duration::seconds(5),
    );
    store.set_record(edge).await.expect("set edge");
    store.set_record(next).await.expect("set next");

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let live = with_prefix(store.list(false).await.expect("list live"), "edge/");
    assert_eq!(live, vec!["edge/next"]);
    let all = with_prefix(store.list(true).await.expect("list all"), "edge/");
    assert_eq!(all, vec!["edge/next", "edge/now"]);
}

/// Listings come back in key-id order regardless of insertion order.
pub async fn list_is_ordered_by_key_id(store: &dyn CertStorer) {
    for key in ["order/c", "order/a", "order/b"] {
        store.set_record(future_record(key, "alice")).await.expect("set");
    }
    let keys = with_prefix(store.list(true).await.expect("list"), "order/");
    assert_eq!(keys, vec!["order/a", "order/b", "order/c"]);

    let again = with_prefix(store.list(true).await.expect("list"), "order/");
    assert_eq!(keys, again);
}

/// Revocation sticks across repeat revokes and later upserts.
pub async fn revoke_is_monotonic(store: &dyn CertStorer) {
    store.set_record(future_record("revoke/a", "alice")).await.expect("set");
    store.revoke("revoke/a").await.expect("first revoke");
    store.revoke("revoke/a").await.expect("second revoke");

    let revoked = with_prefix(store.get_revoked().await.expect("get_revoked"), "revoke/");
    assert_eq!(revoked, vec!["revoke/a"]);

    store.set_record(future_record("revoke/a", "bob")).await.expect("rewrite");
    let found = store.get("revoke/a").await.expect("get").expect("exists");
    assert!(found.revoked, "an upsert must not clear revocation");
    assert_eq!(found.principals, vec!["bob"]);
}

/// `set_record` never revokes: an incoming `revoked` flag is ignored.
pub async fn set_record_ignores_revoked_flag(store: &dyn CertStorer) {
    let mut record = future_record("preset/a", "alice");
    record.revoked = true;
    store.set_record(record).await.expect("set");

    let found = store.get("preset/a").await.expect("get").expect("exists");
    assert!(!found.revoked);
    assert!(with_prefix(store.get_revoked().await.expect("get_revoked"), "preset/").is_empty());

    store.revoke("preset/a").await.expect("revoke");
    let mut rewrite = future_record("preset/a", "bob");
    rewrite.revoked = false;
    store.set_record(rewrite).await.expect("rewrite");
    assert!(store.get("preset/a").await.expect("get").expect("exists").revoked);
}

/// Revoking an unknown key is `NotFound` and touches nothing else.
pub async fn revoke_missing_is_not_found(store: &dyn CertStorer) {
    store.set_record(future_record("bystander/a", "alice")).await.expect("set");

    let err = store.revoke("bystander/ghost").await.unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    let bystander = store.get("bystander/a").await.expect("get").expect("exists");
    assert!(!bystander.revoked);
    assert_eq!(store.get("bystander/ghost").await.expect("get"), None);
}

/// `get_revoked` returns exactly the revoked records, in key order.
pub async fn get_revoked_returns_only_revoked(store: &dyn CertStorer) {
    for key in ["only/c", "only/a", "only/b", "only/d"] {
        store.set_record(future_record(key, "alice")).await.expect("set");
    }
    store.revoke("only/c").await.expect("revoke c");
    store.revoke("only/a").await.expect("revoke a");

    let revoked = store.get_revoked().await.expect("get_revoked");
    assert!(revoked.iter().all(|r| r.revoked));
    assert_eq!(with_prefix(revoked, "only/"), vec!["only/a", "only/c"]);
}

/// Run every single-store check against one store.
pub async fn run_all(store: &dyn CertStorer) {
    get_missing_returns_none(store).await;
    set_record_then_get(store).await;
    set_record_overwrites(store).await;
    set_record_rejects_invalid(store).await;
    set_cert_stores_parsed_record(store).await;
    set_cert_openssh_propagates_parse_errors(store).await;
    get_returns_expired_records(store).await;
    list_filters_expired(store).await;
    list_excludes_record_expiring_this_second(store).await;
    list_is_ordered_by_key_id(store).await;
    revoke_is_monotonic(store).await;
    set_record_ignores_revoked_flag(store).await;
    revoke_missing_is_not_found(store).await;
    get_revoked_returns_only_revoked(store).await;
}

/// A revoke that completed is never undone by concurrent rewrites of the key.
pub async fn concurrent_revoke_survives_rewrites(store: Arc<dyn CertStorer>) {
    let key = "concurrent/target";
    store.set_record(future_record(key, "alice")).await.expect("seed");
    store.revoke(key).await.expect("revoke");

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.set_record(future_record(key, &format!("user{i}"))).await.expect("rewrite");
            let other = format!("concurrent/other-{i:02}");
            store.set_record(future_record(&other, "bob")).await.expect("set other");
            if i % 2 == 0 {
                store.revoke(&other).await.expect("revoke other");
            }
        }));
    }
    for task in tasks {
        task.await.expect("task panicked");
    }

    let target = store.get(key).await.expect("get").expect("exists");
    assert!(target.revoked);

    let revoked = with_prefix(store.get_revoked().await.expect("get_revoked"), "concurrent/");
    assert_eq!(revoked.len(), 9);
    assert!(revoked.contains(&key.to_string()));
}

/// Observable results of the cross-backend scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub listed: Vec<String>,
    pub fetched: Option<CertRecord>,
    pub revoked: Vec<String>,
}

/// set_record → list → set_cert → get → revoke → get_revoked on an empty store.
///
/// `raw` differs between runs because each run signs a fresh certificate, so
/// it is checked here and cleared from the outcome.
pub async fn scenario(store: &dyn CertStorer) -> ScenarioOutcome {
    store.set_record(future_record("a", "alice")).await.expect("set_record");
    let listed = store.list(true).await.expect("list").into_iter().map(|r| r.key_id).collect();

    let cert = sign_certificate("key", &["alice"], 1_700_000_000, 4_000_000_000);
    store.set_cert(&cert).await.expect("set_cert");

    let mut fetched = store.get("key").await.expect("get");
    if let Some(record) = fetched.as_mut() {
        assert!(!record.raw.is_empty());
        record.raw.clear();
    }

    store.revoke("key").await.expect("revoke");
    let revoked =
        store.get_revoked().await.expect("get_revoked").into_iter().map(|r| r.key_id).collect();

    ScenarioOutcome { listed, fetched, revoked }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_reference_scenario() {
        let outcome = scenario(&MemoryStore::new()).await;
        assert_eq!(outcome.listed, vec!["a"]);
        assert_eq!(outcome.revoked, vec!["key"]);

        let fetched = outcome.fetched.expect("certificate stored");
        assert_eq!(fetched.principals, vec!["alice"]);
        assert!(!fetched.revoked);
    }
}
