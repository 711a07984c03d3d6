//! Utility functions and helpers

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{KeymintError, Result};

/// Run `future` with a deadline. An elapsed deadline drops the future, which
/// cancels it, and yields [`KeymintError::Timeout`].
///
/// ```no_run
/// # async fn demo(store: &dyn keymint::CertStorer) -> keymint::Result<()> {
/// use std::time::Duration;
/// let record = keymint::utils::with_timeout("store.get", Duration::from_secs(2), store.get("id")).await?;
/// # let _ = record;
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Operation timed out");
            Err(KeymintError::timeout(operation, limit.as_millis() as u64))
        }
    }
}

/// Like [`with_timeout`] for the infallible authorization checks: an elapsed
/// deadline counts as the failure value `T::default()` (`false`, `None`).
pub async fn or_default_within<T, F>(operation: &str, limit: Duration, future: F) -> T
where
    T: Default,
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(value) => value,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Check timed out; denying");
            T::default()
        }
    }
}
