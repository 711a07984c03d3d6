//! Identity provider abstraction.

use async_trait::async_trait;
use tracing::debug;

use crate::auth::{Session, Token};
use crate::errors::{KeymintError, Result};

/// One third-party identity service.
///
/// Implementations hold only immutable configuration and an HTTP client, so
/// a single instance may serve concurrent issuance flows. Every network call
/// is bounded by the client timeout; callers that need a tighter bound can
/// wrap any future in [`crate::utils::with_timeout`].
///
/// `valid` and `username` sit on the authorization decision and never return
/// errors: any failure folds to `false` or `None`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, e.g. `github`.
    fn name(&self) -> &'static str;

    /// Build the authorization URL for `state`. No network I/O.
    fn start_session(&self, state: &str) -> Session;

    /// Trade the redirect's authorization code for a token. The token always
    /// carries a finite expiry.
    async fn exchange(&self, code: &str) -> Result<Token>;

    /// Whether the token is unexpired and its owner passes the provider's
    /// authorization check.
    async fn valid(&self, token: &Token) -> bool;

    /// Canonical username of the token's owner, `None` if it cannot be resolved.
    async fn username(&self, token: &Token) -> Option<String>;

    /// Best-effort revocation at the identity service.
    async fn revoke(&self, token: &Token) -> Result<()>;

    /// Fold `valid` and `username` into one decision. Every failure is
    /// `AuthorizationDenied`; use [`KeymintError::public_message`] before
    /// showing it to the user.
    async fn authorize(&self, token: &Token) -> Result<String> {
        if !self.valid(token).await {
            debug!(provider = self.name(), "Token failed authorization check");
            return Err(KeymintError::denied("authorization check failed"));
        }
        match self.username(token).await {
            Some(username) => Ok(username),
            None => Err(KeymintError::denied("username could not be resolved")),
        }
    }
}
