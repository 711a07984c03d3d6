//! OAuth tokens returned by `Provider::exchange`.

use chrono::{DateTime, Duration, Utc};

use crate::secrets::SecretString;

/// Expiry imposed when the identity service reports none.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Tokens this close to expiry are already treated as expired.
const EXPIRY_SKEW_SECS: i64 = 10;

/// Credential held by the caller for one issuance flow. Providers never keep
/// tokens.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Usually `bearer`
    pub token_type: String,
    /// Always set; see [`Token::with_lifetime`]
    pub expiry: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: impl Into<SecretString>, expiry: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: "bearer".to_string(),
            expiry,
        }
    }

    /// Build from a token-endpoint `expires_in`. Missing, zero or negative
    /// lifetimes get [`DEFAULT_TOKEN_LIFETIME_SECS`].
    pub fn with_lifetime(
        access_token: impl Into<SecretString>,
        expires_in: Option<i64>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let lifetime = match expires_in {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_TOKEN_LIFETIME_SECS,
        };
        let expiry = issued_at
            .checked_add_signed(Duration::seconds(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(access_token, expiry)
    }

    /// Structural validity: non-empty and not expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expiry
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
