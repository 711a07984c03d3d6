//! Google OAuth provider gated on a Google Workspace hosted domain.
//!
//! The `domain` option is sent as the `hd` hint when the session starts and
//! is enforced in `valid` against the userinfo `hd` claim together with
//! `email_verified`. The username is the local part of the verified email.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::oauth::{parse_url, OAuthClient, OAuthEndpoints};
use crate::auth::{Provider, Session, Token};
use crate::config::AuthConfig;
use crate::errors::{KeymintError, Result};
use crate::observability::record_provider_check;

pub const NAME: &str = "google";

const SCOPES: &[&str] = &["openid", "email", "profile"];

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub oauth: OAuthEndpoints,
    pub userinfo_url: Url,
    pub revoke_url: Url,
}

impl GoogleEndpoints {
    pub fn new(auth_url: &str, token_url: &str, userinfo_url: &str, revoke_url: &str) -> Result<Self> {
        Ok(Self {
            oauth: OAuthEndpoints::parse(auth_url, token_url)?,
            userinfo_url: parse_url("userinfo", userinfo_url)?,
            revoke_url: parse_url("revocation", revoke_url)?,
        })
    }

    pub fn google_com() -> Result<Self> {
        Self::new(
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            "https://openidconnect.googleapis.com/v1/userinfo",
            "https://oauth2.googleapis.com/revoke",
        )
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    hd: Option<String>,
}

#[derive(Debug)]
pub struct GoogleProvider {
    oauth: OAuthClient,
    domain: String,
    userinfo_url: Url,
    revoke_url: Url,
}

impl GoogleProvider {
    /// Requires a non-empty `domain` provider option.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        Self::with_endpoints(config, GoogleEndpoints::google_com()?)
    }

    pub fn with_endpoints(config: &AuthConfig, endpoints: GoogleEndpoints) -> Result<Self> {
        let domain = config
            .option("domain")
            .ok_or_else(|| KeymintError::config("google domain must not be empty"))?
            .to_ascii_lowercase();
        let oauth = OAuthClient::new(config, endpoints.oauth, SCOPES)?;

        Ok(Self {
            oauth,
            domain,
            userinfo_url: endpoints.userinfo_url,
            revoke_url: endpoints.revoke_url,
        })
    }

    async fn userinfo(&self, token: &Token) -> Result<UserInfo> {
        self.oauth
            .http()
            .get(self.userinfo_url.clone())
            .bearer_auth(token.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| KeymintError::transport("Google userinfo request failed", e))?
            .error_for_status()
            .map_err(|e| KeymintError::transport("Google userinfo rejected", e))?
            .json()
            .await
            .map_err(|e| KeymintError::transport("Google userinfo unreadable", e))
    }

    fn in_domain(&self, info: &UserInfo) -> bool {
        info.email_verified
            && info.hd.as_deref().is_some_and(|hd| hd.eq_ignore_ascii_case(&self.domain))
    }
}

/// Local part of an address, `None` for anything that is not `local@domain`.
fn local_part(email: &str) -> Option<&str> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Some(local),
        _ => None,
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start_session(&self, state: &str) -> Session {
        Session {
            auth_url: self.oauth.authorize_url(state, &[("hd", self.domain.as_str())]),
            state: state.to_string(),
        }
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn exchange(&self, code: &str) -> Result<Token> {
        let result = self.oauth.exchange(code).await;
        record_provider_check(NAME, "exchange", if result.is_ok() { "ok" } else { "error" });
        result
    }

    #[instrument(skip_all, fields(provider = NAME, domain = %self.domain))]
    async fn valid(&self, token: &Token) -> bool {
        if !token.is_valid() {
            record_provider_check(NAME, "valid", "expired");
            return false;
        }

        match self.userinfo(token).await {
            Ok(info) if self.in_domain(&info) => {
                record_provider_check(NAME, "valid", "allowed");
                true
            }
            Ok(info) => {
                debug!(hd = ?info.hd, verified = info.email_verified, "Account outside hosted domain");
                record_provider_check(NAME, "valid", "denied");
                false
            }
            Err(e) => {
                warn!(error = %e, "Google userinfo lookup failed; denying");
                record_provider_check(NAME, "valid", "error");
                false
            }
        }
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn username(&self, token: &Token) -> Option<String> {
        let info = match self.userinfo(token).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Could not resolve Google username");
                record_provider_check(NAME, "username", "error");
                return None;
            }
        };

        let username = info.email.as_deref().and_then(local_part).map(str::to_string);
        record_provider_check(
            NAME,
            "username",
            if username.is_some() { "resolved" } else { "error" },
        );
        username
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn revoke(&self, token: &Token) -> Result<()> {
        self.oauth
            .http()
            .post(self.revoke_url.clone())
            .form(&[("token", token.access_token.expose_secret())])
            .send()
            .await
            .map_err(|e| KeymintError::transport("Google token revocation failed", e))?
            .error_for_status()
            .map_err(|e| KeymintError::transport("Google token revocation rejected", e))?;
        Ok(())
    }
}
