//! # GitHub Provider
//!
//! OAuth against GitHub (or GitHub Enterprise through
//! [`GithubProvider::with_endpoints`]), gated on membership of one
//! organization.
//!
//! GitHub user tokens carry no expiry and cannot be revoked through the API
//! with user credentials, so:
//! - `exchange` imposes a one hour expiry when GitHub reports none
//! - `revoke` is a no-op; the imposed expiry is the effective revocation
//! - `valid` re-checks organization membership on every call, so a user
//!   removed from the organization is rejected while the token is unexpired

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::oauth::{parse_url, OAuthClient, OAuthEndpoints};
use crate::auth::{Provider, Session, Token};
use crate::config::AuthConfig;
use crate::errors::{KeymintError, Result};
use crate::observability::record_provider_check;

pub const NAME: &str = "github";

const SCOPES: &[&str] = &["user", "read:org"];
const API_ACCEPT: &str = "application/vnd.github+json";

/// Endpoint set for github.com or a GitHub Enterprise instance.
#[derive(Debug, Clone)]
pub struct GithubEndpoints {
    pub oauth: OAuthEndpoints,
    /// REST API root, e.g. `https://api.github.com/`
    pub api_base: Url,
}

impl GithubEndpoints {
    pub fn new(auth_url: &str, token_url: &str, api_base: &str) -> Result<Self> {
        Ok(Self {
            oauth: OAuthEndpoints::parse(auth_url, token_url)?,
            api_base: parse_url("API", api_base)?,
        })
    }

    /// Endpoints of github.com.
    pub fn github_com() -> Result<Self> {
        Self::new(
            "https://github.com/login/oauth/authorize",
            "https://github.com/login/oauth/access_token",
            "https://api.github.com/",
        )
    }
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug)]
pub struct GithubProvider {
    oauth: OAuthClient,
    organization: String,
    api_base: Url,
}

impl GithubProvider {
    /// Requires a non-empty `organization` provider option.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        Self::with_endpoints(config, GithubEndpoints::github_com()?)
    }

    pub fn with_endpoints(config: &AuthConfig, endpoints: GithubEndpoints) -> Result<Self> {
        let organization = config
            .option("organization")
            .ok_or_else(|| KeymintError::config("github organization must not be empty"))?
            .to_string();
        let oauth = OAuthClient::new(config, endpoints.oauth, SCOPES)?;

        Ok(Self { oauth, organization, api_base: endpoints.api_base })
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                KeymintError::config(format!("GitHub API base '{}' cannot hold a path", self.api_base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn api_get(&self, url: Url, token: &Token) -> reqwest::RequestBuilder {
        self.oauth
            .http()
            .get(url)
            .bearer_auth(token.access_token.expose_secret())
            .header(header::ACCEPT, API_ACCEPT)
    }

    async fn fetch_login(&self, token: &Token) -> Result<String> {
        let response = self
            .api_get(self.api_url(&["user"])?, token)
            .send()
            .await
            .map_err(|e| KeymintError::transport("GitHub user lookup failed", e))?
            .error_for_status()
            .map_err(|e| KeymintError::transport("GitHub user lookup rejected", e))?;

        let user: GithubUser = response
            .json()
            .await
            .map_err(|e| KeymintError::transport("GitHub user response unreadable", e))?;
        if user.login.is_empty() {
            return Err(KeymintError::internal("GitHub returned an empty login"));
        }
        Ok(user.login)
    }

    /// Only 204 means member; GitHub answers 404 or redirects otherwise.
    async fn is_member(&self, login: &str, token: &Token) -> Result<bool> {
        let url = self.api_url(&["orgs", self.organization.as_str(), "members", login])?;
        let response = self
            .api_get(url, token)
            .send()
            .await
            .map_err(|e| KeymintError::transport("GitHub membership check failed", e))?;
        Ok(response.status() == StatusCode::NO_CONTENT)
    }
}

#[async_trait]
impl Provider for GithubProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start_session(&self, state: &str) -> Session {
        Session { auth_url: self.oauth.authorize_url(state, &[]), state: state.to_string() }
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn exchange(&self, code: &str) -> Result<Token> {
        let result = self.oauth.exchange(code).await;
        record_provider_check(NAME, "exchange", if result.is_ok() { "ok" } else { "error" });
        result
    }

    #[instrument(skip_all, fields(provider = NAME, organization = %self.organization))]
    async fn valid(&self, token: &Token) -> bool {
        if !token.is_valid() {
            record_provider_check(NAME, "valid", "expired");
            return false;
        }

        let login = match self.fetch_login(token).await {
            Ok(login) => login,
            Err(e) => {
                warn!(error = %e, "Could not resolve GitHub user; denying");
                record_provider_check(NAME, "valid", "error");
                return false;
            }
        };

        match self.is_member(&login, token).await {
            Ok(true) => {
                record_provider_check(NAME, "valid", "allowed");
                true
            }
            Ok(false) => {
                debug!(%login, "User is not an organization member");
                record_provider_check(NAME, "valid", "denied");
                false
            }
            Err(e) => {
                warn!(error = %e, %login, "Membership check failed; denying");
                record_provider_check(NAME, "valid", "error");
                false
            }
        }
    }

    #[instrument(skip_all, fields(provider = NAME))]
    async fn username(&self, token: &Token) -> Option<String> {
        match self.fetch_login(token).await {
            Ok(login) => {
                record_provider_check(NAME, "username", "resolved");
                Some(login)
            }
            Err(e) => {
                warn!(error = %e, "Could not resolve GitHub username");
                record_provider_check(NAME, "username", "error");
                None
            }
        }
    }

    /// GitHub offers no user-credential token revocation.
    async fn revoke(&self, _token: &Token) -> Result<()> {
        Ok(())
    }
}
