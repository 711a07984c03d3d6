//! # OAuth2 Authorization-Code Client
//!
//! The shared half of every provider: building the authorization URL and
//! trading a code for a token at the identity service's token endpoint.
//! Provider-specific API calls reuse [`OAuthClient::http`].

use chrono::Utc;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::Token;
use crate::config::AuthConfig;
use crate::errors::{KeymintError, Result};
use crate::secrets::SecretString;

/// User agent sent on every identity-service request; GitHub rejects requests without one.
pub const USER_AGENT: &str = concat!("keymint/", env!("CARGO_PKG_VERSION"));

/// Authorization and token endpoints of one identity service.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub auth_url: Url,
    pub token_url: Url,
}

impl OAuthEndpoints {
    pub fn parse(auth_url: &str, token_url: &str) -> Result<Self> {
        Ok(Self { auth_url: parse_url("authorization", auth_url)?, token_url: parse_url("token", token_url)? })
    }
}

pub(crate) fn parse_url(kind: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| {
        KeymintError::config_with_source(format!("Invalid {} endpoint '{}'", kind, value), e)
    })
}

/// Token endpoint response. Some services answer 200 with an `error` field.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: SecretString,
    redirect_url: Url,
    scopes: Vec<String>,
    endpoints: OAuthEndpoints,
    http: Client,
}

impl OAuthClient {
    /// Build from provider configuration. Missing client id or an unparseable
    /// callback URL is a configuration error.
    pub fn new(config: &AuthConfig, endpoints: OAuthEndpoints, scopes: &[&str]) -> Result<Self> {
        if config.oauth_client_id.is_empty() {
            return Err(KeymintError::config("oauth_client_id must not be empty"));
        }
        let redirect_url = Url::parse(&config.oauth_callback_url).map_err(|e| {
            KeymintError::config_with_source(
                format!("Invalid OAuth callback URL '{}'", config.oauth_callback_url),
                e,
            )
        })?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| KeymintError::config_with_source("Failed to create HTTP client", e))?;

        Ok(Self {
            client_id: config.oauth_client_id.clone(),
            client_secret: config.oauth_client_secret.clone(),
            redirect_url,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            endpoints,
            http,
        })
    }

    /// HTTP client configured with the request timeout and user agent.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Authorization URL with `state` and any provider-specific parameters.
    pub fn authorize_url(&self, state: &str, extra: &[(&str, &str)]) -> String {
        let mut url = self.endpoints.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_url.as_str())
                .append_pair("state", state);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        url.to_string()
    }

    /// Trade an authorization code for a token.
    #[instrument(skip(self, code), fields(token_url = %self.endpoints.token_url))]
    pub async fn exchange(&self, code: &str) -> Result<Token> {
        if code.is_empty() {
            return Err(KeymintError::exchange("authorization code is empty"));
        }

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .header(header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| KeymintError::exchange_with_source("token endpoint unreachable", e))?;

        let status = response.status();
        let body: TokenResponse = response.json().await.map_err(|e| {
            KeymintError::exchange_with_source(
                format!("unreadable token response (HTTP {})", status.as_u16()),
                e,
            )
        })?;

        if let Some(error) = body.error {
            let description = body.error_description.unwrap_or_default();
            debug!(%error, %description, "Token endpoint rejected the code");
            return Err(KeymintError::exchange(format!("{}: {}", error, description)));
        }
        if !status.is_success() {
            return Err(KeymintError::exchange(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KeymintError::exchange("token response has no access_token"))?;

        let mut token = Token::with_lifetime(access_token, body.expires_in, Utc::now());
        token.refresh_token = body.refresh_token.map(SecretString::new);
        if let Some(token_type) = body.token_type {
            token.token_type = token_type;
        }
        Ok(token)
    }
}
