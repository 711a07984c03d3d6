//! # Identity Providers
//!
//! OAuth2 authorization-code login against third-party identity services and
//! the authorization check that decides whether the user may be issued a
//! certificate.
//!
//! ## Flow
//!
//! 1. [`Provider::start_session`] with a fresh [`Session::generate_state`] nonce
//! 2. the user's browser visits `auth_url` and is redirected back with `code` and `state`
//! 3. the caller checks [`Session::matches_state`] and calls [`Provider::exchange`]
//! 4. [`Provider::authorize`] yields the username to put on the certificate

pub mod github;
pub mod google;
pub mod oauth;
pub mod provider;
pub mod session;
pub mod token;

use std::sync::Arc;

pub use github::{GithubEndpoints, GithubProvider};
pub use google::{GoogleEndpoints, GoogleProvider};
pub use oauth::{OAuthClient, OAuthEndpoints};
pub use provider::Provider;
pub use session::Session;
pub use token::{Token, DEFAULT_TOKEN_LIFETIME_SECS};

use crate::config::AuthConfig;
use crate::errors::{KeymintError, Result};

/// Provider names accepted in `auth.provider`.
pub const SUPPORTED_PROVIDERS: &[&str] = &[github::NAME, google::NAME];

/// Build the provider named in `config.provider`.
pub fn new_provider(config: &AuthConfig) -> Result<Arc<dyn Provider>> {
    match config.provider.as_str() {
        github::NAME => Ok(Arc::new(GithubProvider::new(config)?)),
        google::NAME => Ok(Arc::new(GoogleProvider::new(config)?)),
        other => Err(KeymintError::config(format!(
            "Unknown auth provider '{}' (supported: {})",
            other,
            SUPPORTED_PROVIDERS.join(", ")
        ))),
    }
}
