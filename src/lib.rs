//! # Keymint
//!
//! Core of a short-lived SSH certificate authority: it authenticates a human
//! through a third-party identity provider, and issues and tracks revocable
//! SSH certificates bound to that identity.
//!
//! ## Architecture
//!
//! ```text
//! HTTP layer (external) → Provider → signer (external) → CertStorer
//!                            ↓                               ↓
//!                   GitHub / Google OAuth        Memory / SQLite / PostgreSQL / MongoDB
//! ```
//!
//! ## Core Components
//!
//! - **Certificate stores**: [`CertStorer`] with interchangeable backends chosen
//!   from the database URL by [`open_store`]
//! - **Identity providers**: [`Provider`] for the OAuth handshake and the
//!   fail-closed authorization check, built by [`new_provider`]
//! - **Revocation**: [`RevocationList`] renders revoked certificates for SSH hosts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use keymint::{config::AppConfig, new_provider, open_store, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let store = open_store(&config.database).await?;
//!     let provider = new_provider(&config.auth)?;
//!
//!     let session = provider.start_session(&keymint::Session::generate_state());
//!     println!("login at {}", session.auth_url);
//!
//!     let revoked = keymint::RevocationList::load(store.as_ref()).await?;
//!     println!("{}", revoked.to_revoked_keys_file()?);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod storage;
pub mod utils;

// Re-export commonly used types and traits
pub use auth::{new_provider, Provider, Session, Token};
pub use config::AppConfig;
pub use errors::{KeymintError, Result};
pub use storage::{open_store, CertRecord, CertStorer, RevocationList};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
