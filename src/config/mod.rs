//! # Configuration Management
//!
//! Immutable configuration injected into stores and providers at construction.
//! Nothing here is global: callers load an [`AppConfig`] once and pass the
//! relevant section down.

pub mod settings;

pub use settings::{
    sanitize_url, AppConfig, AuthConfig, DatabaseConfig, ObservabilityConfig, StoreBackend,
    ENV_PREFIX,
};
