//! # Configuration Settings
//!
//! Defines the configuration structure for the keymint core: which certificate
//! store to open, which identity provider to use and how to log.

use crate::errors::{KeymintError, Result};
use crate::secrets::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Prefix for environment overrides, e.g. `KEYMINT__DATABASE__URL`.
pub const ENV_PREFIX: &str = "KEYMINT";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Certificate store configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Identity provider configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Logging and metrics configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// Later sources win: file values override defaults and `KEYMINT__*`
    /// variables override the file. Missing keys fall back to `Default`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let app_config: AppConfig = builder.build()?.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(KeymintError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        self.database.backend()?;

        if !self.auth.provider.is_empty() {
            if !crate::auth::SUPPORTED_PROVIDERS.contains(&self.auth.provider.as_str()) {
                return Err(KeymintError::config(format!(
                    "Unknown auth provider '{}': expected one of {}",
                    self.auth.provider,
                    crate::auth::SUPPORTED_PROVIDERS.join(", ")
                )));
            }
            url::Url::parse(&self.auth.oauth_callback_url).map_err(|e| {
                KeymintError::config_with_source(
                    format!("Invalid OAuth callback URL '{}'", self.auth.oauth_callback_url),
                    e,
                )
            })?;
        }

        Ok(())
    }
}

/// Certificate store backend selected from the database URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
    Postgres,
    Mongo,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Postgres => "postgresql",
            StoreBackend::Mongo => "mongodb",
        }
    }

    /// Whether the backend is served by the relational store.
    pub fn is_sql(&self) -> bool {
        matches!(self, StoreBackend::Sqlite | StoreBackend::Postgres)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; the scheme selects the backend
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Apply SQL migrations when the store is opened
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mem://".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Config for a given URL with default pool settings.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Resolve the backend from the URL scheme.
    pub fn backend(&self) -> Result<StoreBackend> {
        let url = self.url.as_str();
        if url == "memory" || url.starts_with("mem://") || url.starts_with("memory://") {
            Ok(StoreBackend::Memory)
        } else if url.starts_with("sqlite:") {
            Ok(StoreBackend::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(StoreBackend::Postgres)
        } else if url.starts_with("mongodb://") || url.starts_with("mongodb+srv://") {
            Ok(StoreBackend::Mongo)
        } else {
            Err(KeymintError::config(format!(
                "Unsupported database URL '{}': expected mem://, sqlite:, postgresql:// or mongodb://",
                sanitize_url(url)
            )))
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AuthConfig {
    /// Provider name (`github`, `google`)
    pub provider: String,

    /// OAuth client id
    pub oauth_client_id: String,

    /// OAuth client secret
    pub oauth_client_secret: SecretString,

    /// Redirect URL registered with the identity service
    pub oauth_callback_url: String,

    /// Provider-specific options, e.g. `organization` for GitHub
    pub provider_opts: HashMap<String, String>,

    /// Upper bound on each identity-service round trip
    #[validate(range(
        min = 1,
        max = 120,
        message = "Request timeout must be between 1 and 120 seconds"
    ))]
    pub request_timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            oauth_client_id: String::new(),
            oauth_client_secret: SecretString::default(),
            oauth_callback_url: String::new(),
            provider_opts: HashMap::new(),
            request_timeout_seconds: 10,
        }
    }
}

impl AuthConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Look up a provider option, treating empty strings as absent.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.provider_opts.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "keymint".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

/// Sanitize a connection URL for logging (remove credentials)
pub fn sanitize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.password().is_some() || !parsed.username().is_empty() => format!(
            "{}://***:***@{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or("unknown"),
            parsed.path()
        ),
        _ => url.to_string(),
    }
}
