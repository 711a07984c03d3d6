//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.

use crate::config::{sanitize_url, AppConfig, ObservabilityConfig};
use crate::errors::{KeymintError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create a tracing span for certificate store operations.
///
/// ```rust,ignore
/// let span = store_span!("revoke", key_id = %key_id);
/// ```
#[macro_export]
macro_rules! store_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// (for example from several tests) is not an error; the first subscriber stays.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config)?);
    let installed = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false).compact()).try_init()
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed; keeping existing one");
    }
    Ok(())
}

fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level)).map_err(
        |e| {
            KeymintError::config_with_source(
                format!("Invalid log level '{}'", config.log_level),
                e,
            )
        },
    )
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        database = %sanitize_url(&config.database.url),
        backend = config.database.backend().map(|b| b.as_str()).unwrap_or("unknown"),
        provider = %config.auth.provider,
        metrics_enabled = config.observability.enable_metrics,
        json_logging = config.observability.json_logging,
        "keymint configuration"
    );
}
