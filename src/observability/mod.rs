//! # Observability Infrastructure
//!
//! Structured logging and metrics for the certificate stores and identity
//! providers.

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, log_config_info};
pub use self::metrics::{
    init_metrics, record_certificate_revoked, record_provider_check, record_store_operation,
};

use crate::config::ObservabilityConfig;
use crate::errors::Result;

/// Initialize logging and, when enabled, the metrics exporter.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    init_metrics(config)?;

    ::tracing::info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );
    Ok(())
}
