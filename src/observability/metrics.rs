//! # Metrics Collection
//!
//! Counters for store operations and provider decisions. Without an installed
//! recorder every call is a no-op, so library users who do not enable the
//! Prometheus exporter pay nothing.

use crate::config::ObservabilityConfig;
use crate::errors::{KeymintError, Result};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

const STORE_OPERATIONS: &str = "keymint_store_operations_total";
const CERTIFICATES_REVOKED: &str = "keymint_certificates_revoked_total";
const PROVIDER_CHECKS: &str = "keymint_provider_checks_total";

/// Record the outcome of one `CertStorer` call.
pub fn record_store_operation(backend: &'static str, operation: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!(STORE_OPERATIONS, "backend" => backend, "operation" => operation, "outcome" => outcome)
        .increment(1);
}

/// Record a successful revocation.
pub fn record_certificate_revoked(backend: &'static str) {
    counter!(CERTIFICATES_REVOKED, "backend" => backend).increment(1);
}

/// Record an authorization-path decision (`valid`, `username`, `exchange`).
pub fn record_provider_check(provider: &'static str, check: &'static str, outcome: &'static str) {
    counter!(PROVIDER_CHECKS, "provider" => provider, "check" => check, "outcome" => outcome)
        .increment(1);
}

/// Start the Prometheus exporter when metrics are enabled.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let Some(metrics_addr) = config.metrics_bind_address() else {
        warn!("Metrics disabled: no bind address configured");
        return Ok(());
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        KeymintError::config_with_source(
            format!("Invalid metrics bind address '{}'", metrics_addr),
            e,
        )
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            KeymintError::config_with_source("Failed to initialize metrics exporter", e)
        })?;

    describe_counter!(STORE_OPERATIONS, "Certificate store operations by backend and outcome");
    describe_counter!(CERTIFICATES_REVOKED, "Certificates revoked");
    describe_counter!(PROVIDER_CHECKS, "Identity provider decisions by check and outcome");

    info!(metrics_addr = %metrics_addr, "Prometheus metrics exporter started");
    Ok(())
}
