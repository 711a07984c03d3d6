//! # Database Connection Pool Management
//!
//! Builds the sqlx connection pool shared by the SQL certificate store and the
//! migration runner. SQLite and PostgreSQL are both served through the `Any`
//! driver so one set of queries covers both.

use crate::config::{sanitize_url, DatabaseConfig, StoreBackend};
use crate::errors::{KeymintError, Result};
use sqlx::{any::AnyPoolOptions, AnyPool};
use std::time::Duration;

/// Type alias for the database connection pool
pub type DbPool = AnyPool;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let backend = validate_config(config)?;
    sqlx::any::install_default_drivers();

    let in_memory = is_sqlite_memory(&config.url);
    let url = connection_url(&config.url, backend);

    let pool_options = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(true);

    // Each connection to `sqlite::memory:` opens a private database, so the
    // pool must hold exactly one connection that is never recycled.
    let pool_options = if in_memory {
        pool_options.max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        pool_options.idle_timeout(config.idle_timeout())
    };

    let pool_options = if backend == StoreBackend::Sqlite {
        pool_options.after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("PRAGMA busy_timeout = {}", SQLITE_BUSY_TIMEOUT.as_millis()))
                    .execute(&mut *conn)
                    .await?;
                if !in_memory {
                    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
    } else {
        pool_options
    };

    let pool = pool_options.connect(&url).await.map_err(|e| {
        tracing::error!(
            error = %e,
            url = %sanitize_url(&config.url),
            "Failed to create database pool"
        );
        KeymintError::config_with_source(
            format!("Failed to connect to database: {}", sanitize_url(&config.url)),
            e,
        )
    })?;

    tracing::info!(
        database_type = backend.as_str(),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_ms = config.connect_timeout().as_millis(),
        idle_timeout_ms = config.idle_timeout().map(|d| d.as_millis()),
        "Database connection pool created"
    );

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Validate database configuration
fn validate_config(config: &DatabaseConfig) -> Result<StoreBackend> {
    if config.max_connections == 0 {
        return Err(KeymintError::validation("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(KeymintError::validation(
            "min_connections cannot be greater than max_connections",
        ));
    }

    if config.url.is_empty() {
        return Err(KeymintError::validation("database URL cannot be empty"));
    }

    let backend = config.backend()?;
    if !backend.is_sql() {
        return Err(KeymintError::config(format!(
            "{} is not a SQL database URL: {}",
            backend.as_str(),
            sanitize_url(&config.url)
        )));
    }

    Ok(backend)
}

fn is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite::memory:") || url.contains("mode=memory")
}

/// File-backed SQLite databases are created on first open.
fn connection_url(url: &str, backend: StoreBackend) -> String {
    if backend != StoreBackend::Sqlite || is_sqlite_memory(url) || url.contains("mode=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}mode=rwc")
}

/// Get pool statistics for monitoring
pub fn get_pool_stats(pool: &DbPool) -> PoolStats {
    PoolStats { size: pool.size(), idle: pool.num_idle() }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections in the pool
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
}

impl PoolStats {
    /// Get the number of active connections
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }

    /// Check if the pool is healthy (has available connections)
    pub fn is_healthy(&self) -> bool {
        self.size > 0
    }
}
