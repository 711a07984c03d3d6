//! Manual migration runner for the SQL certificate stores
//!
//! Connects to a SQLite or PostgreSQL database and runs all pending migrations.
//! Usage: cargo run --bin run_migrations
//!
//! Set KEYMINT_DATABASE_URL to specify the target database (a `.env` file is
//! honoured). Defaults to sqlite://keymint.db

use keymint::config::{sanitize_url, DatabaseConfig, ObservabilityConfig};
use keymint::observability::init_logging;
use keymint::storage::{create_pool, migrations, run_migrations};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_logging(&ObservabilityConfig::default())?;

    let db_config = DatabaseConfig {
        url: std::env::var("KEYMINT_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://keymint.db".to_string()),
        max_connections: 2,
        auto_migrate: false, // We'll do it manually below
        ..Default::default()
    };

    info!(url = %sanitize_url(&db_config.url), "Running database migrations");
    let pool = create_pool(&db_config).await?;

    run_migrations(&pool).await?;

    for migration in migrations::list_applied_migrations(&pool).await? {
        info!(
            version = migration.version,
            description = %migration.description,
            installed_on = %migration.installed_on,
            "Applied migration"
        );
    }
    info!(
        version = migrations::get_migration_version(&pool).await?,
        valid = migrations::validate_migrations(&pool).await?,
        "Migration completed successfully"
    );

    Ok(())
}
