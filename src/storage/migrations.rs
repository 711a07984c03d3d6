//! # Database Migration Management
//!
//! Schema evolution for the SQL certificate store. Migrations are embedded in
//! the binary and applied in filename order, each inside its own transaction,
//! either when a pool is created with `auto_migrate` or by `run_migrations`.

use crate::errors::{KeymintError, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{error, info, warn};

/// Embedded migrations as `(file stem, sql)`, sorted by version.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20250101000001_create_issued_certs",
        include_str!("../../migrations/20250101000001_create_issued_certs.sql"),
    ),
    (
        "20250101000002_index_revoked_certs",
        include_str!("../../migrations/20250101000002_index_revoked_certs.sql"),
    ),
];

/// Migration information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub version: i64,
    pub description: String,
    pub installed_on: chrono::DateTime<chrono::Utc>,
    pub execution_time: i64,
    pub checksum: String,
}

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Starting database migration process");

    create_migration_table(pool).await?;
    let applied = get_applied_migration_versions(pool).await?;

    let mut migrations_run = 0;
    for (filename, sql) in MIGRATIONS {
        let version = extract_version_from_filename(filename)?;

        if applied.contains(&version) {
            info!(version = version, "Migration already applied: {}", filename);
            continue;
        }

        info!(version = version, "Running migration: {}", filename);
        let start_time = std::time::Instant::now();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| KeymintError::storage(e, "Failed to start migration transaction"))?;

        // raw_sql allows several statements per file
        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
            error!(error = %e, migration = filename, "Migration failed");
            KeymintError::storage(e, format!("Migration failed: {}", filename))
        })?;

        let execution_time = start_time.elapsed().as_millis() as i64;
        let checksum = calculate_checksum(sql);
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO _keymint_migrations (version, description, checksum, execution_time, installed_on) VALUES ($1, $2, $3, $4, $5)"
        )
        .bind(version)
        .bind(*filename)
        .bind(checksum)
        .bind(execution_time)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, migration = filename, "Failed to record migration");
            KeymintError::storage(e, format!("Failed to record migration: {}", filename))
        })?;

        tx.commit()
            .await
            .map_err(|e| KeymintError::storage(e, "Failed to commit migration transaction"))?;

        migrations_run += 1;
        info!(
            version = version,
            execution_time_ms = execution_time,
            "Migration completed: {}",
            filename
        );
    }

    if migrations_run > 0 {
        info!(count = migrations_run, "Database migrations completed");
    } else {
        info!("No pending migrations");
    }

    Ok(())
}

/// Create the migration tracking table
async fn create_migration_table(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _keymint_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            checksum TEXT NOT NULL,
            execution_time BIGINT NOT NULL,
            installed_on BIGINT NOT NULL
        )
    "#,
    )
    .execute(pool)
    .await
    .map_err(|e| KeymintError::storage(e, "Failed to create migration tracking table"))?;

    Ok(())
}

/// Postgres says "does not exist", SQLite says "no such table".
fn is_missing_table(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            message.contains("_keymint_migrations")
                && (message.contains("does not exist") || message.contains("no such table"))
        }
        _ => false,
    }
}

/// Get list of applied migration versions
async fn get_applied_migration_versions(pool: &DbPool) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT version FROM _keymint_migrations ORDER BY version")
        .fetch_all(pool)
        .await;

    match rows {
        Ok(rows) => rows
            .into_iter()
            .map(|row| row.try_get::<i64, _>("version").map_err(KeymintError::from))
            .collect(),
        Err(e) if is_missing_table(&e) => Ok(Vec::new()),
        Err(e) => Err(KeymintError::storage(e, "Failed to get applied migrations")),
    }
}

/// Extract version number from migration filename
fn extract_version_from_filename(filename: &str) -> Result<i64> {
    let version_str = filename.split('_').next().ok_or_else(|| {
        KeymintError::validation(format!("Invalid migration filename: {}", filename))
    })?;

    version_str
        .parse::<i64>()
        .map_err(|_| KeymintError::validation(format!("Invalid version in filename: {}", filename)))
}

/// Hex SHA-256 of the migration content
fn calculate_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Validate that all migrations are applied and unmodified
pub async fn validate_migrations(pool: &DbPool) -> Result<bool> {
    info!("Validating migration integrity");

    let applied = list_applied_migrations(pool).await?;

    for (filename, sql) in MIGRATIONS {
        let expected = extract_version_from_filename(filename)?;
        match applied.iter().find(|m| m.version == expected) {
            None => {
                warn!(version = expected, "Missing migration");
                return Ok(false);
            }
            Some(migration) if migration.checksum != calculate_checksum(sql) => {
                warn!(version = expected, "Migration checksum mismatch");
                return Ok(false);
            }
            Some(_) => {}
        }
    }

    for migration in &applied {
        let known = MIGRATIONS.iter().any(|(filename, _)| {
            extract_version_from_filename(filename).is_ok_and(|v| v == migration.version)
        });
        if !known {
            warn!(version = migration.version, "Unexpected migration found");
            return Ok(false);
        }
    }

    info!("Migration validation successful");
    Ok(true)
}

/// Get the current migration version (highest applied)
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let applied = get_applied_migration_versions(pool).await?;
    Ok(applied.into_iter().max().unwrap_or(0))
}

/// List all applied migrations
pub async fn list_applied_migrations(pool: &DbPool) -> Result<Vec<MigrationInfo>> {
    let rows = sqlx::query(
        "SELECT version, description, checksum, execution_time, installed_on FROM _keymint_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await;

    let rows = match rows {
        Ok(rows) => rows,
        Err(e) if is_missing_table(&e) => return Ok(Vec::new()),
        Err(e) => return Err(KeymintError::storage(e, "Failed to list applied migrations")),
    };

    rows.into_iter()
        .map(|row| -> Result<MigrationInfo> {
            let installed_on: i64 = row.try_get("installed_on")?;
            Ok(MigrationInfo {
                version: row.try_get("version")?,
                description: row.try_get("description")?,
                installed_on: chrono::DateTime::from_timestamp(installed_on, 0).unwrap_or_default(),
                execution_time: row.try_get("execution_time")?,
                checksum: row.try_get("checksum")?,
            })
        })
        .collect()
}
