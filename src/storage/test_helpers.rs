//! Test databases for in-library tests.
//!
//! SQLite databases live in a temporary directory. PostgreSQL and MongoDB run
//! in Testcontainers and are only compiled with the `postgres_tests` and
//! `mongo_tests` features, since they need a Docker daemon.
//!
//! Each helper owns its resources; keep it alive for the whole test.

use crate::config::DatabaseConfig;
use crate::storage::SqlStore;

/// A migrated SQLite store in a fresh temporary directory.
pub struct TestSqlite {
    pub store: SqlStore,
    _dir: tempfile::TempDir,
}

impl TestSqlite {
    pub async fn new(prefix: &str) -> Self {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .unwrap_or_else(|e| panic!("Failed to create temp dir for {}: {}", prefix, e));
        let url = format!("sqlite://{}", dir.path().join("certs.db").display());

        let config = DatabaseConfig { max_connections: 4, ..DatabaseConfig::with_url(url) };
        let store = SqlStore::connect(&config)
            .await
            .unwrap_or_else(|e| panic!("Failed to open SQLite store for {}: {}", prefix, e));

        Self { store, _dir: dir }
    }
}

/// Stop and remove stale testcontainers from previous runs.
///
/// `ContainerAsync::drop` spawns its cleanup on the runtime, which may already
/// be shutting down when a test ends, so containers can outlive the test
/// binary. Runs at most once per image per test binary.
#[cfg(any(feature = "postgres_tests", feature = "mongo_tests"))]
fn cleanup_stale_testcontainers(image: &'static str) {
    use std::collections::HashSet;
    use std::process::Command;
    use std::sync::Mutex;

    static CLEANED: Mutex<Option<HashSet<&'static str>>> = Mutex::new(None);
    {
        let mut cleaned = CLEANED.lock().unwrap_or_else(|e| e.into_inner());
        if !cleaned.get_or_insert_with(HashSet::new).insert(image) {
            return;
        }
    }

    let ancestor = format!("ancestor={}", image);
    let output = Command::new("docker")
        .args([
            "ps",
            "-q",
            "--filter",
            "label=org.testcontainers.managed-by=testcontainers",
            "--filter",
            ancestor.as_str(),
        ])
        .output();

    let container_ids = match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => return,
    };
    let ids: Vec<&str> = container_ids.lines().collect();
    if ids.is_empty() {
        return;
    }

    eprintln!("[test_helpers] Cleaning up {} stale {} container(s)", ids.len(), image);

    let mut stop_args = vec!["stop", "--time", "5"];
    stop_args.extend(&ids);
    let _ = Command::new("docker").args(&stop_args).output();

    let mut rm_args = vec!["rm", "-f"];
    rm_args.extend(&ids);
    let _ = Command::new("docker").args(&rm_args).output();
}

/// A migrated PostgreSQL store backed by a Testcontainers instance.
#[cfg(feature = "postgres_tests")]
pub struct TestPostgres {
    pub store: SqlStore,
    _container: testcontainers::ContainerAsync<testcontainers_modules::postgres::Postgres>,
}

#[cfg(feature = "postgres_tests")]
impl TestPostgres {
    pub async fn new(prefix: &str) -> Self {
        use testcontainers::runners::AsyncRunner;
        use testcontainers_modules::postgres::Postgres;

        cleanup_stale_testcontainers("postgres");

        let container = Postgres::default().start().await.unwrap_or_else(|e| {
            panic!("Failed to start PostgreSQL container for {}: {}", prefix, e)
        });
        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("Failed to get container host for {}: {}", prefix, e));
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .unwrap_or_else(|e| panic!("Failed to get container port for {}: {}", prefix, e));

        let config = DatabaseConfig {
            max_connections: 5,
            min_connections: 1,
            ..DatabaseConfig::with_url(format!(
                "postgresql://postgres:postgres@{}:{}/postgres",
                host, port
            ))
        };
        let store = SqlStore::connect(&config)
            .await
            .unwrap_or_else(|e| panic!("Failed to open PostgreSQL store for {}: {}", prefix, e));

        Self { store, _container: container }
    }
}

/// A MongoDB store backed by a Testcontainers instance.
#[cfg(feature = "mongo_tests")]
pub struct TestMongo {
    pub store: std::sync::Arc<crate::storage::MongoStore>,
    _container: testcontainers::ContainerAsync<testcontainers_modules::mongo::Mongo>,
}

#[cfg(feature = "mongo_tests")]
impl TestMongo {
    pub async fn new(prefix: &str) -> Self {
        use testcontainers::runners::AsyncRunner;
        use testcontainers_modules::mongo::Mongo;

        cleanup_stale_testcontainers("mongo");

        let container = Mongo::default()
            .start()
            .await
            .unwrap_or_else(|e| panic!("Failed to start MongoDB container for {}: {}", prefix, e));
        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("Failed to get container host for {}: {}", prefix, e));
        let port = container
            .get_host_port_ipv4(27017)
            .await
            .unwrap_or_else(|e| panic!("Failed to get container port for {}: {}", prefix, e));

        let url = format!("mongodb://{}:{}/{}", host, port, prefix);
        let store = crate::storage::MongoStore::connect(&DatabaseConfig::with_url(url))
            .await
            .unwrap_or_else(|e| panic!("Failed to open MongoDB store for {}: {}", prefix, e));

        Self { store: std::sync::Arc::new(store), _container: container }
    }
}
