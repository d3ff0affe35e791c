use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use keel_core::config::{Backend, DatabaseConfig, MigrationsConfig};
use keel_core::error::{KeelError, Result};

use crate::driver::{Driver, MySqlDriver, PostgresDriver, SqliteDriver};

/// Connection pool for one of the supported backends.
#[derive(Clone)]
pub enum DatabasePool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    pool: DatabasePool,

    /// Configuration.
    config: DatabaseConfig,
}

impl Database {
    /// Create a new database connection from configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let backend = config.backend()?;
        let timeout = Duration::from_secs(config.pool_timeout_secs);

        let pool = match backend {
            Backend::Postgres => DatabasePool::Postgres(
                PgPoolOptions::new()
                    .max_connections(config.pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(connect_error)?,
            ),
            Backend::MySql => DatabasePool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(config.pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(connect_error)?,
            ),
            Backend::Sqlite => {
                DatabasePool::Sqlite(Self::create_sqlite_pool(config, timeout).await?)
            }
        };

        debug!("Connected to {} database", backend);
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// SQLite pool. An in-memory database lives only as long as its connection,
    /// so it gets exactly one that never expires.
    async fn create_sqlite_pool(config: &DatabaseConfig, timeout: Duration) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| KeelError::Config(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);

        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.pool_size)
        };

        pool_options
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .map_err(connect_error)
    }

    pub fn backend(&self) -> Backend {
        match self.pool {
            DatabasePool::Postgres(_) => Backend::Postgres,
            DatabasePool::MySql(_) => Backend::MySql,
            DatabasePool::Sqlite(_) => Backend::Sqlite,
        }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Build the migration driver for this connection's backend.
    pub fn driver(&self, migrations: &MigrationsConfig) -> Result<Arc<dyn Driver>> {
        Ok(match &self.pool {
            DatabasePool::Postgres(pool) => {
                Arc::new(PostgresDriver::new(pool.clone(), migrations)?)
            }
            DatabasePool::MySql(pool) => Arc::new(MySqlDriver::new(pool.clone(), migrations)?),
            DatabasePool::Sqlite(pool) => Arc::new(SqliteDriver::new(pool.clone(), migrations)?),
        })
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        let result = match &self.pool {
            DatabasePool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            DatabasePool::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            DatabasePool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.map_err(|e| KeelError::Database(format!("Health check failed: {}", e)))
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        match &self.pool {
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::MySql(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }
}

fn connect_error(e: sqlx::Error) -> KeelError {
    KeelError::Database(format!("Failed to connect: {}", e))
}
