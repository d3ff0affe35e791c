use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::MySqlPool;
use tracing::debug;

use keel_core::config::MigrationsConfig;
use keel_core::error::Result;
use keel_core::migration::LedgerEntry;

use super::{ledger_error, not_recorded, record_error, Driver, DriverFuture};
use crate::migrations::{split_sql_statements, Dialect};

/// SQLSTATE and error number for "table doesn't exist".
const NO_SUCH_TABLE_STATE: &str = "42S02";
const ER_NO_SUCH_TABLE: u16 = 1146;

/// MySQL / MariaDB backend.
///
/// DDL statements commit implicitly in MySQL, so a failing script may leave
/// the statements before the failing one applied.
pub struct MySqlDriver {
    pool: MySqlPool,
    table: String,
    extension: String,
}

impl MySqlDriver {
    pub fn new(pool: MySqlPool, config: &MigrationsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            table: config.table.clone(),
            extension: config.extension.clone(),
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn latest_id(&self) -> Result<Option<u32>> {
        let sql = format!("SELECT id FROM {} ORDER BY id DESC LIMIT 1", self.table);
        sqlx::query_scalar::<_, u32>(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ledger_error("read latest ledger id", e))
    }
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(NO_SUCH_TABLE_STATE)
                || db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .is_some_and(|e| e.number() == ER_NO_SUCH_TABLE)
        }
        _ => false,
    }
}

impl Driver for MySqlDriver {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    fn extension(&self) -> String {
        format!(".{}", self.extension)
    }

    fn table_exists(&self) -> DriverFuture<'_, bool> {
        Box::pin(async move {
            let sql = format!("SELECT 1 FROM {} LIMIT 1", self.table);
            match sqlx::query(&sql).fetch_optional(&self.pool).await {
                Ok(_) => Ok(true),
                Err(e) if is_missing_table(&e) => {
                    debug!("Ledger table {} does not exist yet", self.table);
                    Ok(false)
                }
                Err(e) => Err(ledger_error("check ledger table", e)),
            }
        })
    }

    fn create_table(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id INT UNSIGNED NOT NULL AUTO_INCREMENT,
                    name VARCHAR(191) NOT NULL,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    UNIQUE KEY (name),
                    PRIMARY KEY (id)
                )
                "#,
                self.table
            );
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| ledger_error("create ledger table", e))?;
            Ok(())
        })
    }

    fn status(&self) -> DriverFuture<'_, Option<String>> {
        Box::pin(async move {
            let sql = format!("SELECT name FROM {} ORDER BY id DESC LIMIT 1", self.table);
            sqlx::query_scalar::<_, String>(&sql)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ledger_error("read latest migration", e))
        })
    }

    fn entries(&self) -> DriverFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT id, name, created_at FROM {} ORDER BY id ASC",
                self.table
            );
            let rows: Vec<(u32, String, DateTime<Utc>)> = sqlx::query_as(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ledger_error("read ledger", e))?;

            Ok(rows
                .into_iter()
                .map(|(id, name, applied_at)| LedgerEntry {
                    id: i64::from(id),
                    name,
                    applied_at,
                })
                .collect())
        })
    }

    fn execute<'a>(&'a self, script: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for statement in split_sql_statements(script, Dialect::MySql) {
                sqlx::Executor::execute(&mut *tx, statement.as_str()).await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn record_applied<'a>(&'a self, name: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let sql = format!("INSERT INTO {} (name) VALUES (?)", self.table);
            sqlx::query(&sql)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(|e| record_error(name, e))?;
            Ok(())
        })
    }

    fn record_reverted<'a>(&'a self, name: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let delete = format!("DELETE FROM {} WHERE name = ? LIMIT 1", self.table);
            let removed = sqlx::query(&delete)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(|e| ledger_error("remove ledger entry", e))?;
            if removed.rows_affected() == 0 {
                return Err(not_recorded(name));
            }

            let next_id = self.latest_id().await?.map_or(1, |id| u64::from(id) + 1);

            // ALTER TABLE takes no bind parameters; next_id is numeric. An unbound
            // query goes over the text protocol.
            let reseed = format!("ALTER TABLE {} AUTO_INCREMENT = {}", self.table, next_id);
            sqlx::Executor::execute(&self.pool, reseed.as_str())
                .await
                .map_err(|e| ledger_error("reseed ledger id", e))?;
            Ok(())
        })
    }
}
