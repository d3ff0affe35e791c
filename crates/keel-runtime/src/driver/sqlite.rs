use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::debug;

use keel_core::config::MigrationsConfig;
use keel_core::error::Result;
use keel_core::migration::LedgerEntry;

use super::{ledger_error, not_recorded, record_error, Driver, DriverFuture};
use crate::migrations::{split_sql_statements, Dialect};

/// SQLite backend.
pub struct SqliteDriver {
    pool: SqlitePool,
    table: String,
    extension: String,
}

impl SqliteDriver {
    pub fn new(pool: SqlitePool, config: &MigrationsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            table: config.table.clone(),
            extension: config.extension.clone(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("no such table"),
        _ => false,
    }
}

impl Driver for SqliteDriver {
    fn backend(&self) -> &'static str {
        "sqlite"
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
            // AUTOINCREMENT keeps the counter in sqlite_sequence, which is what
            // record_reverted reseeds.
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name VARCHAR(191) NOT NULL UNIQUE,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
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
            let rows: Vec<(i64, String, NaiveDateTime)> = sqlx::query_as(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ledger_error("read ledger", e))?;

            Ok(rows
                .into_iter()
                .map(|(id, name, applied_at)| LedgerEntry {
                    id,
                    name,
                    applied_at: applied_at.and_utc(),
                })
                .collect())
        })
    }

    fn execute<'a>(&'a self, script: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for statement in split_sql_statements(script, Dialect::Standard) {
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
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| ledger_error("start ledger transaction", e))?;

            let delete = format!("DELETE FROM {} WHERE name = ?", self.table);
            let removed = sqlx::query(&delete)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(|e| ledger_error("remove ledger entry", e))?;
            if removed.rows_affected() == 0 {
                return Err(not_recorded(name));
            }

            // sqlite_sequence holds the last id handed out; next insert gets seq + 1.
            let reseed = format!(
                "UPDATE sqlite_sequence SET seq = COALESCE((SELECT MAX(id) FROM {table}), 0) \
                 WHERE name = ?",
                table = self.table
            );
            sqlx::query(&reseed)
                .bind(&self.table)
                .execute(&mut *tx)
                .await
                .map_err(|e| ledger_error("reseed ledger id", e))?;

            tx.commit()
                .await
                .map_err(|e| ledger_error("commit ledger removal", e))?;
            Ok(())
        })
    }
}
