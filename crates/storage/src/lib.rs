mod conversations;
mod migrations;
mod reports;

pub use conversations::SessionSummary;
pub use reports::{NewsRow, ReportFilter, ReportPage};

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("record {0} not found")]
    NotFound(i64),
}

/// SQLite-backed persistence for reports, news intel, conversations,
/// auth config and stored backtest results.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect and run idempotent migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Store { pool };
        migrations::run(&store.pool).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run `f` inside a transaction: committed on Ok, rolled back on Err.
    /// The transaction handle is always released.
    pub async fn in_tx<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(
            &'c mut sqlx::Transaction<'static, sqlx::Sqlite>,
        ) -> futures_util::future::BoxFuture<'c, Result<T, StoreError>>,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    // -- Auth config ---------------------------------------------------

    pub async fn get_auth_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM auth_config WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_auth_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO auth_config (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Backtest results ----------------------------------------------

    pub async fn save_backtest_result(
        &self,
        ticker: &str,
        engine_version: &str,
        result_json: &str,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO backtest_results (ticker, engine_version, result_json)
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(ticker)
        .bind(engine_version)
        .bind(result_json)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn list_backtest_results(
        &self,
        ticker: &str,
    ) -> Result<Vec<(i64, String, String)>, StoreError> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT id, engine_version, result_json FROM backtest_results
             WHERE ticker = ? ORDER BY id DESC",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
