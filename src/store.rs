use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{ObservationStatus, PriceObservation};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Append-only time-series store for price observations.
///
/// Writes happen inside a transaction so a crash mid-insert never leaves a
/// partial row visible. Rows are never updated; `prune` is the only
/// deletion path and is driven by age alone.
#[derive(Clone)]
pub struct PriceStore {
    pool: SqlitePool,
}

impl PriceStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(database_url, "price store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_name TEXT NOT NULL,
                url TEXT NOT NULL,
                price TEXT NULL,
                target_price TEXT NOT NULL,
                observed_at TIMESTAMP NOT NULL,
                status TEXT NOT NULL,
                error_detail TEXT NULL,
                CONSTRAINT chk_ok_has_price
                    CHECK ((status = 'ok') = (price IS NOT NULL))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_product_time
             ON observations (product_name, observed_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_time
             ON observations (observed_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(write_failed)?;

        Ok(())
    }

    /// Append one observation. The row becomes visible only after commit;
    /// on any failure the transaction rolls back completely.
    pub async fn insert(&self, observation: &PriceObservation) -> Result<i64, StorageError> {
        if !observation.invariant_holds() {
            return Err(StorageError::WriteFailed(format!(
                "status {} is inconsistent with price {:?}",
                observation.status.as_str(),
                observation.price,
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO observations
                (product_name, url, price, target_price, observed_at, status, error_detail)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&observation.product_name)
        .bind(&observation.url)
        .bind(observation.price.map(|p| p.to_string()))
        .bind(observation.target_price.to_string())
        .bind(observation.observed_at)
        .bind(observation.status.as_str())
        .bind(&observation.error_detail)
        .execute(&mut *tx)
        .await
        .map_err(write_failed)?;

        tx.commit().await.map_err(write_failed)?;

        let id = result.last_insert_rowid();
        debug!(
            product = observation.product_name.as_str(),
            id, "observation stored"
        );
        Ok(id)
    }

    /// Most recent observation for a product, if any.
    pub async fn latest(&self, product_name: &str) -> Result<Option<PriceObservation>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM observations
             WHERE product_name = ?
             ORDER BY observed_at DESC, id DESC
             LIMIT 1",
        )
        .bind(product_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.as_ref().map(row_to_observation).transpose()
    }

    /// Observations for a product within `[since, until]`, ascending by
    /// observation time. An empty range yields an empty vector.
    pub async fn history(
        &self,
        product_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM observations
             WHERE product_name = ? AND observed_at >= ? AND observed_at <= ?
             ORDER BY observed_at ASC, id ASC",
        )
        .bind(product_name)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(row_to_observation).collect()
    }

    /// Delete observations older than the cutoff. Irreversible; meant to
    /// run outside the alerting path. Returns the number of deleted rows.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM observations WHERE observed_at < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(write_failed)?;

        let deleted = result.rows_affected();
        info!(deleted, cutoff = %older_than, "pruned old observations");
        Ok(deleted)
    }
}

fn write_failed(err: sqlx::Error) -> StorageError {
    StorageError::WriteFailed(err.to_string())
}

fn unavailable(err: sqlx::Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

fn row_to_observation(row: &SqliteRow) -> Result<PriceObservation, StorageError> {
    let decode = |e: sqlx::Error| StorageError::Unavailable(e.to_string());

    let price: Option<String> = row.try_get("price").map_err(decode)?;
    let price = price
        .map(|s| Decimal::from_str(&s))
        .transpose()
        .map_err(|e| StorageError::Unavailable(format!("corrupt price value: {e}")))?;

    let target_price: String = row.try_get("target_price").map_err(decode)?;
    let target_price = Decimal::from_str(&target_price)
        .map_err(|e| StorageError::Unavailable(format!("corrupt target price: {e}")))?;

    let status: ObservationStatus = row.try_get("status").map_err(decode)?;

    Ok(PriceObservation {
        id: Some(row.try_get("id").map_err(decode)?),
        product_name: row.try_get("product_name").map_err(decode)?,
        url: row.try_get("url").map_err(decode)?,
        price,
        target_price,
        observed_at: row.try_get("observed_at").map_err(decode)?,
        status,
        error_detail: row.try_get("error_detail").map_err(decode)?,
    })
}
