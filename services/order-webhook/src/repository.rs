//! PostgreSQL-backed historical reads and row persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_risk_engine::{
    Error, HistoricalField, HistoricalSignals, InsertOutcome, OrderBatch, OrderSink, PersistedRow,
    Result,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;
use tracing::debug;

use crate::metrics;

const INSERT_ROW: &str = "INSERT INTO order_line_risk (
        row_id, date, date_time, order_id, order_name,
        customer_name, phone, address1, address2, city, state, zip, country,
        product_id, variant_id, product_name, variant_name, vendor, price, quantity, weight,
        utm_source, utm_medium, utm_campaign, utm_content, utm_term, utm_id, full_url, ip_address,
        store_name, location_match, ip_checked, fraud_bucket, risk_score, recorded_at
    ) VALUES (
        $1, $2, $3, $4, $5,
        $6, $7, $8, $9, $10, $11, $12, $13,
        $14, $15, $16, $17, $18, $19, $20, $21,
        $22, $23, $24, $25, $26, $27, $28, $29,
        $30, $31, $32, $33, $34, $35
    )
    ON CONFLICT (row_id) DO NOTHING";

/// Store over the `order_line_risk` table
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
        row: &PersistedRow,
    ) -> sqlx::Result<u64> {
        let result = sqlx::query(INSERT_ROW)
            .bind(&row.row_id)
            .bind(row.date)
            .bind(row.date_time.with_timezone(&Utc))
            .bind(row.order_id as i64)
            .bind(&row.order_name)
            .bind(&row.customer_name)
            .bind(&row.phone)
            .bind(&row.address1)
            .bind(&row.address2)
            .bind(&row.city)
            .bind(&row.state)
            .bind(&row.zip)
            .bind(&row.country)
            .bind(row.product_id.map(|id| id as i64))
            .bind(row.variant_id.map(|id| id as i64))
            .bind(&row.product_name)
            .bind(&row.variant_name)
            .bind(&row.vendor)
            .bind(row.price)
            .bind(row.quantity as i32)
            .bind(row.weight)
            .bind(&row.utm_source)
            .bind(&row.utm_medium)
            .bind(&row.utm_campaign)
            .bind(&row.utm_content)
            .bind(&row.utm_term)
            .bind(&row.utm_id)
            .bind(&row.full_url)
            .bind(&row.ip_address)
            .bind(&row.store_name)
            .bind(row.location_match)
            .bind(row.ip_checked)
            .bind(row.fraud_bucket.as_str())
            .bind(row.risk_score.value() as i32)
            .bind(row.recorded_at)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}

fn query_error(check: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::HistoricalQuery {
        check,
        message: e.to_string(),
    }
}

fn persistence_error(e: sqlx::Error) -> Error {
    Error::Persistence(e.to_string())
}

#[async_trait]
impl HistoricalSignals for PgOrderStore {
    async fn value_seen(&self, field: HistoricalField, value: &str) -> Result<bool> {
        let start = Instant::now();
        // Column names come from a closed enum, never from input.
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM order_line_risk WHERE {} = $1)",
            field.column()
        );
        let seen: bool = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error(field.column()))?;

        metrics::DB_QUERY_DURATION
            .with_label_values(&["value_seen"])
            .observe(start.elapsed().as_secs_f64());
        Ok(seen)
    }

    async fn rows_recorded_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64> {
        let start = Instant::now();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_line_risk WHERE recorded_at >= $1 AND recorded_at <= $2",
        )
        .bind(since)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("burst"))?;

        metrics::DB_QUERY_DURATION
            .with_label_values(&["rows_recorded_between"])
            .observe(start.elapsed().as_secs_f64());
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl OrderSink for PgOrderStore {
    async fn insert_batch(&self, batch: &OrderBatch) -> Result<InsertOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(persistence_error)?;
        let mut outcome = InsertOutcome::default();

        for row in &batch.rows {
            match Self::insert_row(&mut tx, row).await.map_err(persistence_error)? {
                0 => outcome.already_present += 1,
                _ => outcome.inserted += 1,
            }
        }

        tx.commit().await.map_err(persistence_error)?;
        metrics::DB_QUERY_DURATION
            .with_label_values(&["insert_batch"])
            .observe(start.elapsed().as_secs_f64());

        debug!(
            order_id = batch.order_id,
            inserted = outcome.inserted,
            already_present = outcome.already_present,
            "batch committed"
        );
        Ok(outcome)
    }
}
