use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS order_line_risk (
        row_id TEXT PRIMARY KEY,
        date DATE NOT NULL,
        date_time TIMESTAMPTZ NOT NULL,
        order_id BIGINT NOT NULL,
        order_name TEXT,
        customer_name TEXT,
        phone TEXT,
        address1 TEXT,
        address2 TEXT,
        city TEXT,
        state TEXT,
        zip TEXT,
        country TEXT,
        product_id BIGINT,
        variant_id BIGINT,
        product_name TEXT,
        variant_name TEXT,
        vendor TEXT,
        price NUMERIC,
        quantity INTEGER NOT NULL,
        weight BIGINT,
        utm_source TEXT,
        utm_medium TEXT,
        utm_campaign TEXT,
        utm_content TEXT,
        utm_term TEXT,
        utm_id TEXT,
        full_url TEXT,
        ip_address TEXT,
        store_name TEXT NOT NULL,
        location_match BOOLEAN NOT NULL,
        ip_checked BOOLEAN NOT NULL,
        fraud_bucket TEXT NOT NULL,
        risk_score INTEGER NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_order_line_risk_recorded_at ON order_line_risk (recorded_at)",
    "CREATE INDEX IF NOT EXISTS idx_order_line_risk_ip_address ON order_line_risk (ip_address)",
    "CREATE INDEX IF NOT EXISTS idx_order_line_risk_phone ON order_line_risk (phone)",
];

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Create the row table and its lookup indexes if missing
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("order_line_risk schema ready");
    Ok(())
}
