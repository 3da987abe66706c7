use crate::config::WebhookConfig;
use crate::errors::{IngestError, IngestResult};
use crate::metrics;
use crate::models::{AckResponse, HealthResponse};
use crate::signature::verify_signature;
use actix_web::{web, HttpRequest, HttpResponse};
use order_risk_engine::{OrderEvent, RiskEngine};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared per-process state handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RiskEngine>,
    pub webhook: WebhookConfig,
    pub pool: Option<PgPool>,
    pub geo_enabled: bool,
}

// ===== Health Check =====
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        None => "not_configured",
    };

    let status = if database == "disconnected" { "degraded" } else { "healthy" };
    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        geo_enabled: state.geo_enabled,
    })
}

// ===== Order Webhook =====
pub async fn receive_order(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> IngestResult<HttpResponse> {
    let timer = std::time::Instant::now();
    let result = process_order(&req, &body, &state).await;

    let label = match &result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::WEBHOOKS_TOTAL.with_label_values(&[label]).inc();
    metrics::WEBHOOK_DURATION
        .with_label_values(&[label])
        .observe(timer.elapsed().as_secs_f64());

    result.map(|_| HttpResponse::Ok().json(AckResponse::ok()))
}

async fn process_order(req: &HttpRequest, body: &[u8], state: &AppState) -> IngestResult<()> {
    let signature = req
        .headers()
        .get(state.webhook.signature_header.as_str())
        .and_then(|v| v.to_str().ok());

    // Authenticate the raw bytes before anything is parsed.
    if !verify_signature(state.webhook.secret.as_bytes(), body, signature) {
        warn!(has_header = signature.is_some(), "webhook signature rejected");
        return Err(IngestError::Unauthorized("signature mismatch".to_string()));
    }

    let order: OrderEvent = serde_json::from_slice(body).map_err(|e| {
        warn!("malformed order payload: {}", e);
        e
    })?;

    let store_id = resolve_store_id(req, &state.webhook, &order);
    let report = state.engine.ingest(&order, &store_id).await.map_err(|e| {
        error!(order_id = order.id, store_id = %store_id, "ingest failed: {}", e);
        IngestError::from(e)
    })?;

    metrics::record_report(&report);
    info!(
        order_id = order.id,
        store_id = %store_id,
        rows = report.outcome.inserted,
        duplicate = report.is_duplicate(),
        "order ingested"
    );
    Ok(())
}

/// Store header, then the payload's shop id, then the configured placeholder.
///
/// Deliveries without the header still get a stable per-shop identifier from
/// `shop_id` when the payload carries one, so their row ids use that id
/// rather than the placeholder.
pub fn resolve_store_id(req: &HttpRequest, webhook: &WebhookConfig, order: &OrderEvent) -> String {
    req.headers()
        .get(webhook.store_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| order.shop_id.map(|id| id.to_string()))
        .unwrap_or_else(|| webhook.default_store.clone())
}

// ===== Prometheus =====
pub async fn prometheus_metrics() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhooks/orders", web::post().to(receive_order))
        .route("/shopify", web::post().to(receive_order))
        .route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(prometheus_metrics));
}
