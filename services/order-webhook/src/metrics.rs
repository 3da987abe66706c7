use lazy_static::lazy_static;
use order_risk_engine::IngestReport;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Webhook metrics
    pub static ref WEBHOOKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("order_webhooks_total", "Order webhooks received, by result"),
        &["result"]
    ).expect("metric can be created");

    pub static ref WEBHOOK_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("order_webhook_duration_seconds", "Webhook processing time in seconds")
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["result"]
    ).expect("metric can be created");

    // Assessment metrics
    pub static ref ORDERS_BY_BUCKET: IntCounterVec = IntCounterVec::new(
        Opts::new("order_risk_bucket_total", "Assessed orders by fraud bucket"),
        &["bucket"]
    ).expect("metric can be created");

    pub static ref GEO_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("order_geo_lookups_total", "Geo lookups by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref DEGRADED_CHECKS: IntCounterVec = IntCounterVec::new(
        Opts::new("order_history_degraded_total", "Historical checks that timed out or failed"),
        &["check"]
    ).expect("metric can be created");

    // Persistence metrics
    pub static ref ROWS_INSERTED: IntCounter = IntCounter::new(
        "order_rows_inserted_total",
        "Line-item rows written"
    ).expect("metric can be created");

    pub static ref ROWS_SKIPPED: IntCounter = IntCounter::new(
        "order_rows_already_present_total",
        "Line-item rows skipped because they already existed"
    ).expect("metric can be created");

    pub static ref DB_QUERY_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("db_query_duration_seconds", "Database query duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["operation"]
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    registry.register(Box::new(WEBHOOKS_TOTAL.clone()))?;
    registry.register(Box::new(WEBHOOK_DURATION.clone()))?;

    registry.register(Box::new(ORDERS_BY_BUCKET.clone()))?;
    registry.register(Box::new(GEO_LOOKUPS.clone()))?;
    registry.register(Box::new(DEGRADED_CHECKS.clone()))?;

    registry.register(Box::new(ROWS_INSERTED.clone()))?;
    registry.register(Box::new(ROWS_SKIPPED.clone()))?;
    registry.register(Box::new(DB_QUERY_DURATION.clone()))?;

    Ok(())
}

/// Count everything observable about one successful ingest
pub fn record_report(report: &IngestReport) {
    let evaluation = &report.evaluation;
    ORDERS_BY_BUCKET
        .with_label_values(&[evaluation.assessment.bucket.as_str()])
        .inc();
    GEO_LOOKUPS.with_label_values(&[evaluation.geo.label()]).inc();
    for check in &evaluation.history.degraded {
        DEGRADED_CHECKS.with_label_values(&[check.as_str()]).inc();
    }
    ROWS_INSERTED.inc_by(report.outcome.inserted as u64);
    ROWS_SKIPPED.inc_by(report.outcome.already_present as u64);
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let mut metric_families = REGISTRY.gather();
    metric_families.extend(prometheus::gather());
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let registry = Registry::new();
        assert!(register_metrics(&registry).is_ok());
        // Registering twice is rejected by prometheus
        assert!(register_metrics(&registry).is_err());
    }

    #[test]
    fn test_metrics_output_is_text() {
        WEBHOOKS_TOTAL.with_label_values(&["ok"]).inc();
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "order_webhooks_total"));
    }
}
