//! Per-event orchestration
//!
//! The engine holds only immutable handles and is shared across workers
//! behind an `Arc`.

use crate::config::EngineConfig;
use crate::geo::{GeoOutcome, GeoResolver};
use crate::history::{HistoricalSnapshot, HistoryAccessor};
use crate::normalizer::normalize;
use crate::rows::build_batch;
use crate::scoring::{strategy_for, ScoringInput, ScoringStrategy};
use crate::store::{HistoricalSignals, InsertOutcome, OrderSink};
use crate::types::{NormalizedSignals, OrderBatch, OrderEvent, RiskAssessment};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything computed for one order before persistence
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Extracted signals
    pub signals: NormalizedSignals,
    /// Geo lookup outcome
    pub geo: GeoOutcome,
    /// Historical state observed
    pub history: HistoricalSnapshot,
    /// Risk verdict
    pub assessment: RiskAssessment,
    /// Rows ready for the sink
    pub batch: OrderBatch,
}

/// Result of a full ingest
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Evaluation that was persisted
    pub evaluation: Evaluation,
    /// Sink result
    pub outcome: InsertOutcome,
}

impl IngestReport {
    /// True when every row already existed, i.e. a redelivery
    pub fn is_duplicate(&self) -> bool {
        self.outcome.inserted == 0 && self.outcome.already_present > 0
    }
}

/// Risk engine
pub struct RiskEngine {
    geo: GeoResolver,
    history: HistoryAccessor,
    scorer: Box<dyn ScoringStrategy>,
    sink: Arc<dyn OrderSink>,
    config: EngineConfig,
}

impl RiskEngine {
    /// Create new engine. The configuration is validated here.
    pub fn new(
        config: EngineConfig,
        geo: GeoResolver,
        history: Arc<dyn HistoricalSignals>,
        sink: Arc<dyn OrderSink>,
    ) -> Result<Self> {
        let config = config.validated()?;
        Ok(Self {
            geo,
            history: HistoryAccessor::new(history, config.history.clone()),
            scorer: strategy_for(&config),
            sink,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate an order at the current instant
    pub async fn assess(&self, order: &OrderEvent, store_id: &str) -> Evaluation {
        self.assess_at(order, store_id, Utc::now()).await
    }

    /// Evaluate an order as of `now`
    pub async fn assess_at(
        &self,
        order: &OrderEvent,
        store_id: &str,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let signals = normalize(order);

        let geo = async { self.geo.resolve(signals.client_ip.as_deref()) };
        let (geo, history) = tokio::join!(geo, self.history.snapshot(&signals, now));

        let assessment = self.scorer.assess(&ScoringInput {
            signals: &signals,
            geo: geo.signal(),
            history: &history,
        });

        info!(
            order_id = order.id,
            store_id,
            geo = geo.label(),
            bucket = %assessment.bucket,
            score = assessment.score.value(),
            degraded = history.degraded.len(),
            "order assessed"
        );

        let batch = build_batch(order, store_id, &signals, geo.signal(), &assessment, now);

        Evaluation {
            signals,
            geo,
            history,
            assessment,
            batch,
        }
    }

    /// Hand a batch to the sink under the write timeout. Every row must be
    /// either inserted or already present.
    pub async fn persist(&self, batch: &OrderBatch) -> Result<InsertOutcome> {
        let timeout_ms = self.config.history.write_timeout_ms;
        let write = self.sink.insert_batch(batch);
        let outcome = tokio::time::timeout(self.config.history.write_timeout(), write)
            .await
            .map_err(|_| Error::PersistenceTimeout { timeout_ms })??;

        if outcome.accounted() != batch.len() {
            error!(
                order_id = batch.order_id,
                expected = batch.len(),
                inserted = outcome.inserted,
                already_present = outcome.already_present,
                "partial persistence"
            );
            return Err(Error::PartialPersistence {
                order_id: batch.order_id,
                expected: batch.len(),
                accounted: outcome.accounted(),
            });
        }

        if outcome.already_present > 0 {
            warn!(
                order_id = batch.order_id,
                already_present = outcome.already_present,
                "rows already persisted, skipped"
            );
        }
        Ok(outcome)
    }

    /// Assess and persist one order
    pub async fn ingest(&self, order: &OrderEvent, store_id: &str) -> Result<IngestReport> {
        let evaluation = self.assess(order, store_id).await;
        let outcome = self.persist(&evaluation.batch).await?;
        Ok(IngestReport { evaluation, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::StaticGeoDatabase;
    use crate::store::MemoryOrderStore;
    use crate::types::{LineItem, NoteAttribute};
    use async_trait::async_trait;
    use std::time::Duration;

    struct DroppingSink;

    #[async_trait]
    impl OrderSink for DroppingSink {
        async fn insert_batch(&self, batch: &OrderBatch) -> Result<InsertOutcome> {
            Ok(InsertOutcome {
                inserted: batch.len().saturating_sub(1),
                already_present: 0,
            })
        }
    }

    fn order() -> OrderEvent {
        OrderEvent {
            id: 42,
            name: Some("#1042".to_string()),
            created_at: DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z").unwrap(),
            line_items: vec![
                LineItem {
                    product_id: Some(1),
                    variant_id: Some(10),
                    quantity: 1,
                    ..Default::default()
                },
                LineItem {
                    product_id: Some(1),
                    variant_id: Some(11),
                    quantity: 1,
                    ..Default::default()
                },
            ],
            note_attributes: vec![NoteAttribute::new("Phone", "98765 43210")],
            landing_site: None,
            landing_site_ref: None,
            shop_id: None,
        }
    }

    fn engine_with(store: MemoryOrderStore, sink: Arc<dyn OrderSink>) -> RiskEngine {
        RiskEngine::new(
            EngineConfig::default(),
            GeoResolver::new(Arc::new(StaticGeoDatabase::new())),
            Arc::new(store),
            sink,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_persists_every_line_item() {
        let store = MemoryOrderStore::new();
        let engine = engine_with(store.clone(), Arc::new(store.clone()));

        let report = engine.ingest(&order(), "acme").await.unwrap();
        assert_eq!(report.outcome.inserted, 2);
        assert!(!report.is_duplicate());
        assert_eq!(store.len().await, 2);
        assert!(store.get("acme_42_1_11").await.is_some());
    }

    #[tokio::test]
    async fn test_partial_persistence_is_reported() {
        let engine = engine_with(MemoryOrderStore::new(), Arc::new(DroppingSink));
        let err = engine.ingest(&order(), "acme").await.unwrap_err();
        assert!(matches!(
            err,
            Error::PartialPersistence { order_id: 42, expected: 2, accounted: 1 }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_sink_times_out() {
        let mut config = EngineConfig::default();
        config.history.write_timeout_ms = 10;
        let slow = MemoryOrderStore::new().with_latency(Duration::from_millis(200));
        let engine = RiskEngine::new(
            config,
            GeoResolver::disabled(),
            Arc::new(MemoryOrderStore::new()),
            Arc::new(slow),
        )
        .unwrap();

        let err = engine.ingest(&order(), "acme").await.unwrap_err();
        assert!(matches!(err, Error::PersistenceTimeout { timeout_ms: 10 }));
    }

    #[tokio::test]
    async fn test_failed_write_surfaces_persistence_error() {
        let failing = MemoryOrderStore::new().with_failing_writes();
        let engine = engine_with(MemoryOrderStore::new(), Arc::new(failing));
        let err = engine.ingest(&order(), "acme").await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.history.burst_window_seconds = 0;
        let store = Arc::new(MemoryOrderStore::new());
        let result = RiskEngine::new(config, GeoResolver::disabled(), store.clone(), store);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unbounded_window_and_weights_rejected_at_construction() {
        let store = Arc::new(MemoryOrderStore::new());

        let mut config = EngineConfig::default();
        config.history.burst_window_seconds = i64::MAX;
        let result = RiskEngine::new(config, GeoResolver::disabled(), store.clone(), store.clone());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.scoring.weights.repeat_phone = u32::MAX;
        config.scoring.weights.low_address_entropy = u32::MAX;
        let result = RiskEngine::new(config, GeoResolver::disabled(), store.clone(), store);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
