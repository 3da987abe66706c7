//! Historical signal lookups
//!
//! Reads are not linearizable. Events evaluated concurrently can each miss
//! the others' rows, since nothing is written until scoring is done.

use crate::config::HistoryConfig;
use crate::store::{HistoricalField, HistoricalSignals};
use crate::types::NormalizedSignals;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Historical checks, named for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCheck {
    /// Prior rows with the same IP
    RepeatIp,
    /// Prior rows with the same phone
    RepeatPhone,
    /// Rows inside the burst window
    Burst,
}

impl HistoryCheck {
    /// Short label
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryCheck::RepeatIp => "repeat_ip",
            HistoryCheck::RepeatPhone => "repeat_phone",
            HistoryCheck::Burst => "burst",
        }
    }
}

/// Historical state observed for one evaluation.
///
/// `None` means unknown: either there was nothing to look up or the read
/// failed. Failed reads are also listed in `degraded`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoricalSnapshot {
    /// IP appeared in an earlier row
    pub ip_seen: Option<bool>,
    /// Phone appeared in an earlier row
    pub phone_seen: Option<bool>,
    /// Rows recorded in the trailing burst window
    pub recent_rows: Option<u64>,
    /// Checks that could not be answered
    pub degraded: Vec<HistoryCheck>,
}

/// Timeout-bounded access to the historical store
#[derive(Clone)]
pub struct HistoryAccessor {
    source: Arc<dyn HistoricalSignals>,
    config: HistoryConfig,
}

impl HistoryAccessor {
    /// Create new accessor
    pub fn new(source: Arc<dyn HistoricalSignals>, config: HistoryConfig) -> Self {
        Self { source, config }
    }

    /// Burst settings
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Has this value been recorded before
    pub async fn value_seen(&self, field: HistoricalField, value: &str) -> Result<bool> {
        let check = match field {
            HistoricalField::IpAddress => HistoryCheck::RepeatIp,
            HistoricalField::Phone => HistoryCheck::RepeatPhone,
        };
        self.bounded(check, self.source.value_seen(field, value)).await
    }

    /// Rows recorded in the trailing window ending at `now`
    pub async fn recent_rows(&self, now: DateTime<Utc>) -> Result<u64> {
        let since = now
            .checked_sub_signed(self.config.burst_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.bounded(HistoryCheck::Burst, self.source.rows_recorded_between(since, now))
            .await
    }

    /// Run every check that has an input, concurrently. Failures degrade to
    /// unknown and are logged.
    pub async fn snapshot(
        &self,
        signals: &NormalizedSignals,
        now: DateTime<Utc>,
    ) -> HistoricalSnapshot {
        let ip = async {
            match signals.client_ip.as_deref() {
                Some(ip) => Some(self.value_seen(HistoricalField::IpAddress, ip).await),
                None => None,
            }
        };
        let phone = async {
            match signals.phone.as_deref() {
                Some(phone) => Some(self.value_seen(HistoricalField::Phone, phone).await),
                None => None,
            }
        };
        let burst = self.recent_rows(now);

        let (ip, phone, burst) = tokio::join!(ip, phone, burst);

        let mut degraded = Vec::new();
        let ip_seen = ip.and_then(|r| degrade(r, HistoryCheck::RepeatIp, &mut degraded));
        let phone_seen = phone.and_then(|r| degrade(r, HistoryCheck::RepeatPhone, &mut degraded));
        let recent_rows = degrade(burst, HistoryCheck::Burst, &mut degraded);

        HistoricalSnapshot {
            ip_seen,
            phone_seen,
            recent_rows,
            degraded,
        }
    }

    async fn bounded<T>(
        &self,
        check: HistoryCheck,
        query: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.query_timeout(), query).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(Error::HistoricalQuery { message, .. })) => Err(Error::HistoricalQuery {
                check: check.as_str(),
                message,
            }),
            Ok(Err(e)) => Err(Error::HistoricalQuery {
                check: check.as_str(),
                message: e.to_string(),
            }),
            Err(_) => Err(Error::HistoricalQueryTimeout {
                check: check.as_str(),
                timeout_ms: self.config.query_timeout_ms,
            }),
        }
    }
}

fn degrade<T>(
    result: Result<T>,
    check: HistoryCheck,
    degraded: &mut Vec<HistoryCheck>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(check = check.as_str(), error = %e, "historical check degraded to unknown");
            degraded.push(check);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrderStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct UnreachableStore;

    #[async_trait]
    impl HistoricalSignals for UnreachableStore {
        async fn value_seen(&self, _field: HistoricalField, _value: &str) -> Result<bool> {
            Err(Error::HistoricalQuery {
                check: "store",
                message: "connection refused".to_string(),
            })
        }

        async fn rows_recorded_between(
            &self,
            _since: DateTime<Utc>,
            _until: DateTime<Utc>,
        ) -> Result<u64> {
            Err(Error::Persistence("pool closed".to_string()))
        }
    }

    fn signals() -> NormalizedSignals {
        NormalizedSignals {
            client_ip: Some("1.2.3.4".to_string()),
            phone: Some("9876543210".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_store_snapshot() {
        let accessor =
            HistoryAccessor::new(Arc::new(MemoryOrderStore::new()), HistoryConfig::default());
        let snapshot = accessor.snapshot(&signals(), Utc::now()).await;
        assert_eq!(snapshot.ip_seen, Some(false));
        assert_eq!(snapshot.phone_seen, Some(false));
        assert_eq!(snapshot.recent_rows, Some(0));
        assert!(snapshot.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_missing_inputs_are_not_queried() {
        let accessor =
            HistoryAccessor::new(Arc::new(MemoryOrderStore::new()), HistoryConfig::default());
        let snapshot = accessor.snapshot(&NormalizedSignals::default(), Utc::now()).await;
        assert_eq!(snapshot.ip_seen, None);
        assert_eq!(snapshot.phone_seen, None);
        assert!(snapshot.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_every_check() {
        let accessor = HistoryAccessor::new(Arc::new(UnreachableStore), HistoryConfig::default());
        let snapshot = accessor.snapshot(&signals(), Utc::now()).await;
        assert_eq!(snapshot, HistoricalSnapshot {
            ip_seen: None,
            phone_seen: None,
            recent_rows: None,
            degraded: vec![HistoryCheck::RepeatIp, HistoryCheck::RepeatPhone, HistoryCheck::Burst],
        });
    }

    #[tokio::test]
    async fn test_slow_store_times_out_with_distinct_error() {
        let config = HistoryConfig {
            query_timeout_ms: 10,
            ..HistoryConfig::default()
        };
        let store = MemoryOrderStore::new().with_latency(Duration::from_millis(200));
        let accessor = HistoryAccessor::new(Arc::new(store), config);

        let err = accessor.recent_rows(Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::HistoricalQueryTimeout { check: "burst", timeout_ms: 10 }
        ));

        let err = accessor
            .value_seen(HistoricalField::Phone, "123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HistoricalQueryTimeout { check: "repeat_phone", .. }));
    }
}
