//! Error types for risk engine

use thiserror::Error;

/// Risk engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Required order structure is missing or unreadable
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Historical store could not answer a query
    #[error("Historical query failed ({check}): {message}")]
    HistoricalQuery {
        /// Which historical check failed
        check: &'static str,
        /// Underlying failure
        message: String,
    },

    /// Historical store did not answer within the configured bound
    #[error("Historical query timed out ({check}) after {timeout_ms}ms")]
    HistoricalQueryTimeout {
        /// Which historical check timed out
        check: &'static str,
        /// Configured bound
        timeout_ms: u64,
    },

    /// Persistence sink rejected the batch
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persistence sink did not answer within the configured bound
    #[error("Persistence timed out after {timeout_ms}ms")]
    PersistenceTimeout {
        /// Configured bound
        timeout_ms: u64,
    },

    /// Only some rows of an order were accounted for by the sink
    #[error("Partial persistence for order {order_id}: {accounted} of {expected} rows")]
    PartialPersistence {
        /// Order whose batch was incomplete
        order_id: u64,
        /// Rows in the batch
        expected: usize,
        /// Rows inserted or already present
        accounted: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for failures the transport should retry by redelivering the event
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Persistence(_)
                | Error::PersistenceTimeout { .. }
                | Error::PartialPersistence { .. }
        )
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
