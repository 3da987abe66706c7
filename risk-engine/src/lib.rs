//! Order Risk Engine
//!
//! Fraud-risk assessment for e-commerce order webhooks: signal normalization,
//! IP geolocation, historical lookups and heuristic scoring.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod history;
pub mod normalizer;
pub mod rows;
pub mod scoring;
pub mod store;
pub mod types;

pub use config::{EngineConfig, HistoryConfig, ScoringConfig, ScoringModel};
pub use engine::{Evaluation, IngestReport, RiskEngine};
pub use error::{Error, Result};
pub use geo::{GeoDatabase, GeoOutcome, GeoResolver, StaticGeoDatabase};
pub use history::{HistoricalSnapshot, HistoryAccessor, HistoryCheck};
pub use normalizer::normalize;
pub use rows::{build_batch, row_id};
pub use scoring::{AdditiveScorer, LegacyClassifier, ScoringInput, ScoringStrategy};
pub use store::{HistoricalField, HistoricalSignals, InsertOutcome, MemoryOrderStore, OrderSink};
pub use types::*;
