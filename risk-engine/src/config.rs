//! Engine configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scoring strategy selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringModel {
    /// Additive weighted heuristic
    #[default]
    Additive,
    /// Short-circuit geo-mismatch classifier
    Legacy,
}

/// Points awarded by each additive rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditiveWeights {
    pub telecom_org: u32,
    pub platform_signal: u32,
    pub repeat_ip: u32,
    pub repeat_phone: u32,
    pub burst: u32,
    pub low_address_entropy: u32,
    pub country_mismatch: u32,
}

impl AdditiveWeights {
    /// Score when every rule fires, `None` if it does not fit a `u32`
    pub fn checked_total(&self) -> Option<u32> {
        [
            self.telecom_org,
            self.platform_signal,
            self.repeat_ip,
            self.repeat_phone,
            self.burst,
            self.low_address_entropy,
            self.country_mismatch,
        ]
        .into_iter()
        .try_fold(0u32, u32::checked_add)
    }
}

impl Default for AdditiveWeights {
    fn default() -> Self {
        Self {
            telecom_org: 10,
            platform_signal: 15,
            repeat_ip: 25,
            repeat_phone: 35,
            burst: 30,
            low_address_entropy: 20,
            country_mismatch: 40,
        }
    }
}

/// Minimum scores for each bucket, checked from the top down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketThresholds {
    pub real_fraud: u32,
    pub telecom: u32,
    pub platform: u32,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            real_fraud: 80,
            telecom: 60,
            platform: 30,
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Active strategy
    pub model: ScoringModel,

    /// Substrings of mobile carrier organization names
    pub telecom_tokens: Vec<String>,

    /// Substrings of hosting/social platform organization names
    pub platform_tokens: Vec<String>,

    /// `utm_source` values that count as social traffic
    pub social_sources: Vec<String>,

    /// Additive rule weights
    pub weights: AdditiveWeights,

    /// Address entropy below this adds the low-entropy weight
    pub entropy_threshold: f64,

    /// Bucket cut-offs for the additive model
    pub thresholds: BucketThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model: ScoringModel::Additive,
            telecom_tokens: to_strings(&["jio", "airtel", "vodafone", "idea", "bsnl", "tata"]),
            platform_tokens: to_strings(&[
                "meta",
                "facebook",
                "google",
                "whatsapp",
                "cloudflare",
                "amazon",
                "aws",
            ]),
            social_sources: to_strings(&["facebook", "google", "instagram", "whatsapp"]),
            weights: AdditiveWeights::default(),
            entropy_threshold: 0.5,
            thresholds: BucketThresholds::default(),
        }
    }
}

/// Historical lookup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Trailing burst window in seconds
    pub burst_window_seconds: i64,

    /// Prior rows in the window at which the burst rule fires
    pub burst_threshold: u64,

    /// Bound on each historical read
    pub query_timeout_ms: u64,

    /// Bound on the batch write
    pub write_timeout_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            burst_window_seconds: 120,
            burst_threshold: 12,
            query_timeout_ms: 2_000,
            write_timeout_ms: 5_000,
        }
    }
}

impl HistoryConfig {
    /// Burst window as a chrono duration, clamped to the accepted range
    pub fn burst_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.burst_window_seconds.clamp(0, MAX_BURST_WINDOW_SECONDS))
    }

    /// Read bound
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Write bound
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Longest accepted burst window
pub const MAX_BURST_WINDOW_SECONDS: i64 = 86_400;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scoring settings
    pub scoring: ScoringConfig,
    /// Historical lookup settings
    pub history: HistoryConfig,
}

impl EngineConfig {
    /// Reject settings the engine cannot run with and lower-case token lists
    pub fn validated(mut self) -> Result<Self> {
        let window = self.history.burst_window_seconds;
        if window <= 0 || window > MAX_BURST_WINDOW_SECONDS {
            return Err(Error::InvalidConfig(format!(
                "burst_window_seconds must be within 1..={}, got {}",
                MAX_BURST_WINDOW_SECONDS, window
            )));
        }
        if self.scoring.weights.checked_total().is_none() {
            return Err(Error::InvalidConfig(
                "additive weights overflow the score range".to_string(),
            ));
        }
        if self.history.query_timeout_ms == 0 || self.history.write_timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.scoring.entropy_threshold) {
            return Err(Error::InvalidConfig(format!(
                "entropy_threshold must be within [0, 1], got {}",
                self.scoring.entropy_threshold
            )));
        }
        let t = &self.scoring.thresholds;
        if !(t.real_fraud >= t.telecom && t.telecom >= t.platform) {
            return Err(Error::InvalidConfig(format!(
                "bucket thresholds must descend: real_fraud={} telecom={} platform={}",
                t.real_fraud, t.telecom, t.platform
            )));
        }

        let scoring = &mut self.scoring;
        for list in [
            &mut scoring.telecom_tokens,
            &mut scoring.platform_tokens,
            &mut scoring.social_sources,
        ] {
            *list = list
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }

        Ok(self)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default().validated().unwrap();
        assert_eq!(config.history.burst_threshold, 12);
        assert_eq!(config.history.burst_window(), chrono::Duration::minutes(2));
        assert_eq!(config.scoring.model, ScoringModel::Additive);
    }

    #[test]
    fn test_tokens_are_lowercased_and_blanks_dropped() {
        let mut config = EngineConfig::default();
        config.scoring.telecom_tokens = vec![" Jio ".to_string(), "  ".to_string()];
        let config = config.validated().unwrap();
        assert_eq!(config.scoring.telecom_tokens, vec!["jio".to_string()]);
    }

    #[test]
    fn test_oversized_burst_window_rejected() {
        let mut config = EngineConfig::default();
        config.history.burst_window_seconds = i64::MAX;
        assert_eq!(config.history.burst_window(), chrono::Duration::days(1));
        assert!(matches!(config.validated(), Err(Error::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.history.burst_window_seconds = MAX_BURST_WINDOW_SECONDS;
        assert!(config.validated().is_ok());
    }

    #[test]
    fn test_overflowing_weights_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.weights.burst = u32::MAX;
        config.scoring.weights.low_address_entropy = u32::MAX;
        config.scoring.weights.country_mismatch = u32::MAX;
        assert!(matches!(config.validated(), Err(Error::InvalidConfig(_))));
        assert_eq!(AdditiveWeights::default().checked_total(), Some(175));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.thresholds.platform = 90;
        assert!(matches!(config.validated(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"scoring": {"model": "legacy"}}"#).unwrap();
        assert_eq!(config.scoring.model, ScoringModel::Legacy);
        assert_eq!(config.scoring.weights.repeat_phone, 35);
        assert_eq!(config.history.burst_window_seconds, 120);
    }
}
