//! Risk scoring strategies

use crate::config::{EngineConfig, ScoringConfig, ScoringModel};
use crate::history::HistoricalSnapshot;
use crate::types::{GeoSignal, NormalizedSignals, RiskAssessment, RiskBucket, RiskFactor, RiskScore};
use std::collections::HashSet;

/// Everything a strategy may look at
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    /// Normalized order signals
    pub signals: &'a NormalizedSignals,
    /// Resolved geo signal, if any
    pub geo: Option<&'a GeoSignal>,
    /// Historical state at evaluation time
    pub history: &'a HistoricalSnapshot,
}

/// Interchangeable scoring model. Implementations must be pure.
pub trait ScoringStrategy: Send + Sync {
    /// Which model this is
    fn model(&self) -> ScoringModel;

    /// Score one order
    fn assess(&self, input: &ScoringInput<'_>) -> RiskAssessment;
}

/// Build the configured strategy
pub fn strategy_for(config: &EngineConfig) -> Box<dyn ScoringStrategy> {
    match config.scoring.model {
        ScoringModel::Additive => Box::new(AdditiveScorer::new(
            config.scoring.clone(),
            config.history.burst_threshold,
        )),
        ScoringModel::Legacy => Box::new(LegacyClassifier::new(config.scoring.clone())),
    }
}

/// Distinct lower-cased tokens over total tokens across both address lines.
/// An address with no tokens has entropy 0.
pub fn address_entropy(address1: Option<&str>, address2: Option<&str>) -> f64 {
    let joined = format!("{} {}", address1.unwrap_or(""), address2.unwrap_or("")).to_lowercase();
    let tokens: Vec<&str> = joined.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<&str> = tokens.iter().copied().collect();
    distinct.len() as f64 / tokens.len() as f64
}

fn matching_token<'a>(haystack: &str, tokens: &'a [String]) -> Option<&'a str> {
    tokens
        .iter()
        .map(String::as_str)
        .find(|t| !t.is_empty() && haystack.contains(t))
}

fn social_source<'a>(signals: &NormalizedSignals, sources: &'a [String]) -> Option<&'a str> {
    let source = signals.utm.source.as_deref()?.trim().to_lowercase();
    sources
        .iter()
        .map(String::as_str)
        .find(|s| *s == source)
}

fn differs(stated: Option<&str>, resolved: Option<&str>) -> Option<(String, String)> {
    match (stated, resolved) {
        (Some(s), Some(r)) if !s.trim().eq_ignore_ascii_case(r.trim()) && !r.trim().is_empty() => {
            Some((s.to_string(), r.to_string()))
        }
        _ => None,
    }
}

struct FactorSheet {
    score: u32,
    factors: Vec<RiskFactor>,
}

impl FactorSheet {
    fn new() -> Self {
        Self {
            score: 0,
            factors: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, points: u32, reason: String) {
        self.score = self.score.saturating_add(points);
        self.factors.push(RiskFactor {
            name: name.to_string(),
            points,
            reason,
        });
    }
}

// ===== Additive Model =====

/// Weighted additive heuristic
#[derive(Debug, Clone)]
pub struct AdditiveScorer {
    config: ScoringConfig,
    burst_threshold: u64,
}

impl AdditiveScorer {
    /// Create new scorer
    pub fn new(config: ScoringConfig, burst_threshold: u64) -> Self {
        Self {
            config,
            burst_threshold,
        }
    }

    fn bucket_for(&self, score: u32) -> RiskBucket {
        let t = &self.config.thresholds;
        match score {
            s if s >= t.real_fraud => RiskBucket::RealFraud,
            s if s >= t.telecom => RiskBucket::Telecom,
            s if s >= t.platform => RiskBucket::Platform,
            _ => RiskBucket::Clean,
        }
    }
}

impl ScoringStrategy for AdditiveScorer {
    fn model(&self) -> ScoringModel {
        ScoringModel::Additive
    }

    fn assess(&self, input: &ScoringInput<'_>) -> RiskAssessment {
        let w = &self.config.weights;
        let signals = input.signals;
        let org = input.geo.map(|g| g.organization.as_str()).unwrap_or("");
        let mut sheet = FactorSheet::new();

        if let Some(token) = matching_token(org, &self.config.telecom_tokens) {
            sheet.add(
                "telecom_org",
                w.telecom_org,
                format!("network '{}' matches '{}'", org, token),
            );
        }

        if let Some(token) = matching_token(org, &self.config.platform_tokens) {
            sheet.add(
                "platform_signal",
                w.platform_signal,
                format!("network '{}' matches '{}'", org, token),
            );
        } else if let Some(source) = social_source(signals, &self.config.social_sources) {
            sheet.add(
                "platform_signal",
                w.platform_signal,
                format!("utm_source is social platform '{}'", source),
            );
        }

        if input.history.ip_seen == Some(true) {
            sheet.add("repeat_ip", w.repeat_ip, "client ip seen in an earlier order".to_string());
        }

        if input.history.phone_seen == Some(true) {
            sheet.add("repeat_phone", w.repeat_phone, "phone seen in an earlier order".to_string());
        }

        // The count excludes this event, so reaching the threshold makes it the next one over.
        if let Some(recent) = input.history.recent_rows {
            if recent >= self.burst_threshold {
                sheet.add(
                    "burst",
                    w.burst,
                    format!("{} rows already recorded in the burst window", recent),
                );
            }
        }

        let entropy = address_entropy(signals.address1.as_deref(), signals.address2.as_deref());
        if entropy < self.config.entropy_threshold {
            sheet.add(
                "low_address_entropy",
                w.low_address_entropy,
                format!("address entropy {:.2}", entropy),
            );
        }

        if let Some((stated, resolved)) =
            differs(signals.country.as_deref(), input.geo.and_then(|g| g.country.as_deref()))
        {
            sheet.add(
                "country_mismatch",
                w.country_mismatch,
                format!("stated '{}' but ip resolves to '{}'", stated, resolved),
            );
        }

        RiskAssessment {
            bucket: self.bucket_for(sheet.score),
            score: RiskScore::new(sheet.score),
            factors: sheet.factors,
            model: ScoringModel::Additive,
        }
    }
}

// ===== Legacy Model =====

/// Short-circuit classifier: first matching check decides bucket and score
#[derive(Debug, Clone)]
pub struct LegacyClassifier {
    config: ScoringConfig,
}

impl LegacyClassifier {
    /// Create new classifier
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    fn verdict(bucket: RiskBucket, score: u32, name: &str, reason: String) -> RiskAssessment {
        let factors = if score > 0 {
            vec![RiskFactor {
                name: name.to_string(),
                points: score,
                reason,
            }]
        } else {
            Vec::new()
        };
        RiskAssessment {
            bucket,
            score: RiskScore::new(score),
            factors,
            model: ScoringModel::Legacy,
        }
    }
}

impl ScoringStrategy for LegacyClassifier {
    fn model(&self) -> ScoringModel {
        ScoringModel::Legacy
    }

    fn assess(&self, input: &ScoringInput<'_>) -> RiskAssessment {
        let Some(geo) = input.geo else {
            return Self::verdict(
                RiskBucket::Unknown,
                50,
                "no_geo",
                "ip could not be resolved".to_string(),
            );
        };
        let signals = input.signals;
        let org = geo.organization.as_str();

        if let Some(token) = matching_token(org, &self.config.telecom_tokens) {
            return Self::verdict(
                RiskBucket::Telecom,
                5,
                "telecom_org",
                format!("network matches '{}'", token),
            );
        }

        if let Some(token) = matching_token(org, &self.config.platform_tokens)
            .or_else(|| social_source(signals, &self.config.social_sources))
        {
            return Self::verdict(
                RiskBucket::Platform,
                10,
                "platform_signal",
                format!("platform or social source '{}'", token),
            );
        }

        if let Some((stated, resolved)) =
            differs(signals.country.as_deref(), geo.country.as_deref())
        {
            return Self::verdict(
                RiskBucket::RealFraud,
                95,
                "country_mismatch",
                format!("stated '{}' but ip resolves to '{}'", stated, resolved),
            );
        }

        if let Some((stated, resolved)) =
            differs(signals.state.as_deref(), geo.region.as_deref())
        {
            return Self::verdict(
                RiskBucket::RealFraud,
                80,
                "region_mismatch",
                format!("stated '{}' but ip resolves to '{}'", stated, resolved),
            );
        }

        Self::verdict(RiskBucket::Clean, 0, "clean", String::new())
    }
}
