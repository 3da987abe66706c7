//! IP geolocation
//!
//! Lookups never fail the request: every non-resolved outcome degrades to an
//! absent [`GeoSignal`], while the outcome itself keeps the reason for logs
//! and metrics.

use crate::types::GeoSignal;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Raw record returned by a geolocation backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoRecord {
    /// Country name
    pub country: Option<String>,
    /// Subdivisions, least to most specific
    pub subdivisions: Vec<String>,
    /// Autonomous system organization
    pub organization: Option<String>,
}

/// Backend failure other than a miss
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoBackendError(pub String);

impl fmt::Display for GeoBackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for GeoBackendError {}

/// Local geolocation database. `Ok(None)` is a lookup miss.
pub trait GeoDatabase: Send + Sync {
    /// Look up one address
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, GeoBackendError>;
}

/// Result of resolving a client IP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoOutcome {
    /// Location resolved
    Resolved(GeoSignal),
    /// Order carried no IP
    NoAddress,
    /// Text is not an IPv4/IPv6 literal
    InvalidAddress(String),
    /// Address not present in the database
    NotFound(IpAddr),
    /// Database unavailable or corrupt
    BackendError(String),
}

impl GeoOutcome {
    /// Signal for scoring, `None` unless resolved
    pub fn signal(&self) -> Option<&GeoSignal> {
        match self {
            GeoOutcome::Resolved(signal) => Some(signal),
            _ => None,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            GeoOutcome::Resolved(_) => "resolved",
            GeoOutcome::NoAddress => "no_address",
            GeoOutcome::InvalidAddress(_) => "invalid_address",
            GeoOutcome::NotFound(_) => "not_found",
            GeoOutcome::BackendError(_) => "backend_error",
        }
    }
}

/// Resolves client IPs against a shared, immutable database handle
#[derive(Clone)]
pub struct GeoResolver {
    database: Option<Arc<dyn GeoDatabase>>,
}

impl GeoResolver {
    /// Create new resolver
    pub fn new(database: Arc<dyn GeoDatabase>) -> Self {
        Self {
            database: Some(database),
        }
    }

    /// Resolver with no database; every lookup is a backend error
    pub fn disabled() -> Self {
        Self { database: None }
    }

    /// True when a database is loaded
    pub fn is_enabled(&self) -> bool {
        self.database.is_some()
    }

    /// Resolve an optional textual IP
    pub fn resolve(&self, ip: Option<&str>) -> GeoOutcome {
        let Some(raw) = ip.map(str::trim).filter(|s| !s.is_empty()) else {
            return GeoOutcome::NoAddress;
        };

        let Ok(addr) = raw.parse::<IpAddr>() else {
            debug!(ip = raw, "client ip is not a valid address");
            return GeoOutcome::InvalidAddress(raw.to_string());
        };

        let Some(database) = &self.database else {
            return GeoOutcome::BackendError("geo database not loaded".to_string());
        };

        match database.lookup(addr) {
            Ok(Some(record)) => GeoOutcome::Resolved(GeoSignal {
                country: record.country,
                region: record.subdivisions.last().cloned(),
                organization: record.organization.unwrap_or_default().to_lowercase(),
            }),
            Ok(None) => GeoOutcome::NotFound(addr),
            Err(e) => GeoOutcome::BackendError(e.to_string()),
        }
    }
}

impl fmt::Debug for GeoResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoResolver")
            .field("loaded", &self.database.is_some())
            .finish()
    }
}

/// In-memory database keyed by exact address
#[derive(Debug, Clone, Default)]
pub struct StaticGeoDatabase {
    records: HashMap<IpAddr, GeoRecord>,
}

impl StaticGeoDatabase {
    /// Create empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub fn with_record(
        mut self,
        ip: IpAddr,
        country: &str,
        region: Option<&str>,
        organization: &str,
    ) -> Self {
        self.records.insert(
            ip,
            GeoRecord {
                country: Some(country.to_string()),
                subdivisions: region.map(|r| vec![r.to_string()]).unwrap_or_default(),
                organization: Some(organization.to_string()),
            },
        );
        self
    }

    /// Add a raw record
    pub fn insert(&mut self, ip: IpAddr, record: GeoRecord) {
        self.records.insert(ip, record);
    }
}

impl GeoDatabase for StaticGeoDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, GeoBackendError> {
        Ok(self.records.get(&ip).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenDatabase;

    impl GeoDatabase for BrokenDatabase {
        fn lookup(&self, _ip: IpAddr) -> Result<Option<GeoRecord>, GeoBackendError> {
            Err(GeoBackendError("corrupt index".to_string()))
        }
    }

    fn resolver() -> GeoResolver {
        let mut db = StaticGeoDatabase::new();
        db.insert(
            "49.36.0.1".parse().unwrap(),
            GeoRecord {
                country: Some("India".to_string()),
                subdivisions: vec!["Karnataka".to_string(), "Bengaluru Urban".to_string()],
                organization: Some("Reliance JIO Infocomm".to_string()),
            },
        );
        GeoResolver::new(Arc::new(db))
    }

    #[test]
    fn test_resolves_most_specific_region_and_lowercases_org() {
        let outcome = resolver().resolve(Some(" 49.36.0.1 "));
        let signal = outcome.signal().unwrap();
        assert_eq!(signal.country.as_deref(), Some("India"));
        assert_eq!(signal.region.as_deref(), Some("Bengaluru Urban"));
        assert_eq!(signal.organization, "reliance jio infocomm");
    }

    #[test]
    fn test_outcomes_are_distinct() {
        let r = resolver();
        assert_eq!(r.resolve(None), GeoOutcome::NoAddress);
        assert_eq!(r.resolve(Some("  ")), GeoOutcome::NoAddress);
        assert_eq!(r.resolve(Some("999.1.1.1")).label(), "invalid_address");
        assert_eq!(r.resolve(Some("2001:db8::1")).label(), "not_found");

        let broken = GeoResolver::new(Arc::new(BrokenDatabase));
        assert_eq!(broken.resolve(Some("8.8.8.8")).label(), "backend_error");
        assert_eq!(GeoResolver::disabled().resolve(Some("8.8.8.8")).label(), "backend_error");
        assert!(!GeoResolver::disabled().is_enabled());
        assert!(r.is_enabled());
    }

    #[test]
    fn test_unresolved_outcomes_have_no_signal() {
        let r = resolver();
        for ip in [None, Some("bogus"), Some("10.0.0.1")] {
            assert!(r.resolve(ip).signal().is_none());
        }
    }
}
