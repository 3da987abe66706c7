//! MaxMind city and ASN databases behind the engine's [`GeoDatabase`] seam

use anyhow::{anyhow, Context, Result};
use maxminddb::{geoip2, MaxMindDBError, Mmap, Reader};
use order_risk_engine::geo::{GeoBackendError, GeoRecord};
use order_risk_engine::GeoDatabase;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const LANGUAGE: &str = "en";

/// Both memory-mapped readers, opened once for the process lifetime
pub struct MaxMindGeoDatabase {
    city: Reader<Mmap>,
    asn: Reader<Mmap>,
}

impl MaxMindGeoDatabase {
    pub fn open(city_path: impl AsRef<Path>, asn_path: impl AsRef<Path>) -> Result<Self> {
        let city_path = city_path.as_ref();
        let asn_path = asn_path.as_ref();
        let city = Reader::open_mmap(city_path)
            .with_context(|| format!("opening city database {}", city_path.display()))?;
        let asn = Reader::open_mmap(asn_path)
            .with_context(|| format!("opening ASN database {}", asn_path.display()))?;
        Ok(Self { city, asn })
    }
}

impl GeoDatabase for MaxMindGeoDatabase {
    fn lookup(&self, ip: IpAddr) -> Result<Option<GeoRecord>, GeoBackendError> {
        // A record needs both halves; a miss in either is a miss.
        let city: geoip2::City = match self.city.lookup(ip) {
            Ok(city) => city,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(None),
            Err(e) => return Err(GeoBackendError(e.to_string())),
        };
        let asn: geoip2::Asn = match self.asn.lookup(ip) {
            Ok(asn) => asn,
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(None),
            Err(e) => return Err(GeoBackendError(e.to_string())),
        };

        let country = city
            .country
            .and_then(|c| c.names)
            .and_then(|names| names.get(LANGUAGE).map(|n| n.to_string()));
        let subdivisions = city
            .subdivisions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.names.and_then(|names| names.get(LANGUAGE).map(|n| n.to_string())))
            .collect();

        Ok(Some(GeoRecord {
            country,
            subdivisions,
            organization: asn.autonomous_system_organization.map(str::to_string),
        }))
    }
}

/// Make sure `path` exists, downloading it once from `url` when missing
pub async fn ensure_database(path: &str, url: Option<&str>, timeout: Duration) -> Result<()> {
    let path = Path::new(path);
    if path.exists() {
        return Ok(());
    }
    let url = url.ok_or_else(|| {
        anyhow!("{} missing and no download URL configured", path.display())
    })?;

    info!("Downloading geo database {} from {}", path.display(), url);
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Renamed into place only once fully written.
    let partial = path.with_extension("mmdb.partial");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, path).await?;
    info!("Geo database {} saved ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_files_fails() {
        let result = MaxMindGeoDatabase::open("/nonexistent/city.mmdb", "/nonexistent/asn.mmdb");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_without_url_fails_for_missing_file() {
        let result = ensure_database("/nonexistent/city.mmdb", None, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_is_noop_for_existing_file() {
        let path = std::env::temp_dir().join("order-webhook-geo-present.mmdb");
        std::fs::write(&path, b"x").unwrap();
        let result = ensure_database(path.to_str().unwrap(), None, Duration::from_secs(1)).await;
        assert!(result.is_ok());
        let _ = std::fs::remove_file(path);
    }
}
