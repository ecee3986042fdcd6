//! geo.rs
//!
//! GeoLite2 City lookups. One reader, opened once, read-only afterwards.

use std::net::{IpAddr, Ipv4Addr};

use maxminddb::{geoip2, Reader};
use tracing::debug;

use crate::errors::EnrichError;

/// Placeholder for any textual field the database leaves empty.
pub const UNKNOWN: &str = "Unknown";

/// Flattened location for one address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    pub country_name: String,
    pub iso_code: String,
    pub city_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub postal_code: String,
}

impl Default for GeoRecord {
    fn default() -> Self {
        GeoRecord {
            country_name: UNKNOWN.to_string(),
            iso_code: UNKNOWN.to_string(),
            city_name: UNKNOWN.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            postal_code: UNKNOWN.to_string(),
        }
    }
}

impl GeoRecord {
    /// Collapse the nested country/city/location/postal records into a flat one.
    pub fn from_city(city: &geoip2::City<'_>) -> Self {
        GeoRecord {
            country_name: or_unknown(city.country.names.english),
            iso_code: or_unknown(city.country.iso_code),
            city_name: or_unknown(city.city.names.english),
            latitude: city.location.latitude.unwrap_or(0.0),
            longitude: city.location.longitude.unwrap_or(0.0),
            postal_code: or_unknown(city.postal.code),
        }
    }
}

fn or_unknown(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Anything that can place an address on the map.
///
/// `Ok(None)` means the address simply has no entry (private ranges,
/// unassigned blocks). Errors are reserved for a resolver that cannot answer at all.
pub trait GeoLookup {
    fn resolve(&self, ip: &str) -> Result<Option<GeoRecord>, EnrichError>;
}

impl<T: GeoLookup + ?Sized> GeoLookup for &T {
    fn resolve(&self, ip: &str) -> Result<Option<GeoRecord>, EnrichError> {
        (**self).resolve(ip)
    }
}

/// MaxMind-backed resolver over a GeoLite2-City `.mmdb` file.
pub struct GeoResolver {
    path: String,
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoResolver {
    /// Create an unopened resolver for the database at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        GeoResolver {
            path: path.into(),
            reader: None,
        }
    }

    /// Load the database into memory. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// * [`EnrichError::Io`] if the file is missing or unreadable.
    /// * [`EnrichError::GeoDb`] if the bytes are not a valid MaxMind database.
    pub async fn open(&mut self) -> Result<(), EnrichError> {
        if self.reader.is_some() {
            debug!(path = %self.path, "GeoIP database already open");
            return Ok(());
        }

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| EnrichError::Io {
                path: self.path.clone(),
                source,
            })?;
        let size = bytes.len();
        let reader = Reader::from_source(bytes)?;

        debug!(path = %self.path, bytes = size, "Read GeoIP database");

        self.reader = Some(reader);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Database type and build epoch, once opened.
    pub fn metadata(&self) -> Option<(&str, u64)> {
        self.reader
            .as_ref()
            .map(|r| (r.metadata.database_type.as_str(), r.metadata.build_epoch))
    }
}

impl GeoLookup for GeoResolver {
    fn resolve(&self, ip: &str) -> Result<Option<GeoRecord>, EnrichError> {
        let reader = self.reader.as_ref().ok_or(EnrichError::NotOpened)?;

        // The extraction pattern accepts octets above 255; those have no entry.
        let addr = match ip.parse::<Ipv4Addr>() {
            Ok(addr) => IpAddr::V4(addr),
            Err(_) => {
                debug!(ip, "Not a valid IPv4 address, treating as absent");
                return Ok(None);
            }
        };

        let result = reader.lookup(addr)?;
        if !result.has_data() {
            return Ok(None);
        }

        let city: Option<geoip2::City> = result.decode()?;
        Ok(city.as_ref().map(GeoRecord::from_city))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_before_open_is_invalid_state() {
        let resolver = GeoResolver::new("./GeoLite2-City.mmdb");
        assert!(!resolver.is_open());
        assert!(resolver.metadata().is_none());

        let err = resolver.resolve("8.8.8.8").unwrap_err();
        assert!(matches!(err, EnrichError::NotOpened));
    }

    #[tokio::test]
    async fn open_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GeoLite2-City.mmdb");
        let mut resolver = GeoResolver::new(path.to_string_lossy());

        let err = resolver.open().await.unwrap_err();
        match err {
            EnrichError::Io { path: p, source } => {
                assert_eq!(p, path.to_string_lossy());
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
        assert!(!resolver.is_open());
    }

    #[tokio::test]
    async fn open_garbage_file_is_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a maxmind database").unwrap();
        let mut resolver = GeoResolver::new(file.path().to_string_lossy());

        let err = resolver.open().await.unwrap_err();
        assert!(matches!(err, EnrichError::GeoDb(_)), "got {err:?}");
        assert!(!resolver.is_open());
    }

    #[test]
    fn missing_text_becomes_unknown() {
        assert_eq!(or_unknown(None), UNKNOWN);
        assert_eq!(or_unknown(Some("")), UNKNOWN);
        assert_eq!(or_unknown(Some("Seoul")), "Seoul");
    }

    #[test]
    fn partial_city_record_fills_gaps() {
        let mut city = geoip2::City::default();
        city.country.iso_code = Some("KR");
        city.country.names.english = Some("South Korea");
        city.location.latitude = Some(37.5665);

        let record = GeoRecord::from_city(&city);

        assert_eq!(record.country_name, "South Korea");
        assert_eq!(record.iso_code, "KR");
        assert_eq!(record.city_name, UNKNOWN);
        assert_eq!(record.postal_code, UNKNOWN);
        assert_eq!(record.latitude, 37.5665);
        assert_eq!(record.longitude, 0.0);
    }

    #[test]
    fn empty_city_record_is_all_placeholders() {
        let city = geoip2::City::default();
        assert_eq!(GeoRecord::from_city(&city), GeoRecord::default());
    }

    #[test]
    fn default_record_uses_placeholders() {
        let record = GeoRecord::default();
        assert_eq!(record.country_name, "Unknown");
        assert_eq!(record.iso_code, "Unknown");
        assert_eq!(record.city_name, "Unknown");
        assert_eq!(record.postal_code, "Unknown");
        assert_eq!(record.latitude, 0.0);
        assert_eq!(record.longitude, 0.0);
    }
}
