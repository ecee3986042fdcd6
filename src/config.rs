//! Type-safe configuration loader using the `config` crate,
//! with manual environment-variable overrides for core settings.

use config::{Config, File};
use serde::Deserialize;
use std::env;

use crate::errors::EnrichError;

/// Default location of the GeoLite2 City database, relative to the working directory.
pub const DEFAULT_GEO_DB_PATH: &str = "./GeoLite2-City.mmdb";

/// Default feed file, relative to the working directory.
pub const DEFAULT_INPUT_PATH: &str = "source-data.txt";

/// Application settings: built-in defaults, then `Config.toml` (if present),
/// then environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Path of the GeoLite2-City `.mmdb` file
    pub geo_db_path: String,

    /// Path of the threat-feed CSV to enrich
    pub input_path: String,

    /// Where to drop the Prometheus text exposition after a run (optional)
    #[serde(default)]
    pub metrics_path: Option<String>,
}

impl Settings {
    /// Load settings from `Config.toml` (if present),
    /// then apply any overrides from these environment variables:
    ///
    /// - `APP__GEO_DB_PATH`
    /// - `APP__INPUT_PATH`
    /// - `APP__METRICS_PATH`
    pub fn new() -> Result<Self, EnrichError> {
        Self::load("Config")
    }

    /// Same as [`Settings::new`] but reads the named config file instead of `Config`.
    /// The extension may be omitted; a missing file is not an error.
    pub fn load(name: &str) -> Result<Self, EnrichError> {
        // 1) Defaults, then the optional file on top
        let cfg = Config::builder()
            .set_default("geo_db_path", DEFAULT_GEO_DB_PATH)?
            .set_default("input_path", DEFAULT_INPUT_PATH)?
            .add_source(File::with_name(name).required(false))
            .build()?;

        let mut settings: Settings = cfg.try_deserialize()?;

        // 2) Manual overrides for core settings
        if let Ok(val) = env::var("APP__GEO_DB_PATH") {
            settings.geo_db_path = val;
        }
        if let Ok(val) = env::var("APP__INPUT_PATH") {
            settings.input_path = val;
        }
        if let Ok(val) = env::var("APP__METRICS_PATH") {
            settings.metrics_path = Some(val);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("absent");

        let settings = Settings::load(name.to_str().unwrap()).unwrap();

        if env::var("APP__GEO_DB_PATH").is_err() {
            assert_eq!(settings.geo_db_path, DEFAULT_GEO_DB_PATH);
        }
        if env::var("APP__INPUT_PATH").is_err() {
            assert_eq!(settings.input_path, DEFAULT_INPUT_PATH);
        }
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "input_path = [unterminated").unwrap();

        let err = Settings::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, EnrichError::Config(_)), "got {err:?}");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enricher.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "input_path = \"feeds/urlhaus.csv\"").unwrap();
        writeln!(file, "metrics_path = \"/var/lib/node_exporter/enricher.prom\"").unwrap();

        let settings = Settings::load(path.to_str().unwrap()).unwrap();

        if env::var("APP__INPUT_PATH").is_err() {
            assert_eq!(settings.input_path, "feeds/urlhaus.csv");
        }
        if env::var("APP__METRICS_PATH").is_err() {
            assert_eq!(
                settings.metrics_path.as_deref(),
                Some("/var/lib/node_exporter/enricher.prom")
            );
        }
        if env::var("APP__GEO_DB_PATH").is_err() {
            assert_eq!(settings.geo_db_path, DEFAULT_GEO_DB_PATH);
        }
    }
}
