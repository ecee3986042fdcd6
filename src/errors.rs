//! Centralised error type for the enricher.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("I/O error opening {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("GeoIP database error: {0}")]
    GeoDb(#[from] maxminddb::MaxMindDbError),

    #[error("GeoIP database is not opened; call open() first")]
    NotOpened,

    #[error("Failed to read input line: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write output row: {0}")]
    Write(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
