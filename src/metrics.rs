//! Prometheus metrics registry and metric definitions.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::path::Path;

/// Global registry under crate namespace
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("feed_geo_enricher".into()), None)
        .expect("failed to create Prometheus registry")
});

fn register_counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("counter opts");
    REGISTRY.register(Box::new(c.clone())).unwrap();
    c
}

/// Input lines pulled from the feed
pub static LINES_READ: Lazy<IntCounter> =
    Lazy::new(|| register_counter("lines_read_total", "Total number of feed lines read"));

/// Blank, comment, malformed or address-less lines
pub static LINES_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "lines_skipped_total",
        "Total number of feed lines skipped without output",
    )
});

/// Enriched rows written to the output
pub static ROWS_EMITTED: Lazy<IntCounter> =
    Lazy::new(|| register_counter("rows_emitted_total", "Total number of enriched rows emitted"));

/// Addresses with no entry in the GeoIP database
pub static LOOKUP_MISSES: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "lookup_misses_total",
        "Total number of addresses absent from the GeoIP database",
    )
});

/// Histogram of single-address lookup durations
pub static LOOKUP_HISTOGRAM: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "lookup_duration_seconds",
        "Duration of one GeoIP lookup in seconds",
    )
    .buckets(prometheus::exponential_buckets(0.000_001, 4.0, 10).expect("bucket layout"));
    let h = Histogram::with_opts(opts).expect("histogram opts");
    REGISTRY.register(Box::new(h.clone())).unwrap();
    h
});

/// Encode all metrics as text
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let mf = REGISTRY.gather();
    encoder.encode(&mf, &mut buffer).expect("failed to encode");
    String::from_utf8(buffer).expect("invalid utf8")
}

/// Write the text exposition to `path`, for a node_exporter textfile collector.
pub async fn write_metrics(path: impl AsRef<Path>) -> std::io::Result<()> {
    tokio::fs::write(path, gather_metrics()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exposition_names_every_counter() {
        LINES_READ.inc();
        ROWS_EMITTED.inc();
        LOOKUP_HISTOGRAM.observe(0.000_2);
        Lazy::force(&LINES_SKIPPED);
        Lazy::force(&LOOKUP_MISSES);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enricher.prom");
        write_metrics(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        for name in [
            "feed_geo_enricher_lines_read_total",
            "feed_geo_enricher_lines_skipped_total",
            "feed_geo_enricher_rows_emitted_total",
            "feed_geo_enricher_lookup_misses_total",
            "feed_geo_enricher_lookup_duration_seconds",
        ] {
            assert!(text.contains(name), "missing {name} in:\n{text}");
        }
    }
}
