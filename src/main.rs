//! Entrypoint: set up tracing, open the GeoLite2 database, and stream the
//! threat feed through the enrichment pipeline.
//!
//! This application uses a strongly-typed configuration (`Settings`) defined in `config.rs`,
//! which provides:
//!  - `geo_db_path`   – GeoLite2-City `.mmdb` file (default `./GeoLite2-City.mmdb`)
//!  - `input_path`    – Feed to enrich (default `source-data.txt`)
//!  - `metrics_path`  – Optional Prometheus textfile written after the run

use std::process::ExitCode;

use anyhow::Context;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use feed_geo_enricher::config::Settings;
use feed_geo_enricher::geo::GeoResolver;
use feed_geo_enricher::metrics;
use feed_geo_enricher::pipeline::Pipeline;

/// Application entrypoint for the feed enricher.
///
/// **Workflow**:
/// 1. Initialise tracing/logging on stderr from `RUST_LOG` (or default to `info`).
/// 2. Load `Config.toml` (and apply any `APP__…` env-var overrides).
/// 3. Open the GeoLite2-City database; failure here ends the run.
/// 4. Stream the feed, writing enriched rows to stdout.
/// 5. Optionally dump metrics for a textfile collector.
#[tokio::main]
async fn main() -> ExitCode {
    // ───────────────────────────────────────────────────────────────
    // 1. Initialise tracing / logging (stdout is reserved for rows)
    // ───────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Feed processing failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // ───────────────────────────────────────────────────────────────
    // 2. Load configuration
    // ───────────────────────────────────────────────────────────────
    let settings = Settings::new().context("loading configuration")?;
    info!(?settings, "Loaded configuration");

    // ───────────────────────────────────────────────────────────────
    // 3. GeoIP database, opened once before any input is read
    // ───────────────────────────────────────────────────────────────
    let mut resolver = GeoResolver::new(settings.geo_db_path.clone());
    resolver
        .open()
        .await
        .context("opening GeoIP database")?;
    if let Some((database_type, build_epoch)) = resolver.metadata() {
        info!(
            path = %settings.geo_db_path,
            database_type,
            build_epoch,
            "Opened GeoIP database"
        );
    }

    // ───────────────────────────────────────────────────────────────
    // 4. Enrichment pass
    // ───────────────────────────────────────────────────────────────
    let pipeline = Pipeline::new(resolver);
    let mut stdout = BufWriter::new(tokio::io::stdout());
    let result = pipeline.run_file(&settings.input_path, &mut stdout).await;

    // Rows written before a failure still go out.
    let flushed = stdout.flush().await;
    result.context("processing feed")?;
    flushed.context("flushing stdout")?;

    // ───────────────────────────────────────────────────────────────
    // 5. Metrics textfile
    // ───────────────────────────────────────────────────────────────
    if let Some(path) = &settings.metrics_path {
        metrics::write_metrics(path)
            .await
            .with_context(|| format!("writing metrics to {path}"))?;
        info!(path = %path, "Wrote metrics");
    }

    Ok(())
}
