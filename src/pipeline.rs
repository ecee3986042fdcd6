//! pipeline.rs
//!
//! Core enrichment loop: read feed lines, parse, resolve each address,
//! and write one CSV row per located address.

use std::borrow::Cow;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::errors::EnrichError;
use crate::geo::{GeoLookup, GeoRecord};
use crate::metrics::{LINES_READ, LINES_SKIPPED, LOOKUP_HISTOGRAM, LOOKUP_MISSES, ROWS_EMITTED};
use crate::record::{parse_line, CsvRow, ParseOutcome};

/// Render the output row for one located address, newline included.
pub fn format_row(row: &CsvRow, ip: &str, geo: &GeoRecord) -> String {
    format!(
        "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"\n",
        row.date_added, geo.iso_code, row.url_status, row.last_online, ip, row.url, row.threat
    )
}

/// Strip the `\n` / `\r\n` terminator and decode lossily.
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

/// Tallies for a single run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub rows_emitted: u64,
    pub lookup_misses: u64,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.lines_read += other.lines_read;
        self.lines_skipped += other.lines_skipped;
        self.rows_emitted += other.rows_emitted;
        self.lookup_misses += other.lookup_misses;
    }
}

/// Drives parse → lookup → write over a feed, one line at a time.
pub struct Pipeline<G> {
    resolver: G,
}

impl<G: GeoLookup> Pipeline<G> {
    /// The resolver must already be usable; an unopened one fails on the first lookup.
    pub fn new(resolver: G) -> Self {
        Pipeline { resolver }
    }

    pub fn resolver(&self) -> &G {
        &self.resolver
    }

    /// Open `path` and run the whole feed through [`Pipeline::run`].
    pub async fn run_file<W>(&self, path: &str, out: &mut W) -> Result<RunSummary, EnrichError>
    where
        W: AsyncWrite + Unpin,
    {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| EnrichError::Io {
                path: path.to_string(),
                source,
            })?;
        info!(path, "Reading feed");
        self.run(BufReader::new(file), out).await
    }

    /// Consume `input` to the end, writing enriched rows to `out` in input order.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD rather than ending the run.
    /// Stops at the first read, write or resolver error; rows already written stay written.
    pub async fn run<R, W>(&self, mut input: R, out: &mut W) -> Result<RunSummary, EnrichError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let n = input
                .read_until(b'\n', &mut buf)
                .await
                .map_err(EnrichError::Read)?;
            if n == 0 {
                break;
            }
            let line = decode_line(&buf);
            summary.absorb(self.process_line(&line, out).await?);
        }

        info!(
            lines_read    = summary.lines_read,
            lines_skipped = summary.lines_skipped,
            rows_emitted  = summary.rows_emitted,
            lookup_misses = summary.lookup_misses,
            elapsed_s     = started.elapsed().as_secs_f64(),
            "Feed enrichment complete"
        );

        Ok(summary)
    }

    /// Handle one line: zero or more rows out, one diagnostic per unlocated address.
    pub async fn process_line<W>(&self, line: &str, out: &mut W) -> Result<RunSummary, EnrichError>
    where
        W: AsyncWrite + Unpin,
    {
        LINES_READ.inc();
        let mut summary = RunSummary {
            lines_read: 1,
            ..RunSummary::default()
        };

        let parsed = match parse_line(line) {
            ParseOutcome::Record(parsed) => parsed,
            ParseOutcome::Skip(reason) => {
                debug!(?reason, "Skipping feed line");
                LINES_SKIPPED.inc();
                summary.lines_skipped = 1;
                return Ok(summary);
            }
        };

        for ip in &parsed.ips {
            let timer = LOOKUP_HISTOGRAM.start_timer();
            let located = self.resolver.resolve(ip)?;
            timer.observe_duration();

            match located {
                Some(geo) => {
                    out.write_all(format_row(&parsed.row, ip, &geo).as_bytes())
                        .await
                        .map_err(EnrichError::Write)?;
                    ROWS_EMITTED.inc();
                    summary.rows_emitted += 1;
                }
                None => {
                    warn!(
                        ip  = %ip,
                        id  = %parsed.row.id,
                        url = %parsed.row.url,
                        "No GeoIP data for address"
                    );
                    LOOKUP_MISSES.inc();
                    summary.lookup_misses += 1;
                }
            }
        }

        Ok(summary)
    }
}
