//! record.rs
//!
//! Turns one raw feed line into a typed row plus the distinct IPv4 literals it mentions.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Number of quoted columns every feed row must carry.
pub const FIELD_COUNT: usize = 9;

/// A double-quoted column, quotes included in the match.
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("column regex"));

/// Loose dotted-quad: octets are not range-checked. Word boundaries are
/// ASCII-only, so an address glued to a non-ASCII letter still matches.
static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u:\b)[0-9]{1,3}(?:\.[0-9]{1,3}){3}(?-u:\b)").expect("ipv4 regex")
});

/// One URLhaus-style feed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub id: String,
    pub date_added: String,
    pub url: String,
    pub url_status: String,
    pub last_online: String,
    pub threat: String,
    pub tags: String,
    pub urlhaus_link: String,
    pub reporter: String,
}

impl CsvRow {
    /// Build a row from positional fields. Returns `None` when fewer than
    /// [`FIELD_COUNT`] are supplied; anything past the ninth is ignored.
    pub fn from_fields<I, S>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut it = fields.into_iter().map(Into::into);
        Some(CsvRow {
            id: it.next()?,
            date_added: it.next()?,
            url: it.next()?,
            url_status: it.next()?,
            last_online: it.next()?,
            threat: it.next()?,
            tags: it.next()?,
            urlhaus_link: it.next()?,
            reporter: it.next()?,
        })
    }
}

/// A usable line: its columns and the addresses to look up, first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub row: CsvRow,
    pub ips: Vec<String>,
}

/// Why a line produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    Comment,
    /// Carries the number of quoted columns actually found.
    TooFewFields(usize),
    NoAddresses,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Record(ParsedLine),
    Skip(SkipReason),
}

/// Parse one feed line (trailing newline already removed).
///
/// Columns come from the trimmed line; addresses are searched for in the
/// untrimmed line, not only in the URL column.
pub fn parse_line(line: &str) -> ParseOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ParseOutcome::Skip(SkipReason::Blank);
    }
    if trimmed.starts_with('#') {
        return ParseOutcome::Skip(SkipReason::Comment);
    }

    let columns: Vec<&str> = COLUMN_RE
        .captures_iter(trimmed)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let found = columns.len();
    let row = match CsvRow::from_fields(columns) {
        Some(row) => row,
        None => return ParseOutcome::Skip(SkipReason::TooFewFields(found)),
    };

    let ips = extract_ipv4(line);
    if ips.is_empty() {
        return ParseOutcome::Skip(SkipReason::NoAddresses);
    }

    ParseOutcome::Record(ParsedLine { row, ips })
}

/// Every distinct dotted-quad in `text`, in order of first appearance.
pub fn extract_ipv4(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IPV4_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|ip| seen.insert(*ip))
        .map(str::to_string)
        .collect()
}
