//! Parsers for the text formats printed by `snfsdefrag`.
//!
//! Only the shapes this crate consumes are understood: extent listings (`-e`),
//! candidate listings (`-l`, optionally verbose) and extent counts (`-c`).
//! Anything else is skipped rather than rejected.

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{DefragError, Result};

/// Prefix the utility puts on fatal responses
pub const ERROR_PREFIX: &str = "Error: ";

static VERBOSE_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+?): (?P<count>\d+) extents?:(?: (?P<message>.*))?$").expect("valid regex")
});

static EXTENT_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<path>.+): (?P<count>\d+) extents?$").expect("valid regex"));

/// One extent row keyed by the column headers of its block.
///
/// Fields keep the header's column order and serialize as a JSON object in
/// that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentRecord(Vec<(String, String)>);

impl ExtentRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Fields in column order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtentRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ExtentRecord(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for ExtentRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Extent rows grouped by file path, rows kept in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtentListing(BTreeMap<String, Vec<ExtentRecord>>);

impl ExtentListing {
    pub fn get(&self, path: &str) -> Option<&[ExtentRecord]> {
        self.0.get(path).map(Vec::as_slice)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ExtentRecord])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of files in the listing
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_extents(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

/// A file the utility considers fragmented enough to defragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub path: String,
    /// Present only in verbose listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CandidateRecord {
    pub fn bare(path: impl Into<String>) -> Self {
        CandidateRecord {
            path: path.into(),
            extent_count: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentCount {
    pub path: String,
    pub extent_count: u64,
}

/// Whether a listing operation hands back raw text or parsed records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    Raw,
    #[default]
    Structured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response<T> {
    Raw(String),
    Records(T),
}

impl<T> Response<T> {
    pub fn records(self) -> Option<T> {
        match self {
            Response::Records(records) => Some(records),
            Response::Raw(_) => None,
        }
    }
}

/// Parse an extent listing.
///
/// Blocks are separated by blank lines. Each block is a `path:` line, a
/// header row, then one row per extent. Blocks missing a header or rows are
/// skipped.
pub fn parse_extents(text: &str) -> ExtentListing {
    let mut listing = ExtentListing::default();

    for block in blocks(text) {
        let mut lines = block.into_iter();
        let Some(path_line) = lines.next() else { continue };
        let Some(header_line) = lines.next() else {
            log::debug!("skipping extent block without header: {}", path_line);
            continue;
        };

        let path = path_line.trim().trim_end_matches(':').to_string();
        if path.is_empty() {
            continue;
        }
        let header: Vec<&str> = header_line.split_whitespace().collect();

        let rows: Vec<ExtentRecord> = lines
            .map(|line| {
                header
                    .iter()
                    .copied()
                    .zip(line.split_whitespace())
                    .collect::<ExtentRecord>()
            })
            .filter(|record| !record.is_empty())
            .collect();

        if rows.is_empty() {
            log::debug!("skipping extent block without rows: {}", path);
            continue;
        }

        listing.0.entry(path).or_default().extend(rows);
    }

    listing
}

/// Parse a candidate listing.
///
/// In verbose mode only `<path>: <N> extent(s): <message>` lines are kept;
/// otherwise every non-blank line is a bare path.
pub fn parse_candidates(text: &str, verbose: bool) -> Result<Vec<CandidateRecord>> {
    reject_error_response(text)?;

    let lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

    if !verbose {
        return Ok(lines.map(CandidateRecord::bare).collect());
    }

    Ok(lines
        .filter_map(|line| {
            let caps = VERBOSE_CANDIDATE.captures(line)?;
            Some(CandidateRecord {
                path: caps["path"].to_string(),
                extent_count: caps["count"].parse().ok(),
                message: Some(caps.name("message").map_or("", |m| m.as_str()).to_string()),
            })
        })
        .collect())
}

/// Parse `-c` output: `<path>: <N> extent(s)` per file
pub fn parse_extent_counts(text: &str) -> Result<Vec<ExtentCount>> {
    reject_error_response(text)?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            let caps = EXTENT_COUNT.captures(line)?;
            Some(ExtentCount {
                path: caps["path"].to_string(),
                extent_count: caps["count"].parse().ok()?,
            })
        })
        .collect())
}

fn reject_error_response(text: &str) -> Result<()> {
    if text.trim_start().starts_with(ERROR_PREFIX) {
        return Err(DefragError::ToolReported(text.trim().to_string()));
    }
    Ok(())
}

/// Split text into runs of non-blank lines
fn blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}
