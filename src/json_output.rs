use serde_json::json;

use crate::batch::BatchReport;
use crate::parser::{CandidateRecord, ExtentCount, ExtentListing};

/// JSON output formatter for CLI commands
pub struct JsonOutput;

impl JsonOutput {
    pub fn candidates(records: &[CandidateRecord]) -> String {
        json!({
            "status": "success",
            "candidates": records,
            "count": records.len(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }

    pub fn extents(listing: &ExtentListing) -> String {
        json!({
            "status": "success",
            "files": listing,
            "file_count": listing.len(),
            "extent_count": listing.total_extents(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }

    pub fn extent_counts(counts: &[ExtentCount]) -> String {
        json!({
            "status": "success",
            "files": counts,
            "count": counts.len(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }

    /// Raw passthrough of the utility's output
    pub fn raw(text: &str) -> String {
        json!({
            "status": "success",
            "raw": text,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }

    pub fn batch(report: &BatchReport) -> String {
        json!({
            "status": "success",
            "batch": report,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }

    /// Format success response
    pub fn success(data: serde_json::Value) -> String {
        json!({
            "status": "success",
            "data": data,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }

    /// Format error as JSON
    pub fn error(message: &str, code: i32) -> String {
        json!({
            "error": {
                "message": message,
                "code": code
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
        .to_string()
    }
}

/// Pretty-printing utilities
pub struct JsonPretty;

impl JsonPretty {
    /// Pretty-print JSON with indentation
    pub fn format(json_str: &str) -> anyhow::Result<String> {
        let value: serde_json::Value = serde_json::from_str(json_str)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}
