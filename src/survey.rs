//! Survey export loading and visit-to-survey matching.
//!
//! The export is delimited text. The first two rows are header metadata;
//! column 0 holds the response identifier and column 7 the submission time.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info};

pub const HEADER_ROWS: usize = 2;
pub const ID_COLUMN: usize = 0;
pub const TIMESTAMP_COLUMN: usize = 7;

/// A survey response is attributed to a visit when submitted within this
/// many milliseconds after the visit started.
pub const MATCH_WINDOW_MS: i64 = 600_000;

const DELIMITER: u8 = b',';

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"];

// Smaller epoch values are seconds, larger are milliseconds.
const EPOCH_MILLIS_THRESHOLD: u64 = 100_000_000_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyTable {
    pub rows: Vec<Vec<String>>,
}

impl SurveyTable {
    /// Reads and parses the survey file at `path`.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading survey file {}", path.display()))?;

        let table = Self::parse(&bytes)
            .with_context(|| format!("parsing survey file {}", path.display()))?;

        info!(rows = table.rows.len(), "Survey loaded");
        Ok(table)
    }

    /// Parses delimited text; every field is kept verbatim as text.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(DELIMITER)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self { rows })
    }

    /// Identifier of the first response, in table order, submitted strictly
    /// after `visit_timestamp` (seconds) and within [`MATCH_WINDOW_MS`].
    /// Returns an empty string when nothing qualifies.
    pub fn match_visit(&self, visit_timestamp: i64) -> &str {
        let visit_ms = visit_timestamp.saturating_mul(1000);

        self.rows
            .iter()
            .skip(HEADER_ROWS)
            .find(|row| {
                row.get(TIMESTAMP_COLUMN)
                    .and_then(|cell| parse_survey_timestamp(cell))
                    .and_then(|ts| ts.checked_sub(visit_ms))
                    .is_some_and(|delta| delta > 0 && delta <= MATCH_WINDOW_MS)
            })
            .and_then(|row| row.get(ID_COLUMN))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Survey identifier for a visit, or an empty string when no survey is loaded.
pub fn survey_id_for(survey: Option<&SurveyTable>, visit_timestamp: i64) -> &str {
    survey.map_or("", |table| table.match_visit(visit_timestamp))
}

/// Parses a submission time into epoch milliseconds.
pub fn parse_survey_timestamp(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    if let Ok(n) = cell.parse::<i64>() {
        return if n.unsigned_abs() < EPOCH_MILLIS_THRESHOLD {
            n.checked_mul(1000)
        } else {
            Some(n)
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.timestamp_millis());
    }

    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis());

    if parsed.is_none() {
        debug!(cell, "Unparseable survey timestamp");
    }
    parsed
}
