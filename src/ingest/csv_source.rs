//! CSV ingestion
//!
//! A CSV is a single header-led table with no per-year metadata, ingested
//! as one synthetic current-year run. Cells stay text; numeric coercion
//! happens downstream where each column's meaning is known.

use chrono::Datelike;
use std::path::Path;
use tracing::info;

use super::IngestError;
use crate::types::{CellValue, ParsedRun, ToolType};

/// Ingest a single CSV as one synthetic current-year run.
pub fn ingest_csv(path: &Path) -> Result<ParsedRun, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() {
        return Err(IngestError::EmptySheet(path.display().to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| {
                let trimmed = field.trim();
                if trimmed.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(trimmed.to_string())
                }
            })
            .collect();
        if row.iter().any(|c| !c.is_blank()) {
            rows.push(row);
        }
    }

    let year = chrono::Local::now().year();
    info!(path = %path.display(), year, rows = rows.len(), "CSV ingested as current-year run");

    Ok(ParsedRun {
        year,
        label: format!("{year} CSV import"),
        vendor: String::new(),
        tool_type: ToolType::Unknown,
        raw_date: CellValue::Empty,
        start_odometer_ft: None,
        end_odometer_ft: None,
        headers,
        rows,
    })
}
