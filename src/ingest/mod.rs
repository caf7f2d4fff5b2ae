//! Ingestor — tabular run sheets to `ParsedRun` records
//!
//! Two source shapes:
//! - **Workbook**: one sheet per inspection year (name = 4-digit year),
//!   plus an optional "Summary" sheet carrying per-year metadata.
//! - **CSV**: a single header-led table, ingested as one synthetic
//!   current-year run.
//!
//! Cells are preserved verbatim as [`CellValue`]s — in particular,
//! workbook date cells stay raw serial numbers so the date parser sees the
//! original value.

mod csv_source;
mod workbook;

pub use csv_source::ingest_csv;
pub use workbook::ingest_workbook;

use thiserror::Error;

use crate::types::CellValue;

/// Ingestion errors. These are input errors: they fail the ingest stage
/// with a structured message.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no year sheets found (expected sheet names matching \\d{{4}})")]
    NoYearSheets,

    #[error("sheet {0:?} has no header row")]
    EmptySheet(String),
}

/// Per-year metadata pulled from a workbook's Summary sheet.
#[derive(Debug, Clone, Default)]
pub struct SummaryEntry {
    pub vendor: String,
    pub tool_type_raw: String,
    /// Raw inspection-date cell, never pre-coerced
    pub raw_date: CellValue,
    pub start_odometer_ft: Option<f64>,
    pub end_odometer_ft: Option<f64>,
}
