//! Workbook ingestion via calamine
//!
//! Year sheets are those whose names are exactly a 4-digit year, processed
//! in ascending numeric order. The optional "Summary" sheet is indexed
//! positionally: row k describes the k-th year sheet (columns: vendor,
//! tool type, inspection date, start odometer, end odometer). A leading
//! header row is skipped when its first cell reads like a caption.

use calamine::{open_workbook_auto, Data, Reader};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::{IngestError, SummaryEntry};
use crate::types::{CellValue, ParsedRun, ToolType};

fn year_sheet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // literal pattern, checked by tests
    RE.get_or_init(|| Regex::new(r"^\d{4}$").unwrap())
}

/// Map a calamine cell onto the raw cell model. Date cells keep their
/// serial value so the date parser sees the original number.
fn to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => {
            if s.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

fn parse_summary(rows: &[Vec<CellValue>]) -> Vec<SummaryEntry> {
    let mut entries = Vec::new();
    let mut rows = rows.iter();

    // A caption row ("Vendor", ...) is metadata about the table, not a run.
    let mut peeked: Option<&Vec<CellValue>> = rows.next();
    if let Some(first) = peeked {
        let caption = first
            .first()
            .map(|c| c.as_text().to_ascii_lowercase())
            .unwrap_or_default();
        if caption == "vendor" || caption == "year" {
            peeked = rows.next();
        }
    }

    while let Some(row) = peeked {
        let get = |i: usize| row.get(i).cloned().unwrap_or(CellValue::Empty);
        entries.push(SummaryEntry {
            vendor: get(0).as_text(),
            tool_type_raw: get(1).as_text(),
            raw_date: get(2),
            start_odometer_ft: get(3).as_number(),
            end_odometer_ft: get(4).as_number(),
        });
        peeked = rows.next();
    }
    entries
}

/// Ingest every year sheet of a workbook.
pub fn ingest_workbook(path: &Path) -> Result<Vec<ParsedRun>, IngestError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| IngestError::Workbook(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut year_sheets: Vec<(i32, String)> = sheet_names
        .iter()
        .filter(|name| year_sheet_regex().is_match(name))
        .filter_map(|name| name.parse::<i32>().ok().map(|y| (y, name.clone())))
        .collect();
    year_sheets.sort_by_key(|(year, _)| *year);

    if year_sheets.is_empty() {
        return Err(IngestError::NoYearSheets);
    }

    // Optional Summary sheet, positional per year sheet.
    let summary: Vec<SummaryEntry> = sheet_names
        .iter()
        .find(|name| name.eq_ignore_ascii_case("summary"))
        .and_then(|name| workbook.worksheet_range(name).ok())
        .map(|range| {
            let rows: Vec<Vec<CellValue>> = range
                .rows()
                .map(|row| row.iter().map(to_cell).collect())
                .collect();
            parse_summary(&rows)
        })
        .unwrap_or_default();

    if !summary.is_empty() && summary.len() < year_sheets.len() {
        warn!(
            summary_rows = summary.len(),
            year_sheets = year_sheets.len(),
            "Summary sheet has fewer rows than year sheets; trailing years get no metadata"
        );
    }

    let mut runs = Vec::with_capacity(year_sheets.len());
    for (index, (year, sheet_name)) in year_sheets.iter().enumerate() {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| IngestError::Workbook(e.to_string()))?;

        let mut rows_iter = range.rows();
        let headers: Vec<String> = rows_iter
            .next()
            .ok_or_else(|| IngestError::EmptySheet(sheet_name.clone()))?
            .iter()
            .map(|c| to_cell(c).as_text())
            .collect();

        let rows: Vec<Vec<CellValue>> = rows_iter
            .map(|row| row.iter().map(to_cell).collect())
            .filter(|row: &Vec<CellValue>| row.iter().any(|c| !c.is_blank()))
            .collect();

        let meta = summary.get(index).cloned().unwrap_or_default();
        debug!(year, rows = rows.len(), vendor = %meta.vendor, "Parsed year sheet");

        runs.push(ParsedRun {
            year: *year,
            label: format!("{year} {}", meta.vendor).trim().to_string(),
            vendor: meta.vendor,
            tool_type: ToolType::parse(&meta.tool_type_raw),
            raw_date: meta.raw_date,
            start_odometer_ft: meta.start_odometer_ft,
            end_odometer_ft: meta.end_odometer_ft,
            headers,
            rows,
        });
    }

    info!(
        path = %path.display(),
        runs = runs.len(),
        "Workbook ingested"
    );
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_sheet_names_must_be_exactly_four_digits() {
        let re = year_sheet_regex();
        assert!(re.is_match("2015"));
        assert!(!re.is_match("2015 MFL"));
        assert!(!re.is_match("Summary"));
        assert!(!re.is_match("201"));
    }

    #[test]
    fn summary_rows_map_positionally_with_header_skip() {
        let rows = vec![
            vec![
                CellValue::Text("Vendor".into()),
                CellValue::Text("Tool".into()),
            ],
            vec![
                CellValue::Text("Acme".into()),
                CellValue::Text("MFL".into()),
                CellValue::Number(42_005.0),
                CellValue::Number(0.0),
                CellValue::Number(5280.0),
            ],
        ];
        let entries = parse_summary(&rows);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].vendor, "Acme");
        // Raw serial preserved, not coerced to a date
        assert_eq!(entries[0].raw_date, CellValue::Number(42_005.0));
        assert_eq!(entries[0].end_odometer_ft, Some(5280.0));
    }

    #[test]
    fn summary_without_header_row() {
        let rows = vec![vec![
            CellValue::Text("Baker Tools".into()),
            CellValue::Text("UT".into()),
        ]];
        let entries = parse_summary(&rows);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].vendor, "Baker Tools");
        assert_eq!(entries[0].raw_date, CellValue::Empty);
    }
}
