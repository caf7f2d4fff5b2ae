//! Run and dataset model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{CellValue, DatasetId, RunId};

/// Inspection tool family, from the run sheet / summary metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolType {
    Mfl,
    Ut,
    Caliper,
    Combo,
    #[default]
    Unknown,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Mfl => "MFL",
            ToolType::Ut => "UT",
            ToolType::Caliper => "CALIPER",
            ToolType::Combo => "COMBO",
            ToolType::Unknown => "UNKNOWN",
        }
    }

    /// Parse vendor spellings ("MFL", "ut/mfl combo", "geometry", ...).
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase();
        if s.contains("combo") || (s.contains("mfl") && s.contains("ut")) {
            ToolType::Combo
        } else if s.contains("mfl") || s.contains("magnetic") {
            ToolType::Mfl
        } else if s.contains("ut") || s.contains("ultrason") {
            ToolType::Ut
        } else if s.contains("caliper") || s.contains("geometry") || s.contains("deform") {
            ToolType::Caliper
        } else {
            ToolType::Unknown
        }
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parsed inspection date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateSource {
    /// Jan 1 of a supplied context year (empty cell)
    ContextYear,
    /// Native date-typed value
    Native,
    /// Workbook serial day-count
    ExcelSerial,
    /// Unix epoch seconds
    UnixSeconds,
    /// Matched one of the string forms
    StringParsed,
    /// Canonicalization oracle fallback
    Oracle,
    /// Nothing usable
    Missing,
}

/// A parsed inspection date with provenance and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InspectionDate {
    pub date: Option<NaiveDate>,
    pub source: DateSource,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl InspectionDate {
    pub fn missing() -> Self {
        Self {
            date: None,
            source: DateSource::Missing,
            confidence: 0.0,
        }
    }
}

/// One inspection pass over the pipeline. Immutable once normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Store-assigned identifier (0 until persisted)
    #[serde(default)]
    pub id: RunId,
    /// Owning dataset
    pub dataset_id: DatasetId,
    /// Inspection year (sheet name or synthetic)
    pub year: i32,
    /// Free-text label ("2015 MFL", vendor designation, ...)
    pub label: String,
    /// Inspection vendor
    pub vendor: String,
    /// Tool family
    pub tool_type: ToolType,
    /// Parsed inspection date with provenance
    pub inspection_date: InspectionDate,
    /// Start odometer (ft), from the summary sheet when present
    pub start_odometer_ft: Option<f64>,
    /// End odometer (ft)
    pub end_odometer_ft: Option<f64>,
    /// Feature rows normalized from this run
    pub row_count: usize,
}

/// Dataset aggregate: the pipeline plus its runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub id: DatasetId,
    pub name: String,
    pub run_ids: Vec<RunId>,
    pub total_runs: usize,
    pub total_features: usize,
}

/// Raw output of the ingestor for one year sheet, before normalization.
///
/// Cells are preserved verbatim (`CellValue`) so the date parser and clock
/// normalizer see original values.
#[derive(Debug, Clone)]
pub struct ParsedRun {
    pub year: i32,
    pub label: String,
    pub vendor: String,
    pub tool_type: ToolType,
    /// Raw inspection-date cell from the summary sheet (never pre-coerced)
    pub raw_date: CellValue,
    pub start_odometer_ft: Option<f64>,
    pub end_odometer_ft: Option<f64>,
    /// Header row exactly as read
    pub headers: Vec<String>,
    /// Data rows, one `CellValue` per header column
    pub rows: Vec<Vec<CellValue>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_type_parsing() {
        assert_eq!(ToolType::parse("MFL"), ToolType::Mfl);
        assert_eq!(ToolType::parse("High-res magnetic flux"), ToolType::Mfl);
        assert_eq!(ToolType::parse("UT Wall"), ToolType::Ut);
        assert_eq!(ToolType::parse("geometry caliper"), ToolType::Caliper);
        assert_eq!(ToolType::parse("UT/MFL combo"), ToolType::Combo);
        assert_eq!(ToolType::parse("smart pig"), ToolType::Unknown);
    }
}
