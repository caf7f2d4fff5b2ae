//! Raw tabular cell values
//!
//! Ingestion preserves cells exactly as read so that downstream parsers
//! (dates, clocks, numerics) see the original value. In particular, workbook
//! date cells are carried as their raw serial number — never pre-coerced.

use serde::{Deserialize, Serialize};

/// One raw cell from a run sheet, prior to any normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Missing or blank cell
    Empty,
    /// Numeric cell (includes workbook date serials, kept raw)
    Number(f64),
    /// Text cell
    Text(String),
    /// Boolean cell (rare in run sheets, kept for completeness)
    Bool(bool),
    /// Date-typed cell from a source that coerces natively (workbook
    /// ingestion deliberately keeps serials as `Number` instead)
    Date(chrono::NaiveDateTime),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl CellValue {
    /// True for `Empty` and for whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view: the number itself, or a parse of the text.
    /// Non-finite values are treated as absent.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Text view: owned trimmed string, or empty for non-text cells.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

/// Format a numeric cell the way run sheets print them: integers without a
/// trailing `.0`, everything else via the shortest f64 display.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
