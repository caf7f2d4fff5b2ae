//! Clock-position normalizer
//!
//! ILI tools report circumferential position as a 12-hour clock (12:00 =
//! top of pipe). Sheets encode it every way imaginable: "7:30" text, 7.5
//! decimal hours, 0.3125 fractional day, or a true time-typed cell. The
//! normalizer maps all of them onto decimal hours in (0, 12], keeping the
//! raw string alongside.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::CellValue;

/// Normalized clock position: the raw cell text plus decimal hours in
/// (0, 12] when parseable.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockPosition {
    pub raw: String,
    pub decimal: Option<f64>,
}

fn hm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // literal pattern, checked by tests
    RE.get_or_init(|| Regex::new(r"^\s*(\d{1,2})\s*[:.]\s*(\d{1,2})\s*$").unwrap())
}

/// Fold any hour value onto (0, 12], mapping 0 to 12.
fn wrap_hours(hours: f64) -> f64 {
    let wrapped = hours.rem_euclid(12.0);
    if wrapped == 0.0 {
        12.0
    } else {
        wrapped
    }
}

/// Normalize one raw clock cell.
///
/// Rules, in order: empty → null; numeric in [0, 1] treated as a fractional
/// day; other numerics as decimal hours; "h:m" text; numeric-parseable
/// text; everything else keeps the raw string with a null decimal.
pub fn normalize_clock(cell: &CellValue) -> ClockPosition {
    if cell.is_blank() {
        return ClockPosition {
            raw: cell.as_text(),
            decimal: None,
        };
    }

    match cell {
        CellValue::Date(dt) => {
            use chrono::Timelike;
            let hours = f64::from(dt.hour()) + f64::from(dt.minute()) / 60.0;
            ClockPosition {
                raw: cell.as_text(),
                decimal: Some(wrap_hours(hours)),
            }
        }
        CellValue::Number(n) => ClockPosition {
            raw: cell.as_text(),
            decimal: n.is_finite().then(|| from_numeric(*n)),
        },
        CellValue::Text(s) => {
            let raw = s.trim().to_string();
            let decimal = parse_clock_text(&raw);
            ClockPosition { raw, decimal }
        }
        _ => ClockPosition {
            raw: cell.as_text(),
            decimal: None,
        },
    }
}

/// Numeric cell: fractional-day in [0, 1], decimal hours otherwise.
fn from_numeric(n: f64) -> f64 {
    if (0.0..=1.0).contains(&n) {
        wrap_hours(n * 24.0)
    } else {
        wrap_hours(n)
    }
}

fn parse_clock_text(raw: &str) -> Option<f64> {
    if let Some(caps) = hm_regex().captures(raw) {
        let h: f64 = caps.get(1)?.as_str().parse().ok()?;
        let m: f64 = caps.get(2)?.as_str().parse().ok()?;
        if m >= 60.0 {
            return None;
        }
        return Some(wrap_hours(h % 12.0 + m / 60.0));
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite()).map(from_numeric)
}

/// Circular distance between two clock positions, in hours ∈ [0, 6].
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let diff = (a.rem_euclid(12.0) - b.rem_euclid(12.0)).abs();
    diff.min(12.0 - diff)
}
