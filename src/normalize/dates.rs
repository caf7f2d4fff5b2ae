//! Inspection-date parser
//!
//! Run sheets carry inspection dates as workbook serials, Unix seconds,
//! half a dozen string forms, or nothing at all. The parser tries each
//! deterministic form in a fixed order, validates every candidate against
//! the plausible inspection window, and records the chosen source and a
//! confidence. It never returns an invalid date.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::oracle::{CanonOracle, OracleAnswer};
use crate::types::{CellValue, DateSource, InspectionDate};

/// Plausible inspection-year window.
const MIN_YEAR: i32 = 1950;
const MAX_YEAR: i32 = 2050;

/// Workbook serial range covering the year window (≈1950-01-02 .. ≈2050).
const SERIAL_MIN: f64 = 18_264.0;
const SERIAL_MAX: f64 = 54_789.0;

/// Unix-seconds range treated as a timestamp (2001-09 .. 2065-01).
const UNIX_MIN: f64 = 1.0e9;
const UNIX_MAX: f64 = 3.0e9;

struct DateForms {
    iso: Regex,
    us: Regex,
    textual: Regex,
    day_month: Regex,
    ymd_slash: Regex,
}

fn forms() -> &'static DateForms {
    static FORMS: OnceLock<DateForms> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // literal patterns, checked by tests
    FORMS.get_or_init(|| DateForms {
        iso: Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap(),
        us: Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap(),
        textual: Regex::new(r"^([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})$").unwrap(),
        day_month: Regex::new(r"^(\d{1,2})\s+([A-Za-z]{3,9})\.?\s+(\d{4})$").unwrap(),
        ymd_slash: Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})$").unwrap(),
    })
}

fn in_window(date: NaiveDate) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    MONTHS
        .iter()
        .position(|m| m.starts_with(&lower) || lower.starts_with(&m[..3]))
        .and_then(|i| {
            // Require at least a 3-letter prefix match against the right month
            let m = MONTHS[i];
            (lower.len() >= 3 && m.starts_with(&lower[..3.min(lower.len())]))
                .then_some(i as u32 + 1)
        })
}

/// Workbook serial → date, compensating for the fictitious 1900-02-29
/// (serials past 59 are one day ahead).
fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    let days = serial.floor() as i64;
    let base = NaiveDate::from_ymd_opt(1900, 1, 1)?;
    let mut offset = days - 1;
    if days > 59 {
        offset -= 1;
    }
    base.checked_add_signed(chrono::Duration::days(offset))
}

fn from_unix_seconds(secs: f64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.date_naive())
}

/// Try the string date forms in order.
fn parse_string_forms(raw: &str) -> Option<NaiveDate> {
    let f = forms();
    let s = raw.trim();

    if let Some(c) = f.iso.captures(s) {
        return build_date(&c[1], &c[2], &c[3]);
    }
    if let Some(c) = f.us.captures(s) {
        return build_date(&c[3], &c[1], &c[2]);
    }
    if let Some(c) = f.textual.captures(s) {
        let month = month_from_name(&c[1])?;
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[2].parse().ok()?);
    }
    if let Some(c) = f.day_month.captures(s) {
        let month = month_from_name(&c[2])?;
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[1].parse().ok()?);
    }
    if let Some(c) = f.ymd_slash.captures(s) {
        return build_date(&c[1], &c[2], &c[3]);
    }
    None
}

fn build_date(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Parse an inspection date from a raw cell.
///
/// `context_year` backstops empty cells (→ Jan 1, confidence 0.3). The
/// oracle is consulted only after every deterministic form has failed.
pub async fn parse_inspection_date(
    cell: &CellValue,
    context_year: Option<i32>,
    oracle: Option<&dyn CanonOracle>,
) -> InspectionDate {
    // Empty cell: context-year fallback or nothing.
    if cell.is_blank() {
        if let Some(year) = context_year {
            if let Some(date) = NaiveDate::from_ymd_opt(year, 1, 1) {
                return InspectionDate {
                    date: Some(date),
                    source: DateSource::ContextYear,
                    confidence: 0.3,
                };
            }
        }
        warn!("Inspection date cell empty and no context year available");
        return InspectionDate::missing();
    }

    // Native date-typed value: window check only.
    if let CellValue::Date(dt) = cell {
        let date = dt.date();
        if in_window(date) {
            return InspectionDate {
                date: Some(date),
                source: DateSource::Native,
                confidence: 1.0,
            };
        }
        warn!(year = date.year(), "Native date outside plausible window");
        return InspectionDate::missing();
    }

    if let CellValue::Number(n) = cell {
        // Workbook serial day-count.
        if (SERIAL_MIN..=SERIAL_MAX).contains(n) {
            if let Some(date) = from_excel_serial(*n).filter(|d| in_window(*d)) {
                return InspectionDate {
                    date: Some(date),
                    source: DateSource::ExcelSerial,
                    confidence: 1.0,
                };
            }
        }
        // Unix seconds.
        if (UNIX_MIN..=UNIX_MAX).contains(n) {
            if let Some(date) = from_unix_seconds(*n).filter(|d| in_window(*d)) {
                return InspectionDate {
                    date: Some(date),
                    source: DateSource::UnixSeconds,
                    confidence: 0.7,
                };
            }
        }
    }

    if let CellValue::Text(raw) = cell {
        if let Some(date) = parse_string_forms(raw).filter(|d| in_window(*d)) {
            return InspectionDate {
                date: Some(date),
                source: DateSource::StringParsed,
                confidence: 1.0,
            };
        }

        // Deterministic paths exhausted — ask the oracle.
        if let Some(oracle) = oracle {
            match oracle.resolve(raw).await {
                Ok(OracleAnswer::IsoDate(date)) if in_window(date) => {
                    return InspectionDate {
                        date: Some(date),
                        source: DateSource::Oracle,
                        confidence: 0.8,
                    };
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Date oracle failed; continuing without it"),
            }
        }
    }

    warn!(raw = %cell.as_text(), "Unparseable inspection date");
    InspectionDate::missing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::NullOracle;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn parse(cell: CellValue) -> InspectionDate {
        parse_inspection_date(&cell, None, Some(&NullOracle)).await
    }

    #[tokio::test]
    async fn empty_with_context_year() {
        let d = parse_inspection_date(&CellValue::Empty, Some(2015), None).await;
        assert_eq!(d.date, Some(ymd(2015, 1, 1)));
        assert_eq!(d.source, DateSource::ContextYear);
        assert!((d.confidence - 0.3).abs() < 1e-12);
    }

    #[tokio::test]
    async fn empty_without_context_year() {
        let d = parse(CellValue::Empty).await;
        assert_eq!(d.date, None);
        assert_eq!(d.source, DateSource::Missing);
    }

    #[tokio::test]
    async fn native_date_validated_against_window() {
        let dt = ymd(2015, 6, 1).and_hms_opt(8, 30, 0).unwrap();
        let d = parse(CellValue::Date(dt)).await;
        assert_eq!(d.date, Some(ymd(2015, 6, 1)));
        assert_eq!(d.source, DateSource::Native);
        let bad = ymd(1800, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        let d = parse(CellValue::Date(bad)).await;
        assert_eq!(d.date, None);
    }

    #[tokio::test]
    async fn excel_serial_with_leap_bug() {
        // 36526 = 2000-01-01 under the 1900 system
        let d = parse(CellValue::Number(36_526.0)).await;
        assert_eq!(d.date, Some(ymd(2000, 1, 1)));
        assert_eq!(d.source, DateSource::ExcelSerial);
        assert!((d.confidence - 1.0).abs() < 1e-12);
        // Serial 42005 = 2015-01-01
        let d = parse(CellValue::Number(42_005.0)).await;
        assert_eq!(d.date, Some(ymd(2015, 1, 1)));
    }

    #[tokio::test]
    async fn unix_seconds() {
        // 2015-06-01T00:00:00Z = 1433116800
        let d = parse(CellValue::Number(1_433_116_800.0)).await;
        assert_eq!(d.date, Some(ymd(2015, 6, 1)));
        assert_eq!(d.source, DateSource::UnixSeconds);
        assert!((d.confidence - 0.7).abs() < 1e-12);
    }

    #[tokio::test]
    async fn string_forms() {
        for (raw, expect) in [
            ("2015-06-01", ymd(2015, 6, 1)),
            ("6/1/2015", ymd(2015, 6, 1)),
            ("June 1, 2015", ymd(2015, 6, 1)),
            ("Jun 1 2015", ymd(2015, 6, 1)),
            ("1 Jun 2015", ymd(2015, 6, 1)),
            ("2015/06/01", ymd(2015, 6, 1)),
        ] {
            let d = parse(CellValue::Text(raw.into())).await;
            assert_eq!(d.date, Some(expect), "raw={raw}");
            assert_eq!(d.source, DateSource::StringParsed);
        }
    }

    #[tokio::test]
    async fn out_of_window_rejected() {
        let d = parse(CellValue::Text("1899-01-01".into())).await;
        assert_eq!(d.date, None);
        let d = parse(CellValue::Text("2099-01-01".into())).await;
        assert_eq!(d.date, None);
    }

    #[tokio::test]
    async fn garbage_is_missing_not_invalid() {
        let d = parse(CellValue::Text("sometime in spring".into())).await;
        assert_eq!(d.date, None);
        assert_eq!(d.source, DateSource::Missing);
        assert!((d.confidence - 0.0).abs() < 1e-12);
    }
}
