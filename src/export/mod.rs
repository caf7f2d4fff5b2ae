//! Deterministic tabular export
//!
//! Flattens job outputs into two CSVs (matches, exceptions) and a
//! multi-sheet workbook (`matches` / `exceptions` / `audit`), written to a
//! per-job directory. Row and column orders are fully determined by the
//! data, so re-running a job reproduces byte-identical CSVs (audit
//! timestamps live only in the workbook's audit sheet).

mod columns;
mod rows;

pub use columns::{EXCEPTION_EXTRA_COLUMNS, MATCH_COLUMNS};
pub use rows::{exception_row, flatten_json, match_row};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::types::{AuditRecord, Exception, Feature, FeatureId, MatchedPair, Run, RunId};

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(String),
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::Workbook(err.to_string())
    }
}

/// Paths of the written artifacts.
#[derive(Debug, Clone)]
pub struct ExportArtifacts {
    pub matches_csv: PathBuf,
    pub exceptions_csv: PathBuf,
    pub workbook: PathBuf,
}

/// Entity context the exporter enriches rows from.
pub struct ExportContext<'a> {
    pub features: &'a HashMap<FeatureId, Feature>,
    pub runs: &'a HashMap<RunId, Run>,
}

fn sorted_match_rows(
    matches: &[MatchedPair],
    ctx: &ExportContext<'_>,
) -> Vec<BTreeMap<String, String>> {
    let mut pairs: Vec<&MatchedPair> = matches.iter().collect();
    pairs.sort_by_key(|m| (m.older_run_id, m.newer_feature_id, m.older_feature_id));
    pairs
        .iter()
        .map(|m| match_row(m, ctx.features, ctx.runs))
        .collect()
}

fn sorted_exception_rows(
    exceptions: &[Exception],
    ctx: &ExportContext<'_>,
) -> Vec<BTreeMap<String, String>> {
    let mut list: Vec<&Exception> = exceptions.iter().collect();
    list.sort_by_key(|e| {
        (
            e.category.as_str(),
            e.run_id.unwrap_or(0),
            e.feature_id.unwrap_or(0),
            e.details.to_string(),
        )
    });
    list.iter()
        .map(|e| exception_row(e, ctx.features, ctx.runs))
        .collect()
}

/// Header for the match export: canonical columns first, then any extra
/// discovered keys sorted lexicographically.
fn match_header(rows: &[BTreeMap<String, String>]) -> Vec<String> {
    let known: BTreeSet<&str> = MATCH_COLUMNS.iter().copied().collect();
    let extras: BTreeSet<String> = rows
        .iter()
        .flat_map(|row| row.keys())
        .filter(|k| !known.contains(k.as_str()))
        .cloned()
        .collect();
    MATCH_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extras)
        .collect()
}

/// Header for the exceptions export: the match column order exactly, then
/// the exception-specific columns.
fn exception_header() -> Vec<String> {
    MATCH_COLUMNS
        .iter()
        .chain(EXCEPTION_EXTRA_COLUMNS.iter())
        .map(|c| c.to_string())
        .collect()
}

fn write_csv(
    path: &Path,
    header: &[String],
    rows: &[BTreeMap<String, String>],
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        let record: Vec<&str> = header
            .iter()
            .map(|col| row.get(col).map(String::as_str).unwrap_or(""))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn audit_header() -> Vec<String> {
    ["job_id", "action", "stage", "timestamp", "details"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn audit_rows(audit: &[AuditRecord]) -> Vec<BTreeMap<String, String>> {
    audit
        .iter()
        .map(|record| {
            let mut row = BTreeMap::new();
            row.insert("job_id".to_string(), record.job_id.to_string());
            row.insert("action".to_string(), record.action.as_str().to_string());
            row.insert("stage".to_string(), record.stage.clone());
            row.insert("timestamp".to_string(), record.timestamp.to_string());
            row.insert("details".to_string(), record.details.to_string());
            row
        })
        .collect()
}

fn write_sheet(
    workbook: &mut rust_xlsxwriter::Workbook,
    name: &str,
    header: &[String],
    rows: &[BTreeMap<String, String>],
) -> Result<(), ExportError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;
    for (col, title) in header.iter().enumerate() {
        sheet.write_string(0, col as u16, title)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, title) in header.iter().enumerate() {
            if let Some(value) = row.get(title) {
                if !value.is_empty() {
                    sheet.write_string((r + 1) as u32, col as u16, value)?;
                }
            }
        }
    }
    Ok(())
}

/// Export one job's outputs into `export_dir/<job id>/`.
pub fn export_job(
    export_dir: &Path,
    job_id: uuid::Uuid,
    matches: &[MatchedPair],
    exceptions: &[Exception],
    audit: &[AuditRecord],
    ctx: &ExportContext<'_>,
) -> Result<ExportArtifacts, ExportError> {
    let job_dir = export_dir.join(job_id.to_string());
    std::fs::create_dir_all(&job_dir)?;

    let match_rows = sorted_match_rows(matches, ctx);
    let match_header = match_header(&match_rows);
    let exception_rows = sorted_exception_rows(exceptions, ctx);
    let exception_header = exception_header();
    let audit_rows = audit_rows(audit);

    let matches_csv = job_dir.join("matches.csv");
    write_csv(&matches_csv, &match_header, &match_rows)?;

    let exceptions_csv = job_dir.join("exceptions.csv");
    write_csv(&exceptions_csv, &exception_header, &exception_rows)?;

    let workbook_path = job_dir.join("report.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    write_sheet(&mut workbook, "matches", &match_header, &match_rows)?;
    write_sheet(&mut workbook, "exceptions", &exception_header, &exception_rows)?;
    write_sheet(&mut workbook, "audit", &audit_header(), &audit_rows)?;
    workbook.save(&workbook_path)?;

    info!(
        job_id = %job_id,
        matches = match_rows.len(),
        exceptions = exception_rows.len(),
        dir = %job_dir.display(),
        "Export complete"
    );

    Ok(ExportArtifacts {
        matches_csv,
        exceptions_csv,
        workbook: workbook_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ConfidenceCategory, EventType, GrowthRates, InspectionDate, MatchCategory, ToolType,
    };
    use uuid::Uuid;

    fn run(id: u64, year: i32) -> Run {
        Run {
            id,
            dataset_id: 1,
            year,
            label: format!("{year} survey"),
            vendor: "Acme".into(),
            tool_type: ToolType::Mfl,
            inspection_date: InspectionDate::missing(),
            start_odometer_ft: None,
            end_odometer_ft: None,
            row_count: 0,
        }
    }

    fn feature(id: u64, run_id: u64, dist: f64) -> Feature {
        Feature {
            id,
            run_id,
            row_index: id as usize,
            joint_number: Some(3),
            joint_length_ft: None,
            wall_thickness_in: None,
            raw_event: "metal loss".into(),
            event_type: EventType::MetalLoss,
            log_distance_ft: dist,
            corrected_distance_ft: Some(dist + 0.5),
            depth_percent: Some(30.0),
            depth_in: None,
            length_in: Some(2.0),
            width_in: None,
            clock_raw: String::new(),
            clock_decimal: Some(6.0),
            elevation_ft: None,
            comments: Some("has, comma".into()),
            is_reference_point: false,
        }
    }

    fn pair(job: Uuid) -> MatchedPair {
        MatchedPair {
            job_id: job,
            older_feature_id: 1,
            newer_feature_id: 2,
            older_run_id: 10,
            newer_run_id: 20,
            distance_residual_ft: 0.25,
            clock_residual_hr: Some(0.5),
            type_compatibility: 1.0,
            dimensional_similarity: 0.9,
            confidence_score: 82.5,
            confidence_category: ConfidenceCategory::High,
            match_category: MatchCategory::BestMatch,
            growth: GrowthRates {
                depth_pct_per_year: Some(1.5),
                length_in_per_year: None,
                width_in_per_year: None,
                years_between: 7.0,
            },
            competing_older_ids: vec![7, 9],
            standards_applied: None,
        }
    }

    fn context() -> (HashMap<FeatureId, Feature>, HashMap<RunId, Run>) {
        let features: HashMap<FeatureId, Feature> =
            [(1, feature(1, 10, 100.0)), (2, feature(2, 20, 100.3))].into();
        let runs: HashMap<RunId, Run> = [(10, run(10, 2015)), (20, run(20, 2022))].into();
        (features, runs)
    }

    #[test]
    fn match_csv_has_canonical_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let job = Uuid::new_v4();
        let (features, runs) = context();
        let ctx = ExportContext {
            features: &features,
            runs: &runs,
        };

        let artifacts =
            export_job(dir.path(), job, &[pair(job)], &[], &[], &ctx).unwrap();

        let content = std::fs::read_to_string(&artifacts.matches_csv).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("job_id,older_run_id,newer_run_id,older_run_year"));
        let row = lines.next().unwrap();
        assert!(row.contains("82.5"));
        assert!(row.contains("7;9"));
        assert!(row.contains("BEST_MATCH"));
    }

    #[test]
    fn repeated_export_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let job = Uuid::new_v4();
        let (features, runs) = context();
        let ctx = ExportContext {
            features: &features,
            runs: &runs,
        };
        let matches = vec![pair(job)];

        let a = export_job(dir.path(), job, &matches, &[], &[], &ctx).unwrap();
        let first = std::fs::read(&a.matches_csv).unwrap();
        let b = export_job(dir.path(), job, &matches, &[], &[], &ctx).unwrap();
        let second = std::fs::read(&b.matches_csv).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn exception_csv_reuses_match_columns_then_extras() {
        let dir = tempfile::tempdir().unwrap();
        let job = Uuid::new_v4();
        let (features, runs) = context();
        let ctx = ExportContext {
            features: &features,
            runs: &runs,
        };
        let exception = Exception::new(
            job,
            crate::types::ExceptionCategory::Unmatched,
            crate::types::ExceptionSeverity::Medium,
            Some(1),
            Some(10),
            serde_json::json!({ "side": "older" }),
        );

        let artifacts = export_job(dir.path(), job, &[], &[exception], &[], &ctx).unwrap();
        let content = std::fs::read_to_string(&artifacts.exceptions_csv).unwrap();
        let header = content.lines().next().unwrap();
        let expected_prefix = MATCH_COLUMNS.join(",");
        assert!(header.starts_with(&expected_prefix));
        assert!(header.ends_with("exception_details"));

        let row = content.lines().nth(1).unwrap();
        assert!(row.contains("UNMATCHED"));
        assert!(row.contains("METAL_LOSS"));
        assert!(row.contains("2015 survey"));
    }

    #[test]
    fn flattened_standards_columns_sort_after_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let job = Uuid::new_v4();
        let (features, runs) = context();
        let ctx = ExportContext {
            features: &features,
            runs: &runs,
        };
        let base = pair(job);
        let qual = crate::standards::api1163::assess(ToolType::Mfl, &base, Some(5.0));
        let mut with_standards = base;
        with_standards.standards_applied = Some(crate::types::StandardsApplied {
            asme_b31_8s: None,
            api_1163: qual,
            nace_sp0502: None,
        });

        let artifacts = export_job(dir.path(), job, &[with_standards], &[], &[], &ctx).unwrap();
        let content = std::fs::read_to_string(&artifacts.matches_csv).unwrap();
        let header = content.lines().next().unwrap();
        let canonical_end = header.find("competing_older_ids").unwrap();
        let standards_start = header.find("standards_applied.api_1163").unwrap();
        assert!(standards_start > canonical_end);
    }
}
