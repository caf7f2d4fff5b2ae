//! Run normalizer — ParsedRun rows to persisted Run + Features
//!
//! Per run: parse the inspection date (context year = sheet year), persist
//! the Run, resolve the column mapping, canonicalize the distinct raw
//! event strings in a single cached pass, then emit one Feature per row
//! with numeric coercion (non-finite → null), clock normalization, and the
//! reference-point flag. Dataset totals are updated only after every run
//! has persisted.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::clock::normalize_clock;
use super::columns::{map_columns, CanonicalField, ColumnMapping};
use super::dates::parse_inspection_date;
use super::events::{canonicalize_event, memo_len};
use crate::oracle::CanonOracle;
use crate::storage::{persist_batched, Store, StoreError};
use crate::types::{CellValue, Dataset, DatasetId, Feature, ParsedRun, Run, RunId};

/// Normalization errors. Schema errors abort the stage.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no column resolved for required field {0:?}")]
    Schema(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of normalizing one run.
#[derive(Debug, Clone)]
pub struct NormalizedRun {
    pub run_id: RunId,
    pub feature_count: usize,
    pub unresolved_fields: Vec<CanonicalField>,
}

fn cell<'a>(row: &'a [CellValue], mapping: &ColumnMapping, field: CanonicalField) -> &'a CellValue {
    mapping
        .column(field)
        .and_then(|i| row.get(i))
        .unwrap_or(&CellValue::Empty)
}

fn number(row: &[CellValue], mapping: &ColumnMapping, field: CanonicalField) -> Option<f64> {
    cell(row, mapping, field).as_number()
}

fn integer(row: &[CellValue], mapping: &ColumnMapping, field: CanonicalField) -> Option<i64> {
    number(row, mapping, field).map(|n| n.round() as i64)
}

/// Normalize one parsed run into persisted Run + Features.
pub async fn normalize_run(
    parsed: &ParsedRun,
    dataset_id: DatasetId,
    store: &dyn Store,
    oracle: Option<&dyn CanonOracle>,
    batch_size: usize,
) -> Result<NormalizedRun, NormalizeError> {
    let inspection_date =
        parse_inspection_date(&parsed.raw_date, Some(parsed.year), oracle).await;

    let mapping = map_columns(parsed.year, &parsed.headers);
    // Distance and event type are the two fields nothing downstream can
    // work without.
    if mapping.column(CanonicalField::LogDistanceFt).is_none() {
        return Err(NormalizeError::Schema("log_distance_ft"));
    }
    if mapping.column(CanonicalField::EventType).is_none() {
        return Err(NormalizeError::Schema("event_type"));
    }
    let unresolved = mapping.unresolved();
    if !unresolved.is_empty() {
        debug!(year = parsed.year, ?unresolved, "Unresolved canonical fields");
    }

    let run_id = store
        .insert_run(Run {
            id: 0,
            dataset_id,
            year: parsed.year,
            label: parsed.label.clone(),
            vendor: parsed.vendor.clone(),
            tool_type: parsed.tool_type,
            inspection_date,
            start_odometer_ft: parsed.start_odometer_ft,
            end_odometer_ft: parsed.end_odometer_ft,
            row_count: parsed.rows.len(),
        })
        .await?;

    // Single cached canonicalization pass over the distinct raw events.
    let mut distinct_events: Vec<String> = parsed
        .rows
        .iter()
        .map(|row| cell(row, &mapping, CanonicalField::EventType).as_text())
        .collect();
    distinct_events.sort();
    distinct_events.dedup();
    let mut canon = std::collections::HashMap::with_capacity(distinct_events.len());
    for raw in &distinct_events {
        canon.insert(raw.clone(), canonicalize_event(raw, oracle).await);
    }

    let mut features = Vec::with_capacity(parsed.rows.len());
    let mut skipped_rows = 0usize;
    for (index, row) in parsed.rows.iter().enumerate() {
        let Some(log_distance_ft) = number(row, &mapping, CanonicalField::LogDistanceFt) else {
            skipped_rows += 1;
            continue;
        };

        let raw_event = cell(row, &mapping, CanonicalField::EventType).as_text();
        let event_type = canon
            .get(&raw_event)
            .copied()
            .unwrap_or(crate::types::EventType::Other);

        let clock = normalize_clock(cell(row, &mapping, CanonicalField::ClockPosition));
        let comments = cell(row, &mapping, CanonicalField::Comments).as_text();

        features.push(Feature {
            id: 0,
            run_id,
            row_index: index + 1,
            joint_number: integer(row, &mapping, CanonicalField::JointNumber),
            joint_length_ft: number(row, &mapping, CanonicalField::JointLengthFt),
            wall_thickness_in: number(row, &mapping, CanonicalField::WallThicknessIn),
            raw_event,
            event_type,
            log_distance_ft,
            corrected_distance_ft: None,
            depth_percent: number(row, &mapping, CanonicalField::DepthPercent),
            depth_in: number(row, &mapping, CanonicalField::DepthIn),
            length_in: number(row, &mapping, CanonicalField::LengthIn),
            width_in: number(row, &mapping, CanonicalField::WidthIn),
            clock_raw: clock.raw,
            clock_decimal: clock.decimal,
            elevation_ft: number(row, &mapping, CanonicalField::ElevationFt),
            comments: (!comments.is_empty()).then_some(comments),
            is_reference_point: event_type.is_reference(),
        });
    }

    if skipped_rows > 0 {
        warn!(
            year = parsed.year,
            skipped_rows, "Rows without a parseable log distance were skipped"
        );
    }

    let feature_count = features.len();
    persist_batched(features, batch_size, |batch| async move {
        store.insert_features(batch).await.map(|ids| ids.len())
    })
    .await?;

    info!(
        year = parsed.year,
        run_id,
        features = feature_count,
        memoized_events = memo_len(),
        "Run normalized"
    );

    Ok(NormalizedRun {
        run_id,
        feature_count,
        unresolved_fields: unresolved,
    })
}

/// Normalize a whole parsed dataset: insert the Dataset shell, normalize
/// every run, then update aggregate totals.
pub async fn normalize_dataset(
    name: &str,
    parsed_runs: &[ParsedRun],
    store: &dyn Store,
    oracle: Option<&dyn CanonOracle>,
    batch_size: usize,
) -> Result<(DatasetId, Vec<NormalizedRun>), NormalizeError> {
    let dataset_id = store
        .insert_dataset(Dataset {
            id: 0,
            name: name.to_string(),
            run_ids: Vec::new(),
            total_runs: 0,
            total_features: 0,
        })
        .await?;

    let mut outcomes = Vec::with_capacity(parsed_runs.len());
    for parsed in parsed_runs {
        outcomes.push(normalize_run(parsed, dataset_id, store, oracle, batch_size).await?);
    }

    let total_features = outcomes.iter().map(|o| o.feature_count).sum();
    store
        .update_dataset_totals(dataset_id, outcomes.len(), total_features)
        .await?;

    Ok((dataset_id, outcomes))
}
