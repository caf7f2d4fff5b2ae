//! Normalization stack: clocks, dates, columns, event types, run rows
//!
//! Everything a raw `ParsedRun` needs to become a persisted `Run` with
//! normalized `Feature`s. The individual normalizers are pure; only the
//! run normalizer touches the store and (optionally) the oracle.

mod clock;
mod columns;
mod dates;
mod events;
mod normalizer;

pub use clock::{circular_distance, normalize_clock, ClockPosition};
pub use columns::{edit_distance, map_columns, normalize_header, CanonicalField, ColumnMapping, ALL_FIELDS};
pub use dates::parse_inspection_date;
pub use events::{canonicalize_event, canonicalize_event_sync, memo_len, reset_memo};
pub use normalizer::{normalize_dataset, normalize_run, NormalizeError, NormalizedRun};
