//! Shared data structures for the ILI alignment and assessment pipeline
//!
//! This module defines the core types flowing between stages:
//! - Stage 1-2: ParsedRun / CellValue (raw ingestion), Run, Feature, Dataset
//! - Stage 3-4: AnchorPair, CorrectionSegment
//! - Stage 5-7: MatchedPair, Exception, refinement flags
//! - Stage 8: StandardsApplied (ASME / API 1163 / NACE / PHMSA)
//! - Stage 9-10: interaction graph edges/clusters, visibility states
//! - Orchestration: Job, stage status, AuditRecord

mod anchor;
mod audit;
mod cell;
mod exception;
mod feature;
mod graph;
mod job;
mod matching;
mod run;
mod standards;

pub use anchor::*;
pub use audit::*;
pub use cell::*;
pub use exception::*;
pub use feature::*;
pub use graph::*;
pub use job::*;
pub use matching::*;
pub use run::*;
pub use standards::*;

/// Store-assigned identifier for a persisted run.
pub type RunId = u64;

/// Store-assigned identifier for a persisted feature.
pub type FeatureId = u64;

/// Store-assigned identifier for a persisted dataset.
pub type DatasetId = u64;
