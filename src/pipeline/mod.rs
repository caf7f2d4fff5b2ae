//! Alignment Pipeline Module
//!
//! ## Stage Architecture
//!
//! ```text
//! Per run pair (older vs baseline):
//!   1. anchor_match          girth-weld anchor pairing
//!   2. distance_correction   piecewise-linear remap onto the baseline axis
//!   3. dtw_align             spacing-sequence alignment confidence
//!   4. icp_refine            per-segment translation refinement
//!   5. anomaly_match         ensemble + Hungarian assignment
//! Then globally:
//!   6. run3_refinement       duplicate/cluster suppression, multi-run audit
//!   7. standards_assessment  ASME / API 1163 / NACE / PHMSA
//!   8. interaction_graph     clusters, proximity, temporal chains
//!   9. visibility_scoring    render gating
//!  10. export                CSVs + workbook
//! ```
//!
//! Stages finish in order; each reads only the persisted outputs of its
//! predecessors and never mutates their inputs.

mod coordinator;
mod stages;

pub use coordinator::{JobCoordinator, PipelineError};
pub use stages::{build_plan, GLOBAL_STAGES, PAIR_STAGES};
