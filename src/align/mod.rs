//! Run-to-run alignment: anchor matching, distance correction, DTW, ICP
//!
//! The alignment stages are pure synchronous computation — they read
//! feature slices and return plain values. Persistence of their outputs is
//! the orchestrator's job.

mod anchors;
mod correction;
mod dtw;
mod icp;

pub use anchors::{match_anchors, AnchorOutcome};
pub use correction::{apply_correction, build_segments, CorrectionError, CorrectionModel};
pub use dtw::{align_spacings, DtwResult};
pub use icp::{refine_segment, IcpPoint, IcpResult};
