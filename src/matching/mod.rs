//! Anomaly matching: assignment solver, ensemble scoring, per-segment
//! matching, and post-match refinement

pub mod ensemble;
pub mod hungarian;
mod matcher;
mod run3;

pub use ensemble::{score, ComponentScores, EnsembleScore, SignalInputs};
pub use matcher::{match_anomalies, MatchContext, MatchOutcome};
pub use run3::{refine, RefinementFlag, RefinementReport};
