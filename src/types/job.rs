//! Job, stage-status, and result-summary types
//!
//! `StageStatusReport` is the wire shape external pollers consume:
//! `{status, current_stage, progress_pct, stage_status: [...], error?,
//! result_summary?}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PhmsaRecord, RunId};

/// Overall job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
            JobStatus::Aborted => "ABORTED",
        }
    }
}

/// Per-stage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

/// One stage's status record. Insertion order is preserved by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    /// Stage ordinal (1-based)
    pub stage: usize,
    /// Stable stage name
    pub name: String,
    pub status: StageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}

/// Aggregate counts surfaced once a job completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSummary {
    pub run_pairs: usize,
    pub anchors: usize,
    pub matched_pairs: usize,
    pub exceptions: usize,
    pub interaction_clusters: usize,
    pub temporal_chains: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phmsa: Option<PhmsaRecord>,
}

/// An alignment job over one dataset: every older run aligned against the
/// newest (baseline) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub dataset_id: u64,
    /// Runs in scope, oldest first; the last entry is the baseline
    pub run_ids: Vec<RunId>,
    pub status: JobStatus,
    /// Index of the stage currently running (1-based), 0 before start
    pub current_stage: usize,
    /// Completed fraction ∈ [0, 1]
    pub progress: f64,
    pub stage_status: Vec<StageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
}

impl Job {
    pub fn new(dataset_id: u64, run_ids: Vec<RunId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset_id,
            run_ids,
            status: JobStatus::Pending,
            current_stage: 0,
            progress: 0.0,
            stage_status: Vec::new(),
            error: None,
            result_summary: None,
        }
    }

    /// The baseline (newest) run, when any runs are in scope.
    pub fn baseline_run_id(&self) -> Option<RunId> {
        self.run_ids.last().copied()
    }
}

/// External polling snapshot of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatusReport {
    pub status: JobStatus,
    pub current_stage: usize,
    /// Percent complete ∈ [0, 100]
    pub progress_pct: f64,
    pub stage_status: Vec<StageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
}

impl From<&Job> for StageStatusReport {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            current_stage: job.current_stage,
            progress_pct: (job.progress * 100.0).clamp(0.0, 100.0),
            stage_status: job.stage_status.clone(),
            error: job.error.clone(),
            result_summary: job.result_summary.clone(),
        }
    }
}

/// Rendering visibility state for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityState {
    Full,
    Dimmed,
    Hidden,
}

impl VisibilityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityState::Full => "full",
            VisibilityState::Dimmed => "dimmed",
            VisibilityState::Hidden => "hidden",
        }
    }
}
