//! Append-only audit stream for reproducibility

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable action names for audit records. Every stage emits at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    JobCreated,
    StageStarted,
    StageFinished,
    AlgoDtw,
    AlgoIcp,
    AlgoEnsemble,
    StandardsAssessment,
    PhmsaCompliance,
    Run3Refinement,
    MlHooksStatus,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::JobCreated => "JOB_CREATED",
            AuditAction::StageStarted => "STAGE_STARTED",
            AuditAction::StageFinished => "STAGE_FINISHED",
            AuditAction::AlgoDtw => "ALGO_DTW",
            AuditAction::AlgoIcp => "ALGO_ICP",
            AuditAction::AlgoEnsemble => "ALGO_ENSEMBLE",
            AuditAction::StandardsAssessment => "STANDARDS_ASSESSMENT",
            AuditAction::PhmsaCompliance => "PHMSA_COMPLIANCE",
            AuditAction::Run3Refinement => "RUN3_REFINEMENT",
            AuditAction::MlHooksStatus => "ML_HOOKS_STATUS",
        }
    }
}

/// One append-only audit event, keyed by stage or algorithm name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub job_id: Uuid,
    pub action: AuditAction,
    /// Stage or algorithm the record belongs to
    pub stage: String,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Structured payload (counts, parameters, messages)
    pub details: serde_json::Value,
}

impl AuditRecord {
    pub fn new(job_id: Uuid, action: AuditAction, stage: &str, details: serde_json::Value) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            job_id,
            action,
            stage: stage.to_string(),
            timestamp,
            details,
        }
    }
}
