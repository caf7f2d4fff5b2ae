//! Store trait — pluggable persistence backend
//!
//! Abstracts run/feature/match persistence so backends can be swapped
//! without touching pipeline code:
//! - `MemoryStore`: in-memory store for tests and one-shot CLI runs
//! - `SledStore`: embedded durable backend
//!
//! The contract is deliberately small: inserts, bulk corrected-distance
//! updates, per-job projections, and atomic job upserts. Insertion order is
//! preserved where the pipeline depends on it (stage status, audit logs).
//! Bulk inserts are chunked by the caller via [`persist_batched`]; a batch
//! is unordered and one rejected batch never aborts the rest.

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{
    AuditRecord, CorrectionSegment, Dataset, DatasetId, Exception, Feature, FeatureId, Job,
    MatchedPair, Run, RunId, StandardsApplied,
};

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Trait for pluggable persistence backends.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across concurrent jobs.
#[async_trait]
pub trait Store: Send + Sync {
    // --- datasets & runs -------------------------------------------------

    async fn insert_dataset(&self, dataset: Dataset) -> Result<DatasetId, StoreError>;

    /// Update dataset aggregate totals after all runs persist.
    async fn update_dataset_totals(
        &self,
        id: DatasetId,
        total_runs: usize,
        total_features: usize,
    ) -> Result<(), StoreError>;

    async fn insert_run(&self, run: Run) -> Result<RunId, StoreError>;

    async fn get_run(&self, id: RunId) -> Result<Run, StoreError>;

    async fn runs_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<Run>, StoreError>;

    // --- features --------------------------------------------------------

    /// Insert one batch of features, returning assigned ids in input order.
    async fn insert_features(&self, batch: Vec<Feature>) -> Result<Vec<FeatureId>, StoreError>;

    /// All features of a run, ascending log distance.
    async fn features_for_run(&self, run_id: RunId) -> Result<Vec<Feature>, StoreError>;

    /// Bulk corrected-distance update. Returns the number of features
    /// actually updated; unknown ids are skipped, not errors.
    async fn update_corrected_distances(
        &self,
        updates: &[(FeatureId, f64)],
    ) -> Result<usize, StoreError>;

    // --- job-scoped outputs ----------------------------------------------

    async fn insert_correction_segments(
        &self,
        job_id: Uuid,
        batch: Vec<CorrectionSegment>,
    ) -> Result<usize, StoreError>;

    async fn insert_matches(&self, batch: Vec<MatchedPair>) -> Result<usize, StoreError>;

    async fn insert_exceptions(&self, batch: Vec<Exception>) -> Result<usize, StoreError>;

    async fn insert_audit_records(&self, batch: Vec<AuditRecord>) -> Result<usize, StoreError>;

    /// Attach standards blocks to persisted matches, keyed by
    /// (older_feature_id, newer_feature_id). Never touches match scores.
    async fn apply_standards(
        &self,
        job_id: Uuid,
        updates: Vec<(FeatureId, FeatureId, StandardsApplied)>,
    ) -> Result<usize, StoreError>;

    async fn matches_for_job(&self, job_id: Uuid) -> Result<Vec<MatchedPair>, StoreError>;

    async fn exceptions_for_job(&self, job_id: Uuid) -> Result<Vec<Exception>, StoreError>;

    /// Audit records in insertion order.
    async fn audit_for_job(&self, job_id: Uuid) -> Result<Vec<AuditRecord>, StoreError>;

    // --- jobs ------------------------------------------------------------

    /// Insert or atomically replace a job record (status/progress updates).
    async fn upsert_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Job, StoreError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Chunk `records` into batches of `batch_size` and feed them to `sink`.
///
/// Batch semantics are unordered: a failing batch is logged and skipped,
/// later batches still run. Returns the number of records persisted.
pub async fn persist_batched<T, F, Fut>(
    records: Vec<T>,
    batch_size: usize,
    mut sink: F,
) -> Result<usize, StoreError>
where
    T: Send,
    F: FnMut(Vec<T>) -> Fut + Send,
    Fut: std::future::Future<Output = Result<usize, StoreError>> + Send,
{
    let size = batch_size.max(1);
    let mut persisted = 0usize;
    let mut iter = records.into_iter();

    loop {
        let chunk: Vec<T> = iter.by_ref().take(size).collect();
        if chunk.is_empty() {
            break;
        }
        match sink(chunk).await {
            Ok(n) => persisted += n,
            Err(e) => {
                tracing::warn!(error = %e, "Persistence batch rejected; continuing with next batch");
            }
        }
    }

    Ok(persisted)
}
