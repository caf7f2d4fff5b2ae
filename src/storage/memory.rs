//! In-memory store for tests and one-shot CLI runs
//!
//! Thread-safe via `RwLock`. Not durable — data lost on process exit.
//! Ids are assigned from a monotone counter; per-job collections preserve
//! insertion order.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::types::{
    AuditRecord, CorrectionSegment, Dataset, DatasetId, Exception, Feature, FeatureId, Job,
    MatchedPair, Run, RunId, StandardsApplied,
};

/// In-memory reference backend.
#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    datasets: RwLock<HashMap<DatasetId, Dataset>>,
    runs: RwLock<HashMap<RunId, Run>>,
    features: RwLock<HashMap<FeatureId, Feature>>,
    /// run id → feature ids in insertion order
    run_features: RwLock<HashMap<RunId, Vec<FeatureId>>>,
    segments: RwLock<HashMap<Uuid, Vec<CorrectionSegment>>>,
    matches: RwLock<HashMap<Uuid, Vec<MatchedPair>>>,
    exceptions: RwLock<HashMap<Uuid, Vec<Exception>>>,
    audit: RwLock<HashMap<Uuid, Vec<AuditRecord>>>,
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            // 0 is the "not yet persisted" sentinel
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_err<T>(e: std::sync::PoisonError<T>) -> StoreError {
        StoreError::Storage(format!("lock poisoned: {e}"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_dataset(&self, mut dataset: Dataset) -> Result<DatasetId, StoreError> {
        let id = self.alloc_id();
        dataset.id = id;
        self.datasets
            .write()
            .map_err(Self::lock_err)?
            .insert(id, dataset);
        Ok(id)
    }

    async fn update_dataset_totals(
        &self,
        id: DatasetId,
        total_runs: usize,
        total_features: usize,
    ) -> Result<(), StoreError> {
        let mut datasets = self.datasets.write().map_err(Self::lock_err)?;
        let dataset = datasets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("dataset {id}")))?;
        dataset.total_runs = total_runs;
        dataset.total_features = total_features;
        Ok(())
    }

    async fn insert_run(&self, mut run: Run) -> Result<RunId, StoreError> {
        let id = self.alloc_id();
        run.id = id;
        if let Ok(mut datasets) = self.datasets.write() {
            if let Some(dataset) = datasets.get_mut(&run.dataset_id) {
                dataset.run_ids.push(id);
            }
        }
        self.runs.write().map_err(Self::lock_err)?.insert(id, run);
        Ok(id)
    }

    async fn get_run(&self, id: RunId) -> Result<Run, StoreError> {
        self.runs
            .read()
            .map_err(Self::lock_err)?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
    }

    async fn runs_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<Run>, StoreError> {
        let runs = self.runs.read().map_err(Self::lock_err)?;
        let mut out: Vec<Run> = runs
            .values()
            .filter(|r| r.dataset_id == dataset_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.year, r.id));
        Ok(out)
    }

    async fn insert_features(&self, batch: Vec<Feature>) -> Result<Vec<FeatureId>, StoreError> {
        let mut ids = Vec::with_capacity(batch.len());
        let mut features = self.features.write().map_err(Self::lock_err)?;
        let mut run_features = self.run_features.write().map_err(Self::lock_err)?;
        for mut feature in batch {
            let id = self.alloc_id();
            feature.id = id;
            run_features.entry(feature.run_id).or_default().push(id);
            features.insert(id, feature);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn features_for_run(&self, run_id: RunId) -> Result<Vec<Feature>, StoreError> {
        let features = self.features.read().map_err(Self::lock_err)?;
        let run_features = self.run_features.read().map_err(Self::lock_err)?;
        let mut out: Vec<Feature> = run_features
            .get(&run_id)
            .map(|ids| ids.iter().filter_map(|id| features.get(id).cloned()).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| {
            a.log_distance_ft
                .total_cmp(&b.log_distance_ft)
                .then(a.row_index.cmp(&b.row_index))
        });
        Ok(out)
    }

    async fn update_corrected_distances(
        &self,
        updates: &[(FeatureId, f64)],
    ) -> Result<usize, StoreError> {
        let mut features = self.features.write().map_err(Self::lock_err)?;
        let mut updated = 0;
        for (id, corrected) in updates {
            if let Some(feature) = features.get_mut(id) {
                feature.corrected_distance_ft = Some(*corrected);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn insert_correction_segments(
        &self,
        job_id: Uuid,
        batch: Vec<CorrectionSegment>,
    ) -> Result<usize, StoreError> {
        let mut segments = self.segments.write().map_err(Self::lock_err)?;
        let entry = segments.entry(job_id).or_default();
        let n = batch.len();
        entry.extend(batch);
        Ok(n)
    }

    async fn insert_matches(&self, batch: Vec<MatchedPair>) -> Result<usize, StoreError> {
        let mut matches = self.matches.write().map_err(Self::lock_err)?;
        let n = batch.len();
        for m in batch {
            matches.entry(m.job_id).or_default().push(m);
        }
        Ok(n)
    }

    async fn insert_exceptions(&self, batch: Vec<Exception>) -> Result<usize, StoreError> {
        let mut exceptions = self.exceptions.write().map_err(Self::lock_err)?;
        let n = batch.len();
        for e in batch {
            exceptions.entry(e.job_id).or_default().push(e);
        }
        Ok(n)
    }

    async fn insert_audit_records(&self, batch: Vec<AuditRecord>) -> Result<usize, StoreError> {
        let mut audit = self.audit.write().map_err(Self::lock_err)?;
        let n = batch.len();
        for record in batch {
            audit.entry(record.job_id).or_default().push(record);
        }
        Ok(n)
    }

    async fn apply_standards(
        &self,
        job_id: Uuid,
        updates: Vec<(FeatureId, FeatureId, StandardsApplied)>,
    ) -> Result<usize, StoreError> {
        let mut matches = self.matches.write().map_err(Self::lock_err)?;
        let Some(job_matches) = matches.get_mut(&job_id) else {
            return Ok(0);
        };
        let mut applied = 0;
        for (older_id, newer_id, standards) in updates {
            if let Some(m) = job_matches
                .iter_mut()
                .find(|m| m.older_feature_id == older_id && m.newer_feature_id == newer_id)
            {
                m.standards_applied = Some(standards);
                applied += 1;
            }
        }
        Ok(applied)
    }

    async fn matches_for_job(&self, job_id: Uuid) -> Result<Vec<MatchedPair>, StoreError> {
        Ok(self
            .matches
            .read()
            .map_err(Self::lock_err)?
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn exceptions_for_job(&self, job_id: Uuid) -> Result<Vec<Exception>, StoreError> {
        Ok(self
            .exceptions
            .read()
            .map_err(Self::lock_err)?
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn audit_for_job(&self, job_id: Uuid) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self
            .audit
            .read()
            .map_err(Self::lock_err)?
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs
            .write()
            .map_err(Self::lock_err)?
            .insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .map_err(Self::lock_err)?
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
