//! Sled-backed durable store
//!
//! One tree per entity, JSON values, big-endian ids as keys so iteration
//! is naturally ordered. Job-scoped trees key by `job_uuid ++ sequence` so
//! per-job scans are prefix scans and insertion order survives restarts.
//!
//! Writes rely on sled's background flushing; on crash at most the last
//! few writes are lost, which a re-run of the job regenerates.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::types::{
    AuditRecord, CorrectionSegment, Dataset, DatasetId, Exception, Feature, FeatureId, Job,
    MatchedPair, Run, RunId, StandardsApplied,
};

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Embedded durable backend.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
    datasets: sled::Tree,
    runs: sled::Tree,
    features: sled::Tree,
    /// (run_id ++ feature_id) → feature_id; per-run index
    run_features: sled::Tree,
    segments: sled::Tree,
    matches: sled::Tree,
    exceptions: sled::Tree,
    audit: sled::Tree,
    jobs: sled::Tree,
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            datasets: db.open_tree("datasets")?,
            runs: db.open_tree("runs")?,
            features: db.open_tree("features")?,
            run_features: db.open_tree("run_features")?,
            segments: db.open_tree("segments")?,
            matches: db.open_tree("matches")?,
            exceptions: db.open_tree("exceptions")?,
            audit: db.open_tree("audit")?,
            jobs: db.open_tree("jobs")?,
            db: Arc::new(db),
        })
    }

    fn next_id(&self) -> Result<u64, StoreError> {
        // 0 is the "not yet persisted" sentinel
        Ok(self.db.generate_id()? + 1)
    }

    fn job_key(job_id: Uuid, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(job_id.as_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn scan_job<T: serde::de::DeserializeOwned>(
        tree: &sled::Tree,
        job_id: Uuid,
    ) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        for item in tree.scan_prefix(job_id.as_bytes()) {
            let (_key, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn append_job_records<T: serde::Serialize>(
        &self,
        tree: &sled::Tree,
        job_id: Uuid,
        batch: &[T],
    ) -> Result<usize, StoreError> {
        for record in batch {
            let key = Self::job_key(job_id, self.next_id()?);
            tree.insert(key, serde_json::to_vec(record)?)?;
        }
        Ok(batch.len())
    }
}

#[async_trait]
impl Store for SledStore {
    async fn insert_dataset(&self, mut dataset: Dataset) -> Result<DatasetId, StoreError> {
        let id = self.next_id()?;
        dataset.id = id;
        self.datasets
            .insert(id.to_be_bytes(), serde_json::to_vec(&dataset)?)?;
        Ok(id)
    }

    async fn update_dataset_totals(
        &self,
        id: DatasetId,
        total_runs: usize,
        total_features: usize,
    ) -> Result<(), StoreError> {
        let key = id.to_be_bytes();
        let raw = self
            .datasets
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(format!("dataset {id}")))?;
        let mut dataset: Dataset = serde_json::from_slice(&raw)?;
        dataset.total_runs = total_runs;
        dataset.total_features = total_features;
        self.datasets.insert(key, serde_json::to_vec(&dataset)?)?;
        Ok(())
    }

    async fn insert_run(&self, mut run: Run) -> Result<RunId, StoreError> {
        let id = self.next_id()?;
        run.id = id;

        // Maintain the dataset's run list
        let dataset_key = run.dataset_id.to_be_bytes();
        if let Some(raw) = self.datasets.get(dataset_key)? {
            let mut dataset: Dataset = serde_json::from_slice(&raw)?;
            dataset.run_ids.push(id);
            self.datasets
                .insert(dataset_key, serde_json::to_vec(&dataset)?)?;
        }

        self.runs.insert(id.to_be_bytes(), serde_json::to_vec(&run)?)?;
        Ok(id)
    }

    async fn get_run(&self, id: RunId) -> Result<Run, StoreError> {
        let raw = self
            .runs
            .get(id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn runs_for_dataset(&self, dataset_id: DatasetId) -> Result<Vec<Run>, StoreError> {
        let mut out = Vec::new();
        for item in self.runs.iter() {
            let (_key, value) = item?;
            let run: Run = serde_json::from_slice(&value)?;
            if run.dataset_id == dataset_id {
                out.push(run);
            }
        }
        out.sort_by_key(|r| (r.year, r.id));
        Ok(out)
    }

    async fn insert_features(&self, batch: Vec<Feature>) -> Result<Vec<FeatureId>, StoreError> {
        let mut ids = Vec::with_capacity(batch.len());
        for mut feature in batch {
            let id = self.next_id()?;
            feature.id = id;

            let mut index_key = Vec::with_capacity(16);
            index_key.extend_from_slice(&feature.run_id.to_be_bytes());
            index_key.extend_from_slice(&id.to_be_bytes());
            self.run_features.insert(index_key, id.to_be_bytes().to_vec())?;

            self.features
                .insert(id.to_be_bytes(), serde_json::to_vec(&feature)?)?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn features_for_run(&self, run_id: RunId) -> Result<Vec<Feature>, StoreError> {
        let mut out = Vec::new();
        for item in self.run_features.scan_prefix(run_id.to_be_bytes()) {
            let (_key, id_bytes) = item?;
            if let Some(raw) = self.features.get(&id_bytes)? {
                out.push(serde_json::from_slice::<Feature>(&raw)?);
            }
        }
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
        let mut updated = 0;
        for (id, corrected) in updates {
            let key = id.to_be_bytes();
            if let Some(raw) = self.features.get(key)? {
                let mut feature: Feature = serde_json::from_slice(&raw)?;
                feature.corrected_distance_ft = Some(*corrected);
                self.features.insert(key, serde_json::to_vec(&feature)?)?;
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
        self.append_job_records(&self.segments, job_id, &batch)
    }

    async fn insert_matches(&self, batch: Vec<MatchedPair>) -> Result<usize, StoreError> {
        for m in &batch {
            let key = Self::job_key(m.job_id, self.next_id()?);
            self.matches.insert(key, serde_json::to_vec(m)?)?;
        }
        Ok(batch.len())
    }

    async fn insert_exceptions(&self, batch: Vec<Exception>) -> Result<usize, StoreError> {
        for e in &batch {
            let key = Self::job_key(e.job_id, self.next_id()?);
            self.exceptions.insert(key, serde_json::to_vec(e)?)?;
        }
        Ok(batch.len())
    }

    async fn insert_audit_records(&self, batch: Vec<AuditRecord>) -> Result<usize, StoreError> {
        for record in &batch {
            let key = Self::job_key(record.job_id, self.next_id()?);
            self.audit.insert(key, serde_json::to_vec(record)?)?;
        }
        Ok(batch.len())
    }

    async fn apply_standards(
        &self,
        job_id: Uuid,
        updates: Vec<(FeatureId, FeatureId, StandardsApplied)>,
    ) -> Result<usize, StoreError> {
        let mut applied = 0;
        for (older_id, newer_id, standards) in updates {
            for item in self.matches.scan_prefix(job_id.as_bytes()) {
                let (key, value) = item?;
                let mut m: MatchedPair = serde_json::from_slice(&value)?;
                if m.older_feature_id == older_id && m.newer_feature_id == newer_id {
                    m.standards_applied = Some(standards);
                    self.matches.insert(key, serde_json::to_vec(&m)?)?;
                    applied += 1;
                    break;
                }
            }
        }
        Ok(applied)
    }

    async fn matches_for_job(&self, job_id: Uuid) -> Result<Vec<MatchedPair>, StoreError> {
        Self::scan_job(&self.matches, job_id)
    }

    async fn exceptions_for_job(&self, job_id: Uuid) -> Result<Vec<Exception>, StoreError> {
        Self::scan_job(&self.exceptions, job_id)
    }

    async fn audit_for_job(&self, job_id: Uuid) -> Result<Vec<AuditRecord>, StoreError> {
        Self::scan_job(&self.audit, job_id)
    }

    async fn upsert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs
            .insert(job.id.as_bytes(), serde_json::to_vec(job)?)?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        let raw = self
            .jobs
            .get(id.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
