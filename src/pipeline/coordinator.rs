//! Job Coordinator — stage sequencing for one alignment job
//!
//! Drives the per-pair stages (anchors → correction → DTW → ICP →
//! matching) for every older run against the baseline, then the global
//! stages (refinement → standards → graph → visibility → export). Every
//! stage transition lands in the job record and the audit stream; a
//! failed stage fails the job and skips the rest. Jobs may be aborted
//! between stages via the coordinator's cancellation token.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::stages::build_plan;
use crate::align::{
    align_spacings, apply_correction, build_segments, match_anchors, refine_segment, IcpPoint,
};
use crate::augment;
use crate::config::AlignmentConfig;
use crate::export::{export_job, ExportContext};
use crate::graph::{build_graph, detect_clusters};
use crate::matching::{match_anomalies, refine, MatchContext};
use crate::normalize;
use crate::standards;
use crate::storage::{persist_batched, Store, StoreError};
use crate::types::{
    AnchorPair, AuditAction, AuditRecord, DatasetId, EventType, ExceptionCategory, Feature,
    FeatureId, Job, JobStatus, ResultSummary, Run, RunId, StageState, VisibilityState,
};

/// Methodology steps recorded on the PHMSA compliance record.
const METHODOLOGY: [&str; 8] = [
    "girth_weld_anchor_matching",
    "piecewise_linear_correction",
    "dtw_alignment",
    "icp_refinement",
    "hungarian_assignment",
    "ensemble_scoring",
    "run3_refinement",
    "standards_assessment",
];

/// Pipeline errors. Stage-level failures are captured in the job record;
/// only store failures around the job record itself escape `run_dataset`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Correction(#[from] crate::align::CorrectionError),

    #[error(transparent)]
    Export(#[from] crate::export::ExportError),

    #[error("stage {0} timed out")]
    Timeout(String),

    #[error("job aborted")]
    Cancelled,
}

/// Per-pair intermediate state threaded through the pair stages.
struct PairState {
    older_run: Run,
    older_features: Vec<Feature>,
    anchors: Vec<AnchorPair>,
    dtw_confidence: Option<f64>,
    icp_rmse_by_segment: HashMap<usize, f64>,
}

/// Coordinates alignment jobs over a shared store.
pub struct JobCoordinator {
    store: Arc<dyn Store>,
    config: AlignmentConfig,
    cancel: CancellationToken,
}

impl JobCoordinator {
    pub fn new(store: Arc<dyn Store>, config: AlignmentConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for aborting between stages.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reset process-wide registries (canonicalization memo, augmentation
    /// provider). Call at orchestrator teardown.
    pub fn shutdown(&self) {
        normalize::reset_memo();
        augment::reset();
        info!("Coordinator shut down; process-wide registries reset");
    }

    /// Run the full alignment pipeline over a dataset's runs.
    ///
    /// The returned job carries the outcome; stage failures surface as
    /// `JobStatus::Failed` on the record, not as an `Err`.
    pub async fn run_dataset(&self, dataset_id: DatasetId) -> Result<Job, PipelineError> {
        let runs = self.store.runs_for_dataset(dataset_id).await?;
        let run_ids: Vec<RunId> = runs.iter().map(|r| r.id).collect();

        let mut job = Job::new(dataset_id, run_ids);
        if runs.len() < 2 {
            job.status = JobStatus::Failed;
            job.error = Some(format!(
                "alignment needs at least two runs, dataset has {}",
                runs.len()
            ));
            self.store.upsert_job(&job).await?;
            return Ok(job);
        }

        let pair_years: Vec<i32> = runs[..runs.len() - 1].iter().map(|r| r.year).collect();
        job.stage_status = build_plan(&pair_years);
        job.status = JobStatus::Running;
        self.store.upsert_job(&job).await?;

        self.audit(
            job.id,
            AuditAction::JobCreated,
            "job",
            serde_json::json!({
                "dataset_id": dataset_id,
                "runs": runs.len(),
                "stages": job.stage_status.len(),
            }),
        )
        .await?;
        self.audit(
            job.id,
            AuditAction::MlHooksStatus,
            "job",
            serde_json::json!({
                "enabled": self.config.enable_ml,
                "provider": augment::current().name(),
                "ready": augment::is_ready_cached().await,
            }),
        )
        .await?;

        let outcome = self.run_stages(&mut job, &runs).await;
        match outcome {
            Ok(summary) => {
                job.status = JobStatus::Done;
                job.progress = 1.0;
                job.result_summary = Some(summary);
                info!(job_id = %job.id, "Job complete");
            }
            Err(PipelineError::Cancelled) => {
                job.status = JobStatus::Aborted;
                job.error = Some("job aborted between stages".into());
                warn!(job_id = %job.id, "Job aborted");
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                error!(job_id = %job.id, error = %e, "Job failed");
            }
        }
        self.store.upsert_job(&job).await?;
        Ok(job)
    }

    // ------------------------------------------------------------------
    // Stage machinery
    // ------------------------------------------------------------------

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    async fn audit(
        &self,
        job_id: Uuid,
        action: AuditAction,
        stage: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.store
            .insert_audit_records(vec![AuditRecord::new(job_id, action, stage, details)])
            .await
            .map(|_| ())
    }

    async fn begin_stage(&self, job: &mut Job, idx: usize) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            self.skip_remaining(job, idx).await?;
            return Err(PipelineError::Cancelled);
        }
        let name = job.stage_status[idx].name.clone();
        job.stage_status[idx].status = StageState::Running;
        job.stage_status[idx].started_at = Some(Self::now());
        job.current_stage = idx + 1;
        self.store.upsert_job(job).await?;
        self.audit(job.id, AuditAction::StageStarted, &name, serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn finish_stage(
        &self,
        job: &mut Job,
        idx: usize,
        message: Option<String>,
    ) -> Result<(), PipelineError> {
        let name = job.stage_status[idx].name.clone();
        job.stage_status[idx].status = StageState::Done;
        job.stage_status[idx].finished_at = Some(Self::now());
        job.stage_status[idx].message = message.clone();
        job.progress = (idx + 1) as f64 / job.stage_status.len() as f64;
        self.store.upsert_job(job).await?;
        self.audit(
            job.id,
            AuditAction::StageFinished,
            &name,
            serde_json::json!({ "message": message }),
        )
        .await?;
        Ok(())
    }

    async fn fail_stage(
        &self,
        job: &mut Job,
        idx: usize,
        error: &PipelineError,
    ) -> Result<(), PipelineError> {
        job.stage_status[idx].status = StageState::Failed;
        job.stage_status[idx].finished_at = Some(Self::now());
        job.stage_status[idx].message = Some(error.to_string());
        self.skip_remaining(job, idx + 1).await?;
        Ok(())
    }

    async fn skip_remaining(&self, job: &mut Job, from: usize) -> Result<(), PipelineError> {
        for status in job.stage_status.iter_mut().skip(from) {
            if status.status == StageState::Pending {
                status.status = StageState::Skipped;
            }
        }
        self.store.upsert_job(job).await?;
        Ok(())
    }

    /// Apply the configured soft timeout to one stage body.
    async fn bounded<T>(
        &self,
        name: &str,
        fut: impl std::future::Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        if self.config.stage_timeout_secs == 0 {
            return fut.await;
        }
        let limit = Duration::from_secs(self.config.stage_timeout_secs);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(name.to_string())),
        }
    }

    /// Run one stage body with bookkeeping; on failure the job record is
    /// marked and the error propagates.
    async fn stage<T>(
        &self,
        job: &mut Job,
        idx: usize,
        fut: impl std::future::Future<Output = Result<(T, Option<String>), PipelineError>>,
    ) -> Result<T, PipelineError> {
        self.begin_stage(job, idx).await?;
        let name = job.stage_status[idx].name.clone();
        match self.bounded(&name, fut).await {
            Ok((value, message)) => {
                self.finish_stage(job, idx, message).await?;
                Ok(value)
            }
            Err(e) => {
                self.fail_stage(job, idx, &e).await?;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // The pipeline proper
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_lines)] // one stage after another, in order
    async fn run_stages(
        &self,
        job: &mut Job,
        runs: &[Run],
    ) -> Result<ResultSummary, PipelineError> {
        let job_id = job.id;
        let batch = self.config.persist_batch_size;
        let store = &self.store;

        let baseline = runs[runs.len() - 1].clone();
        let baseline_features = store.features_for_run(baseline.id).await?;
        let baseline_welds: Vec<Feature> = baseline_features
            .iter()
            .filter(|f| f.event_type == EventType::GirthWeld)
            .cloned()
            .collect();
        let baseline_anomalies: Vec<Feature> = baseline_features
            .iter()
            .filter(|f| !f.is_reference_point)
            .cloned()
            .collect();

        let mut summary = ResultSummary {
            run_pairs: runs.len() - 1,
            ..ResultSummary::default()
        };
        let mut stage_idx = 0usize;

        for older_run in &runs[..runs.len() - 1] {
            let mut state = PairState {
                older_run: older_run.clone(),
                older_features: Vec::new(),
                anchors: Vec::new(),
                dtw_confidence: None,
                icp_rmse_by_segment: HashMap::new(),
            };

            // --- anchor_match -------------------------------------------
            let older_run_id = state.older_run.id;
            let (older_features, anchors) = self
                .stage(job, stage_idx, async {
                    let older_features = store.features_for_run(older_run_id).await?;
                    let older_welds: Vec<Feature> = older_features
                        .iter()
                        .filter(|f| f.event_type == EventType::GirthWeld)
                        .cloned()
                        .collect();
                    let outcome = match_anchors(job_id, &older_welds, &baseline_welds);
                    let exception_count = outcome.exceptions.len();
                    persist_batched(outcome.exceptions, batch, |b| async move {
                        store.insert_exceptions(b).await
                    })
                    .await?;
                    let message = format!(
                        "{} anchors, {} exceptions",
                        outcome.anchors.len(),
                        exception_count
                    );
                    Ok(((older_features, outcome.anchors), Some(message)))
                })
                .await?;
            state.older_features = older_features;
            state.anchors = anchors;
            summary.anchors += state.anchors.len();
            stage_idx += 1;

            // --- distance_correction ------------------------------------
            let corrected = self
                .stage(job, stage_idx, async {
                    let model = build_segments(&state.anchors);
                    let updates = apply_correction(&state.older_features, &model)?;
                    let mut corrected = state.older_features.clone();
                    for (feature, (_, value)) in corrected.iter_mut().zip(updates.iter()) {
                        feature.corrected_distance_ft = Some(*value);
                    }
                    persist_batched(updates, batch, |chunk| async move {
                        store.update_corrected_distances(&chunk).await
                    })
                    .await?;
                    let segment_count = model.segments.len();
                    store
                        .insert_correction_segments(job_id, model.segments)
                        .await?;
                    Ok((corrected, Some(format!("{segment_count} segments"))))
                })
                .await?;
            state.older_features = corrected;
            stage_idx += 1;

            // --- dtw_align ----------------------------------------------
            let older_weld_dists: Vec<f64> = state
                .older_features
                .iter()
                .filter(|f| f.event_type == EventType::GirthWeld)
                .map(|f| f.log_distance_ft)
                .collect();
            let newer_weld_dists: Vec<f64> =
                baseline_welds.iter().map(|f| f.log_distance_ft).collect();
            let band = self.config.dtw.band_fraction;
            let dtw_confidence = self
                .stage(job, stage_idx, async {
                    let result = align_spacings(&older_weld_dists, &newer_weld_dists, band);
                    self.audit(
                        job_id,
                        AuditAction::AlgoDtw,
                        "dtw_align",
                        serde_json::json!({
                            "older_run": older_run_id,
                            "confidence": result.confidence,
                            "normalized_cost": result.normalized_cost,
                            "path_len": result.path.len(),
                            "anchor_mappings": result.anchor_mappings.len(),
                        }),
                    )
                    .await?;
                    let message = format!("confidence {:.1}", result.confidence);
                    Ok((result.confidence, Some(message)))
                })
                .await?;
            state.dtw_confidence = Some(dtw_confidence);
            stage_idx += 1;

            // --- icp_refine ---------------------------------------------
            let icp_config = self.config.icp;
            let icp_rmse = self
                .stage(job, stage_idx, async {
                    let mut rmse_by_segment = HashMap::new();
                    for window in state.anchors.windows(2) {
                        let (lo, hi) =
                            (window[0].newer_distance_ft, window[1].newer_distance_ft);
                        let to_points = |features: &[Feature]| -> Vec<IcpPoint> {
                            features
                                .iter()
                                .filter(|f| !f.is_reference_point)
                                .filter(|f| {
                                    let d = f.aligned_distance_ft();
                                    lo <= d && d < hi
                                })
                                .map(|f| IcpPoint {
                                    feature_id: f.id,
                                    distance_ft: f.aligned_distance_ft(),
                                    clock_hr: f.clock_decimal,
                                })
                                .collect()
                        };
                        let source = to_points(&state.older_features);
                        let target = to_points(&baseline_anomalies);
                        if source.is_empty() || target.is_empty() {
                            continue;
                        }
                        let result = refine_segment(&source, &target, &icp_config);
                        if !result.correspondences.is_empty() {
                            rmse_by_segment.insert(window[0].segment_index, result.rmse);
                        }
                    }
                    let refined = rmse_by_segment.len();
                    let mean_rmse = if refined == 0 {
                        0.0
                    } else {
                        rmse_by_segment.values().sum::<f64>() / refined as f64
                    };
                    self.audit(
                        job_id,
                        AuditAction::AlgoIcp,
                        "icp_refine",
                        serde_json::json!({
                            "older_run": older_run_id,
                            "segments_refined": refined,
                            "mean_rmse_ft": mean_rmse,
                        }),
                    )
                    .await?;
                    Ok((rmse_by_segment, Some(format!("{refined} segments refined"))))
                })
                .await?;
            state.icp_rmse_by_segment = icp_rmse;
            stage_idx += 1;

            // --- anomaly_match ------------------------------------------
            let weights = self.config.ensemble_weights;
            let enable_ml = self.config.enable_ml;
            self.stage(job, stage_idx, async {
                let older_anomalies: Vec<Feature> = state
                    .older_features
                    .iter()
                    .filter(|f| !f.is_reference_point)
                    .cloned()
                    .collect();
                let ctx = MatchContext {
                    job_id,
                    older_run: &state.older_run,
                    newer_run: &baseline,
                    weights: &weights,
                    dtw_confidence: state.dtw_confidence,
                    icp_rmse_by_segment: state.icp_rmse_by_segment.clone(),
                    enable_ml,
                };
                let outcome = match_anomalies(
                    &ctx,
                    &state.anchors,
                    &older_anomalies,
                    &baseline_anomalies,
                )
                .await;
                self.audit(
                    job_id,
                    AuditAction::AlgoEnsemble,
                    "anomaly_match",
                    serde_json::json!({
                        "older_run": older_run_id,
                        "ensemble_calls": outcome.ensemble_calls,
                        "matches": outcome.matches.len(),
                        "segments": outcome.segments_processed,
                    }),
                )
                .await?;
                let message = format!(
                    "{} matches, {} exceptions",
                    outcome.matches.len(),
                    outcome.exceptions.len()
                );
                persist_batched(outcome.matches, batch, |b| async move {
                    store.insert_matches(b).await
                })
                .await?;
                persist_batched(outcome.exceptions, batch, |b| async move {
                    store.insert_exceptions(b).await
                })
                .await?;
                Ok(((), Some(message)))
            })
            .await?;
            stage_idx += 1;
        }

        // --- run3_refinement --------------------------------------------
        let refinement_config = self.config.refinement;
        let run_order: Vec<RunId> = runs.iter().map(|r| r.id).collect();
        self.stage(job, stage_idx, async {
            let matches = store.matches_for_job(job_id).await?;
            let report = refine(
                job_id,
                &baseline_anomalies,
                &matches,
                &run_order,
                &refinement_config,
            );
            self.audit(
                job_id,
                AuditAction::Run3Refinement,
                "run3_refinement",
                serde_json::json!({
                    "flagged": report.flags.len(),
                    "multi_run_features": report.multi_run_features,
                }),
            )
            .await?;
            let message = format!("{} features flagged", report.flags.len());
            persist_batched(report.exceptions, batch, |b| async move {
                store.insert_exceptions(b).await
            })
            .await?;
            Ok(((), Some(message)))
        })
        .await?;
        stage_idx += 1;

        // --- standards_assessment ---------------------------------------
        let feature_lists =
            futures::future::try_join_all(runs.iter().map(|run| store.features_for_run(run.id)))
                .await?;
        let all_features: HashMap<FeatureId, Feature> = feature_lists
            .into_iter()
            .flatten()
            .map(|feature| (feature.id, feature))
            .collect();
        let runs_by_id: HashMap<RunId, Run> = runs.iter().map(|r| (r.id, r.clone())).collect();

        let phmsa = self
            .stage(job, stage_idx, async {
                let matches = store.matches_for_job(job_id).await?;
                let baseline_anomaly_refs: Vec<&Feature> = baseline_anomalies.iter().collect();
                let clusters = detect_clusters(baseline.id, &baseline_anomaly_refs);
                let outcome = standards::assess_job(
                    job_id,
                    &matches,
                    &all_features,
                    &runs_by_id,
                    &clusters,
                    METHODOLOGY.iter().map(|m| m.to_string()).collect(),
                );
                self.audit(
                    job_id,
                    AuditAction::StandardsAssessment,
                    "standards_assessment",
                    serde_json::json!({
                        "assessed": outcome.updates.len(),
                        "exceptions": outcome.exceptions.len(),
                    }),
                )
                .await?;
                self.audit(
                    job_id,
                    AuditAction::PhmsaCompliance,
                    "standards_assessment",
                    serde_json::json!({
                        "audit_ready": outcome.phmsa.audit_ready,
                        "odometer_documented": outcome.phmsa.odometer_documented,
                    }),
                )
                .await?;
                let message = format!("{} matches assessed", outcome.updates.len());
                store.apply_standards(job_id, outcome.updates).await?;
                persist_batched(outcome.exceptions, batch, |b| async move {
                    store.insert_exceptions(b).await
                })
                .await?;
                Ok((outcome.phmsa, Some(message)))
            })
            .await?;
        summary.phmsa = Some(phmsa);
        stage_idx += 1;

        // --- interaction_graph ------------------------------------------
        let anomalies_by_run: HashMap<RunId, Vec<Feature>> = {
            let mut map: HashMap<RunId, Vec<Feature>> = HashMap::new();
            for feature in all_features.values() {
                if !feature.is_reference_point {
                    map.entry(feature.run_id).or_default().push(feature.clone());
                }
            }
            map
        };
        let (clusters_found, chains_found) = self
            .stage(job, stage_idx, async {
                let matches = store.matches_for_job(job_id).await?;
                let (graph, exceptions) =
                    build_graph(job_id, &anomalies_by_run, &matches, &run_order);
                let counts = (graph.clusters.len(), graph.chains.len());
                let message = format!(
                    "{} edges, {} clusters, {} chains",
                    graph.edges.len(),
                    counts.0,
                    counts.1
                );
                persist_batched(exceptions, batch, |b| async move {
                    store.insert_exceptions(b).await
                })
                .await?;
                Ok((counts, Some(message)))
            })
            .await?;
        summary.interaction_clusters = clusters_found;
        summary.temporal_chains = chains_found;
        stage_idx += 1;

        // --- visibility_scoring -----------------------------------------
        let visibility_config = self.config.visibility;
        let total_runs = runs.len();
        let baseline_run_id = baseline.id;
        self.stage(job, stage_idx, async {
            let matches = store.matches_for_job(job_id).await?;
            let exceptions = store.exceptions_for_job(job_id).await?;

            let mut match_scores: HashMap<FeatureId, f64> = HashMap::new();
            let mut partner_map: HashMap<FeatureId, Vec<FeatureId>> = HashMap::new();
            for m in &matches {
                match_scores.insert(m.older_feature_id, m.confidence_score);
                match_scores.insert(m.newer_feature_id, m.confidence_score);
                partner_map
                    .entry(m.older_feature_id)
                    .or_default()
                    .push(m.newer_feature_id);
                partner_map
                    .entry(m.newer_feature_id)
                    .or_default()
                    .push(m.older_feature_id);
            }
            let flagged = |category: ExceptionCategory| -> HashSet<FeatureId> {
                exceptions
                    .iter()
                    .filter(|e| e.category == category)
                    .filter_map(|e| e.feature_id)
                    .collect()
            };
            let neighborhood_excess = flagged(ExceptionCategory::NeighborhoodExcess);
            let run3_unsupported = flagged(ExceptionCategory::Run3Unsupported);

            let features: Vec<Feature> = all_features.values().cloned().collect();
            let scored = crate::visibility::score_features(
                &crate::visibility::VisibilityInput {
                    features: &features,
                    match_scores: &match_scores,
                    partner_map: &partner_map,
                    baseline_run_id,
                    total_runs,
                    neighborhood_excess: &neighborhood_excess,
                    run3_unsupported: &run3_unsupported,
                },
                &visibility_config,
            );
            let full = scored
                .iter()
                .filter(|v| v.state == VisibilityState::Full)
                .count();
            let dimmed = scored
                .iter()
                .filter(|v| v.state == VisibilityState::Dimmed)
                .count();
            let hidden = scored.len() - full - dimmed;
            Ok((
                (),
                Some(format!("{full} full, {dimmed} dimmed, {hidden} hidden")),
            ))
        })
        .await?;
        stage_idx += 1;

        // --- export ------------------------------------------------------
        let export_dir = self.config.export_dir.clone();
        let (matched_pairs, exception_count) = self
            .stage(job, stage_idx, async {
                let matches = store.matches_for_job(job_id).await?;
                let exceptions = store.exceptions_for_job(job_id).await?;
                let audit = store.audit_for_job(job_id).await?;
                let ctx = ExportContext {
                    features: &all_features,
                    runs: &runs_by_id,
                };
                let artifacts =
                    export_job(&export_dir, job_id, &matches, &exceptions, &audit, &ctx)?;
                let message = format!("wrote {}", artifacts.matches_csv.display());
                Ok(((matches.len(), exceptions.len()), Some(message)))
            })
            .await?;
        summary.matched_pairs = matched_pairs;
        summary.exceptions = exception_count;

        Ok(summary)
    }
}
