//! ML augmentation provider — optional scoring sidecar
//!
//! A process-wide capability slot holding the active provider. The default
//! pass-through provider returns the deterministic score unchanged, so the
//! pipeline behaves identically with augmentation disabled, missing, or
//! failing. Blending is bounded: the deterministic score always
//! contributes 80%, and the adjustment can never move a score by more
//! than 10 points.
//!
//! Only the orchestrator installs or resets the slot; the slot never holds
//! job-scoped data.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::defaults::AUGMENT_READINESS_CACHE_SECS;
use crate::types::{Feature, GrowthRates, InteractionCluster};

/// Augmentation call errors. All are non-fatal: callers fall back to the
/// deterministic score.
#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("provider not ready")]
    NotReady,
    #[error("provider call failed: {0}")]
    Call(String),
}

/// One augmentation answer.
#[derive(Debug, Clone)]
pub struct Augmentation {
    pub adjusted_score: f64,
    /// Provider confidence ∈ [0, 1]
    pub ml_confidence: f64,
    pub explanation: String,
    pub model_id: String,
    pub model_version: String,
}

/// Pluggable augmentation capability.
#[async_trait]
pub trait AugmentationProvider: Send + Sync {
    /// Re-score a candidate feature pair given the deterministic score.
    async fn score_feature_pair(
        &self,
        older: &Feature,
        newer: &Feature,
        deterministic_score: f64,
    ) -> Result<Augmentation, AugmentError>;

    /// Assess a growth trend given the deterministic growth rates.
    async fn assess_growth_trend(
        &self,
        growth: &GrowthRates,
        deterministic_score: f64,
    ) -> Result<Augmentation, AugmentError>;

    /// Score an interaction subgraph.
    async fn score_interaction_subgraph(
        &self,
        cluster: &InteractionCluster,
        deterministic_score: f64,
    ) -> Result<Augmentation, AugmentError>;

    /// Readiness probe. Results are cached by [`is_ready_cached`].
    async fn is_ready(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Default provider: deterministic score in, deterministic score out.
pub struct PassthroughProvider;

#[async_trait]
impl AugmentationProvider for PassthroughProvider {
    async fn score_feature_pair(
        &self,
        _older: &Feature,
        _newer: &Feature,
        deterministic_score: f64,
    ) -> Result<Augmentation, AugmentError> {
        Ok(passthrough(deterministic_score))
    }

    async fn assess_growth_trend(
        &self,
        _growth: &GrowthRates,
        deterministic_score: f64,
    ) -> Result<Augmentation, AugmentError> {
        Ok(passthrough(deterministic_score))
    }

    async fn score_interaction_subgraph(
        &self,
        _cluster: &InteractionCluster,
        deterministic_score: f64,
    ) -> Result<Augmentation, AugmentError> {
        Ok(passthrough(deterministic_score))
    }

    async fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

fn passthrough(score: f64) -> Augmentation {
    Augmentation {
        adjusted_score: score,
        ml_confidence: 1.0,
        explanation: "deterministic score unchanged".into(),
        model_id: "passthrough".into(),
        model_version: "1".into(),
    }
}

/// Blend a provider answer with the deterministic score:
/// `det·0.8 + ml·0.2`, clamped to ±10 points of `det` and to [0, 100].
pub fn blend(deterministic: f64, ml: f64) -> f64 {
    let blended = deterministic * 0.8 + ml * 0.2;
    blended
        .clamp(deterministic - 10.0, deterministic + 10.0)
        .clamp(0.0, 100.0)
}

// ============================================================================
// Process-wide provider slot
// ============================================================================

struct Slot(std::sync::Arc<dyn AugmentationProvider>);

static SLOT: OnceLock<ArcSwap<Slot>> = OnceLock::new();
static READINESS: Mutex<Option<(bool, Instant)>> = Mutex::new(None);

fn slot() -> &'static ArcSwap<Slot> {
    SLOT.get_or_init(|| ArcSwap::from_pointee(Slot(std::sync::Arc::new(PassthroughProvider))))
}

/// Install a provider. Orchestrator-only.
pub fn install(provider: std::sync::Arc<dyn AugmentationProvider>) {
    debug!(provider = provider.name(), "Installing augmentation provider");
    slot().store(std::sync::Arc::new(Slot(provider)));
    invalidate_readiness();
}

/// Reset to the pass-through default. Orchestrator teardown.
pub fn reset() {
    slot().store(std::sync::Arc::new(Slot(std::sync::Arc::new(
        PassthroughProvider,
    ))));
    invalidate_readiness();
}

/// The currently installed provider.
pub fn current() -> std::sync::Arc<dyn AugmentationProvider> {
    slot().load().0.clone()
}

fn invalidate_readiness() {
    if let Ok(mut cache) = READINESS.lock() {
        *cache = None;
    }
}

/// Readiness probe with a 30-second cache.
pub async fn is_ready_cached() -> bool {
    if let Ok(cache) = READINESS.lock() {
        if let Some((ready, at)) = *cache {
            if at.elapsed() < Duration::from_secs(AUGMENT_READINESS_CACHE_SECS) {
                return ready;
            }
        }
    }
    let ready = current().is_ready().await;
    if let Ok(mut cache) = READINESS.lock() {
        *cache = Some((ready, Instant::now()));
    }
    ready
}

/// Blend a feature-pair score through the active provider.
///
/// Any provider error leaves the deterministic score unchanged.
pub async fn augment_pair_score(older: &Feature, newer: &Feature, deterministic: f64) -> f64 {
    let provider = current();
    match provider.score_feature_pair(older, newer, deterministic).await {
        Ok(answer) => blend(deterministic, answer.adjusted_score),
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "Augmentation failed; keeping deterministic score");
            deterministic
        }
    }
}
