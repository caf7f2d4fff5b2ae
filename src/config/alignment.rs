//! Alignment Configuration - All pipeline tunables as operator-editable TOML
//!
//! Every knob the alignment pipeline recognizes is a field here. Each struct
//! implements `Default` with values matching the built-in constants, so a
//! missing config file changes nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

/// Configuration errors surfaced at load/validation time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ensemble similarity weights (distance, clock, dimensional, type, dtw,
/// icp, temporal). Must sum to a positive value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub distance: f64,
    pub clock: f64,
    pub dimensional: f64,
    pub type_compat: f64,
    pub dtw: f64,
    pub icp: f64,
    pub temporal: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            distance: defaults::ENSEMBLE_WEIGHT_DISTANCE,
            clock: defaults::ENSEMBLE_WEIGHT_CLOCK,
            dimensional: defaults::ENSEMBLE_WEIGHT_DIMENSIONAL,
            type_compat: defaults::ENSEMBLE_WEIGHT_TYPE,
            dtw: defaults::ENSEMBLE_WEIGHT_DTW,
            icp: defaults::ENSEMBLE_WEIGHT_ICP,
            temporal: defaults::ENSEMBLE_WEIGHT_TEMPORAL,
        }
    }
}

impl EnsembleWeights {
    pub fn sum(&self) -> f64 {
        self.distance
            + self.clock
            + self.dimensional
            + self.type_compat
            + self.dtw
            + self.icp
            + self.temporal
    }
}

/// DTW tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DtwConfig {
    /// Sakoe–Chiba band as a fraction of the longer sequence
    pub band_fraction: f64,
}

impl Default for DtwConfig {
    fn default() -> Self {
        Self {
            band_fraction: defaults::DTW_BAND_FRACTION,
        }
    }
}

/// ICP tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IcpConfig {
    pub max_iterations: usize,
    /// Convergence threshold on |Δ mean residual| (ft)
    pub convergence_ft: f64,
    /// Correspondence gate (ft)
    pub max_correspondence_ft: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: defaults::ICP_MAX_ITERATIONS,
            convergence_ft: defaults::ICP_CONVERGENCE_FT,
            max_correspondence_ft: defaults::ICP_MAX_CORRESPONDENCE_FT,
        }
    }
}

/// Run-3 refinement tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RefinementConfig {
    pub neighborhood_radius_ft: f64,
    pub cluster_unmatched_threshold: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            neighborhood_radius_ft: defaults::NEIGHBORHOOD_RADIUS_FT,
            cluster_unmatched_threshold: defaults::CLUSTER_UNMATCHED_THRESHOLD,
        }
    }
}

/// Visibility thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilityConfig {
    pub full_threshold: f64,
    pub dimmed_threshold: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            full_threshold: defaults::VISIBILITY_FULL_THRESHOLD,
            dimmed_threshold: defaults::VISIBILITY_DIMMED_THRESHOLD,
        }
    }
}

/// Root configuration for the alignment pipeline.
///
/// Load with `AlignmentConfig::load()` which searches:
/// 1. `$ILIAD_CONFIG` env var
/// 2. `./iliad.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Enable the ML augmentation provider
    #[serde(default)]
    pub enable_ml: bool,

    #[serde(default)]
    pub dtw: DtwConfig,

    #[serde(default)]
    pub icp: IcpConfig,

    #[serde(default)]
    pub refinement: RefinementConfig,

    #[serde(default)]
    pub visibility: VisibilityConfig,

    #[serde(default)]
    pub ensemble_weights: EnsembleWeights,

    /// Bulk persistence batch size
    #[serde(default = "default_persist_batch_size")]
    pub persist_batch_size: usize,

    /// Canonicalization-oracle timeout (ms)
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    /// Optional per-stage soft timeout (seconds); 0 disables
    #[serde(default)]
    pub stage_timeout_secs: u64,

    /// Directory exports are written under (one subdirectory per job id)
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_persist_batch_size() -> usize {
    defaults::PERSIST_BATCH_SIZE
}

fn default_oracle_timeout_ms() -> u64 {
    defaults::ORACLE_TIMEOUT_MS
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            enable_ml: false,
            dtw: DtwConfig::default(),
            icp: IcpConfig::default(),
            refinement: RefinementConfig::default(),
            visibility: VisibilityConfig::default(),
            ensemble_weights: EnsembleWeights::default(),
            persist_batch_size: default_persist_batch_size(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            stage_timeout_secs: 0,
            export_dir: default_export_dir(),
        }
    }
}

impl AlignmentConfig {
    /// Load configuration using the standard search order:
    /// 1. `$ILIAD_CONFIG` environment variable
    /// 2. `./iliad.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("ILIAD_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded alignment config from ILIAD_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from ILIAD_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "ILIAD_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("iliad.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!(path = %local.display(), "Loaded alignment config");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./iliad.toml, using defaults");
                }
            }
        }

        info!("Using built-in alignment config defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check ranges. Violations are configuration errors, not
    /// recoverable conditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ensemble_weights.sum() <= 0.0 {
            return Err(ConfigError::Invalid(
                "ensemble_weights must sum to a positive value".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.dtw.band_fraction) {
            return Err(ConfigError::Invalid(format!(
                "dtw.band_fraction must be in [0, 1], got {}",
                self.dtw.band_fraction
            )));
        }
        if self.icp.max_iterations == 0 {
            return Err(ConfigError::Invalid("icp.max_iterations must be > 0".into()));
        }
        if self.icp.max_correspondence_ft <= 0.0 {
            return Err(ConfigError::Invalid(
                "icp.max_correspondence_ft must be > 0".into(),
            ));
        }
        if self.visibility.dimmed_threshold > self.visibility.full_threshold {
            return Err(ConfigError::Invalid(
                "visibility.dimmed_threshold must not exceed full_threshold".into(),
            ));
        }
        if self.persist_batch_size == 0 {
            return Err(ConfigError::Invalid("persist_batch_size must be > 0".into()));
        }
        Ok(())
    }
}
