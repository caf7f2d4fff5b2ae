//! Interaction-graph types: edges, clusters, temporal chains

use serde::{Deserialize, Serialize};

use super::{FeatureId, RunId};

/// Edge kinds in the anomaly interaction graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Matched pair across runs
    MatchLink,
    /// Within-run pair closer than the proximity radius
    SpatialProximity,
    /// Within-run pair inside the ASME B31.8S §A-4.3 interaction criteria
    InteractionZone,
}

/// Direction(s) in which an interaction-zone criterion fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionKind {
    Axial,
    Circumferential,
    Combined,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Axial => "AXIAL",
            InteractionKind::Circumferential => "CIRCUMFERENTIAL",
            InteractionKind::Combined => "COMBINED",
        }
    }
}

/// One edge of the interaction graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEdge {
    pub kind: EdgeKind,
    pub a: FeatureId,
    pub b: FeatureId,
    /// Axial separation (ft) for within-run edges
    pub separation_ft: Option<f64>,
    /// Direction of an interaction-zone edge
    pub interaction: Option<InteractionKind>,
}

/// A union-find cluster of interacting anomalies within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionCluster {
    pub run_id: RunId,
    /// Member features, ascending id order
    pub members: Vec<FeatureId>,
    /// Σ individual lengths + axial span · 12 (in)
    pub combined_length_in: f64,
    /// Max member depth (%)
    pub combined_depth_pct: f64,
    pub interaction_kind: InteractionKind,
}

/// A chain of the same physical anomaly observed across ≥ 3 runs,
/// discovered by walking MATCH_LINK edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalChain {
    /// (run id, feature id) links, oldest run first
    pub links: Vec<(RunId, FeatureId)>,
}

/// Full interaction-analysis output for a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionGraph {
    pub edges: Vec<InteractionEdge>,
    pub clusters: Vec<InteractionCluster>,
    pub chains: Vec<TemporalChain>,
}
