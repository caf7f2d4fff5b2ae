//! Event-type canonicalizer
//!
//! Maps free-form event strings ("EXT METAL LOSS", "girth weld", "AGM") to
//! the closed canonical set. A case-insensitive direct map covers the
//! common vendor spellings; unknown strings are delegated to the oracle.
//! Lookups are memoized in a process-wide table so each spelling costs one
//! resolution per process. The memo is installed at orchestrator start and
//! reset at teardown; it never holds job-scoped data.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use tracing::{debug, warn};

use crate::oracle::{CanonOracle, OracleAnswer};
use crate::types::EventType;

/// Direct-map table of common vendor spellings (compared lowercased,
/// trimmed, inner whitespace collapsed).
const DIRECT_MAP: &[(&str, EventType)] = &[
    ("girth weld", EventType::GirthWeld),
    ("gw", EventType::GirthWeld),
    ("weld", EventType::GirthWeld),
    ("valve", EventType::Valve),
    ("tee", EventType::Tee),
    ("tap", EventType::Tap),
    ("hot tap", EventType::Tap),
    ("flange", EventType::Flange),
    ("launcher", EventType::Launcher),
    ("pig launcher", EventType::Launcher),
    ("receiver", EventType::Receiver),
    ("pig receiver", EventType::Receiver),
    ("support", EventType::Support),
    ("metal loss", EventType::MetalLoss),
    ("ml", EventType::MetalLoss),
    ("corrosion", EventType::MetalLoss),
    ("ext metal loss", EventType::MetalLoss),
    ("int metal loss", EventType::MetalLoss),
    ("external metal loss", EventType::MetalLoss),
    ("internal metal loss", EventType::MetalLoss),
    ("mfg metal loss", EventType::MetalLossMfg),
    ("manufacturing anomaly", EventType::MetalLossMfg),
    ("mill anomaly", EventType::MetalLossMfg),
    ("cluster", EventType::Cluster),
    ("corrosion cluster", EventType::Cluster),
    ("dent", EventType::Dent),
    ("dent with metal loss", EventType::DentMetalLoss),
    ("dent w/ metal loss", EventType::DentMetalLoss),
    ("gouge", EventType::Gouge),
    ("crack", EventType::Crack),
    ("crack like", EventType::Crack),
    ("crack-like", EventType::Crack),
    ("lamination", EventType::Lamination),
    ("inclusion", EventType::Inclusion),
    ("seam weld anomaly", EventType::SeamWeldAnomaly),
    ("seam anomaly", EventType::SeamWeldAnomaly),
    ("girth weld anomaly", EventType::GirthWeldAnomaly),
    ("bend", EventType::Bend),
    ("field bend", EventType::FieldBend),
    ("casing", EventType::Casing),
    ("casing start", EventType::Casing),
    ("casing end", EventType::Casing),
    ("marker", EventType::Marker),
    ("agm", EventType::Marker),
    ("anode", EventType::Anode),
    ("repair", EventType::Repair),
    ("sleeve", EventType::Sleeve),
    ("repair sleeve", EventType::Sleeve),
    ("wall thickness change", EventType::WallThicknessChange),
    ("wt change", EventType::WallThicknessChange),
];

/// Process-wide memoization table. Guarded writes keep concurrent jobs
/// consistent; entries are raw-string → canonical token only.
static CANON_MEMO: OnceLock<RwLock<HashMap<String, EventType>>> = OnceLock::new();

fn memo() -> &'static RwLock<HashMap<String, EventType>> {
    CANON_MEMO.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Clear the process-wide memo. Called at orchestrator teardown.
pub fn reset_memo() {
    if let Ok(mut m) = memo().write() {
        m.clear();
    }
}

/// Number of memoized spellings (diagnostics).
pub fn memo_len() -> usize {
    memo().read().map(|m| m.len()).unwrap_or(0)
}

fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn direct_lookup(key: &str) -> Option<EventType> {
    DIRECT_MAP
        .iter()
        .find(|(spelling, _)| *spelling == key)
        .map(|(_, t)| *t)
        // A raw canonical token is also accepted ("METAL_LOSS")
        .or_else(|| EventType::from_token(key))
}

fn memo_get(key: &str) -> Option<EventType> {
    memo().read().ok().and_then(|m| m.get(key).copied())
}

fn memo_put(key: &str, value: EventType) {
    if let Ok(mut m) = memo().write() {
        m.entry(key.to_string()).or_insert(value);
    }
}

/// Canonicalize one raw event string, consulting the oracle on a miss.
///
/// Oracle failures are non-fatal: the string canonicalizes to `Other` and
/// the miss is memoized so the oracle is not hammered per row.
pub async fn canonicalize_event(raw: &str, oracle: Option<&dyn CanonOracle>) -> EventType {
    let key = normalize_key(raw);
    if key.is_empty() {
        return EventType::Other;
    }

    if let Some(hit) = memo_get(&key) {
        return hit;
    }

    if let Some(direct) = direct_lookup(&key) {
        memo_put(&key, direct);
        return direct;
    }

    let resolved = match oracle {
        Some(oracle) => match oracle.resolve(raw).await {
            Ok(OracleAnswer::EventToken(token)) => {
                debug!(raw, token = token.as_str(), "Oracle canonicalized event");
                token
            }
            Ok(_) => EventType::Other,
            Err(e) => {
                warn!(raw, error = %e, "Event oracle failed; using OTHER");
                EventType::Other
            }
        },
        None => EventType::Other,
    };

    memo_put(&key, resolved);
    resolved
}

/// Synchronous variant: direct map and memo only, `Other` on miss.
/// Never calls the oracle.
pub fn canonicalize_event_sync(raw: &str) -> EventType {
    let key = normalize_key(raw);
    if key.is_empty() {
        return EventType::Other;
    }
    if let Some(hit) = memo_get(&key) {
        return hit;
    }
    if let Some(direct) = direct_lookup(&key) {
        memo_put(&key, direct);
        return direct;
    }
    EventType::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{NullOracle, OracleError};
    use async_trait::async_trait;

    struct FixedOracle(EventType);

    #[async_trait]
    impl CanonOracle for FixedOracle {
        async fn resolve(&self, _raw: &str) -> Result<OracleAnswer, OracleError> {
            Ok(OracleAnswer::EventToken(self.0))
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn direct_map_is_case_and_space_insensitive() {
        assert_eq!(canonicalize_event_sync("  GIRTH   WELD "), EventType::GirthWeld);
        assert_eq!(canonicalize_event_sync("Ext Metal Loss"), EventType::MetalLoss);
        assert_eq!(canonicalize_event_sync("AGM"), EventType::Marker);
        assert_eq!(canonicalize_event_sync("METAL_LOSS"), EventType::MetalLoss);
    }

    #[tokio::test]
    async fn sync_miss_is_not_memoized() {
        // The async path may still resolve a string the sync variant
        // answered OTHER for
        assert_eq!(canonicalize_event_sync("mystery object 17"), EventType::Other);
        let oracle = FixedOracle(EventType::Crack);
        let t = canonicalize_event("mystery object 17", Some(&oracle)).await;
        assert_eq!(t, EventType::Crack);
    }

    #[tokio::test]
    async fn oracle_resolves_unknowns_and_memoizes() {
        let oracle = FixedOracle(EventType::Gouge);
        let t = canonicalize_event("scraper mark", Some(&oracle)).await;
        assert_eq!(t, EventType::Gouge);
        // Second call hits the memo, not the oracle
        assert_eq!(canonicalize_event_sync("scraper mark"), EventType::Gouge);
    }

    #[tokio::test]
    async fn oracle_miss_memoizes_other() {
        let t = canonicalize_event("unresolvable glyph", Some(&NullOracle)).await;
        assert_eq!(t, EventType::Other);
        assert_eq!(canonicalize_event_sync("unresolvable glyph"), EventType::Other);
    }
}
