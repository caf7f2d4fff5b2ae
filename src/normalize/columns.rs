//! Column mapper — raw sheet headers to the canonical field schema
//!
//! Vendors rename their columns every survey. Resolution order per field:
//! (a) the per-year known-mapping table, (b) normalized-header comparison,
//! (c) bounded edit distance against the canonical field words. The result
//! is a total mapping; fields that resolve nowhere stay unmapped.

use std::collections::HashMap;

/// The canonical feature-sheet fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    JointNumber,
    JointLengthFt,
    WallThicknessIn,
    DistToUpstreamWeldFt,
    DistToDownstreamWeldFt,
    LogDistanceFt,
    EventType,
    DepthPercent,
    DepthIn,
    LengthIn,
    WidthIn,
    ClockPosition,
    ElevationFt,
    Comments,
}

impl CanonicalField {
    /// Snake-case canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::JointNumber => "joint_number",
            CanonicalField::JointLengthFt => "joint_length_ft",
            CanonicalField::WallThicknessIn => "wall_thickness_in",
            CanonicalField::DistToUpstreamWeldFt => "dist_to_upstream_weld_ft",
            CanonicalField::DistToDownstreamWeldFt => "dist_to_downstream_weld_ft",
            CanonicalField::LogDistanceFt => "log_distance_ft",
            CanonicalField::EventType => "event_type",
            CanonicalField::DepthPercent => "depth_percent",
            CanonicalField::DepthIn => "depth_in",
            CanonicalField::LengthIn => "length_in",
            CanonicalField::WidthIn => "width_in",
            CanonicalField::ClockPosition => "clock_position",
            CanonicalField::ElevationFt => "elevation_ft",
            CanonicalField::Comments => "comments",
        }
    }

    /// Field words used for edit-distance comparison ("joint number", ...).
    fn words(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

/// All canonical fields, resolution order.
pub const ALL_FIELDS: [CanonicalField; 14] = [
    CanonicalField::JointNumber,
    CanonicalField::JointLengthFt,
    CanonicalField::WallThicknessIn,
    CanonicalField::DistToUpstreamWeldFt,
    CanonicalField::DistToDownstreamWeldFt,
    CanonicalField::LogDistanceFt,
    CanonicalField::EventType,
    CanonicalField::DepthPercent,
    CanonicalField::DepthIn,
    CanonicalField::LengthIn,
    CanonicalField::WidthIn,
    CanonicalField::ClockPosition,
    CanonicalField::ElevationFt,
    CanonicalField::Comments,
];

/// Maximum edit distance accepted by the fallback comparison.
const MAX_EDIT_DISTANCE: usize = 10;

/// Known header spellings for the survey years we have sheets for.
/// (header as printed, canonical field)
fn known_map_for_year(year: i32) -> &'static [(&'static str, CanonicalField)] {
    match year {
        2007 => &[
            ("Joint #", CanonicalField::JointNumber),
            ("Jt Length", CanonicalField::JointLengthFt),
            ("wt", CanonicalField::WallThicknessIn),
            ("Dist to U/S GW", CanonicalField::DistToUpstreamWeldFt),
            ("Dist to D/S GW", CanonicalField::DistToDownstreamWeldFt),
            ("Log Dist.", CanonicalField::LogDistanceFt),
            ("Event", CanonicalField::EventType),
            ("Depth %", CanonicalField::DepthPercent),
            ("Depth", CanonicalField::DepthIn),
            ("Length", CanonicalField::LengthIn),
            ("Width", CanonicalField::WidthIn),
            ("O'clock", CanonicalField::ClockPosition),
            ("Elevation", CanonicalField::ElevationFt),
            ("Comments", CanonicalField::Comments),
        ],
        2015 => &[
            ("Joint Number", CanonicalField::JointNumber),
            ("Joint Length (ft)", CanonicalField::JointLengthFt),
            ("Wall Thickness (in)", CanonicalField::WallThicknessIn),
            ("Dist. to U/S Weld (ft)", CanonicalField::DistToUpstreamWeldFt),
            ("Dist. to D/S Weld (ft)", CanonicalField::DistToDownstreamWeldFt),
            ("Log Distance (ft)", CanonicalField::LogDistanceFt),
            ("Event Description", CanonicalField::EventType),
            ("Depth (%)", CanonicalField::DepthPercent),
            ("Depth (in)", CanonicalField::DepthIn),
            ("Length (in)", CanonicalField::LengthIn),
            ("Width (in)", CanonicalField::WidthIn),
            ("Clock Position", CanonicalField::ClockPosition),
            ("Elevation (ft)", CanonicalField::ElevationFt),
            ("Comment", CanonicalField::Comments),
        ],
        2022 => &[
            ("joint number", CanonicalField::JointNumber),
            ("joint length [ft]", CanonicalField::JointLengthFt),
            ("wall thickness [in]", CanonicalField::WallThicknessIn),
            ("distance to upstream weld [ft]", CanonicalField::DistToUpstreamWeldFt),
            ("distance to downstream weld [ft]", CanonicalField::DistToDownstreamWeldFt),
            ("log distance [ft]", CanonicalField::LogDistanceFt),
            ("event type", CanonicalField::EventType),
            ("depth [%]", CanonicalField::DepthPercent),
            ("depth [in]", CanonicalField::DepthIn),
            ("length [in]", CanonicalField::LengthIn),
            ("width [in]", CanonicalField::WidthIn),
            ("clock position", CanonicalField::ClockPosition),
            ("elevation [ft]", CanonicalField::ElevationFt),
            ("comments", CanonicalField::Comments),
        ],
        _ => &[],
    }
}

/// Lowercase, collapse whitespace, strip punctuation except `%./[]`.
pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut last_was_space = true;
    for ch in header.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else if ch.is_alphanumeric() || matches!(ch, '%' | '.' | '/' | '[' | ']') {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Classic Levenshtein distance, two-row rolling buffer.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Resolved mapping: canonical field → column index into the header row.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    map: HashMap<CanonicalField, usize>,
}

impl ColumnMapping {
    /// Column index for a canonical field, when resolved.
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.map.get(&field).copied()
    }

    /// Fields that resolved nowhere.
    pub fn unresolved(&self) -> Vec<CanonicalField> {
        ALL_FIELDS
            .iter()
            .filter(|f| !self.map.contains_key(*f))
            .copied()
            .collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.map.len()
    }
}

/// Build the mapping for one run sheet.
///
/// Resolution runs in three passes over the whole field set — exact
/// known-table matches, normalized-header matches, then bounded edit
/// distance — so a strong match for one field can never be stolen by an
/// earlier field's fuzzy fallback. The fallback pass assigns globally by
/// ascending distance.
pub fn map_columns(year: i32, headers: &[String]) -> ColumnMapping {
    let known = known_map_for_year(year);
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut map: HashMap<CanonicalField, usize> = HashMap::new();
    let mut used_columns = vec![false; headers.len()];

    // (a) exact match against the per-year known table
    for field in ALL_FIELDS {
        let hit = known
            .iter()
            .filter(|(_, f)| *f == field)
            .find_map(|(spelling, _)| {
                headers
                    .iter()
                    .enumerate()
                    .find(|(i, h)| !used_columns[*i] && h.trim() == *spelling)
                    .map(|(i, _)| i)
            });
        if let Some(idx) = hit {
            map.insert(field, idx);
            used_columns[idx] = true;
        }
    }

    // (b) normalized-header comparison against the canonical words and
    // the known spellings
    for field in ALL_FIELDS {
        if map.contains_key(&field) {
            continue;
        }
        let field_words = field.words();
        let hit = normalized.iter().enumerate().find(|(i, norm)| {
            !used_columns[*i]
                && !norm.is_empty()
                && (**norm == field_words
                    || known
                        .iter()
                        .any(|(spelling, f)| *f == field && normalize_header(spelling) == **norm))
        });
        if let Some((idx, _)) = hit {
            map.insert(field, idx);
            used_columns[idx] = true;
        }
    }

    // (c) bounded edit distance against the canonical field words,
    // assigned globally by ascending distance (ties: field order, then
    // column order)
    let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
    for (field_rank, field) in ALL_FIELDS.iter().enumerate() {
        if map.contains_key(field) {
            continue;
        }
        let field_words = field.words();
        for (i, norm) in normalized.iter().enumerate() {
            if used_columns[i] || norm.is_empty() {
                continue;
            }
            let d = edit_distance(norm, &field_words);
            if d <= MAX_EDIT_DISTANCE {
                candidates.push((d, field_rank, i));
            }
        }
    }
    candidates.sort_unstable();
    for (_, field_rank, idx) in candidates {
        let field = ALL_FIELDS[field_rank];
        if map.contains_key(&field) || used_columns[idx] {
            continue;
        }
        map.insert(field, idx);
        used_columns[idx] = true;
    }

    ColumnMapping { map }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("  Depth   (%) "), "depth %");
        assert_eq!(normalize_header("Log Dist."), "log dist.");
        assert_eq!(normalize_header("O'clock"), "oclock");
        assert_eq!(normalize_header("depth [in]"), "depth [in]");
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("clock position", "clock position"), 0);
    }

    #[test]
    fn known_2015_headers_resolve_exactly() {
        let hs = headers(&[
            "Joint Number",
            "Joint Length (ft)",
            "Wall Thickness (in)",
            "Log Distance (ft)",
            "Event Description",
            "Depth (%)",
            "Clock Position",
            "Comment",
        ]);
        let m = map_columns(2015, &hs);
        assert_eq!(m.column(CanonicalField::JointNumber), Some(0));
        assert_eq!(m.column(CanonicalField::LogDistanceFt), Some(3));
        assert_eq!(m.column(CanonicalField::EventType), Some(4));
        assert_eq!(m.column(CanonicalField::DepthPercent), Some(5));
        assert_eq!(m.column(CanonicalField::ClockPosition), Some(6));
        assert_eq!(m.column(CanonicalField::Comments), Some(7));
        // Width never appeared
        assert_eq!(m.column(CanonicalField::WidthIn), None);
    }

    #[test]
    fn unknown_year_falls_back_to_normalization() {
        let hs = headers(&["JOINT  NUMBER", "log distance [ft]", "event type"]);
        let m = map_columns(1999, &hs);
        assert_eq!(m.column(CanonicalField::JointNumber), Some(0));
        assert_eq!(m.column(CanonicalField::EventType), Some(2));
    }

    #[test]
    fn edit_distance_fallback_catches_typos() {
        let hs = headers(&["joint numbr", "event typ"]);
        let m = map_columns(1999, &hs);
        assert_eq!(m.column(CanonicalField::JointNumber), Some(0));
        assert_eq!(m.column(CanonicalField::EventType), Some(1));
    }

    #[test]
    fn mapping_is_total_with_unresolved_listed() {
        let m = map_columns(2007, &headers(&["Log Dist.", "Event"]));
        assert_eq!(m.resolved_count(), 2);
        assert!(m.unresolved().contains(&CanonicalField::WidthIn));
    }
}
