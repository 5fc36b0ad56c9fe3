use crate::{config::AssemblyConfig, node::Node};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunctionKind {
    /// Ends already share enough sequence, fragments are used as they are
    ExistingHomology,
    /// Homology is added (or excess overlap trimmed) through primers
    PcrHomology,
    /// The gap is filled with synthetic fragments
    SynthesisBridge,
}

/// How two neighbouring nodes of a path meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub overlap: usize,
    pub gap: usize,
    pub kind: JunctionKind,
    /// Synthetic fragments bridging the gap, 0 unless `SynthesisBridge`
    pub pieces: usize,
}

impl JunctionKind {
    /// How a node ending `dist` bases before the next one starts (negative
    /// when they overlap) is joined. The search counts fragments with the
    /// same rule the filler builds them with.
    pub fn classify(dist: isize, min_homology: usize, max_homology: usize, max_embed: usize) -> Self {
        let overlap = (-dist).max(0) as usize;
        if dist < 0 && overlap >= min_homology && overlap <= max_homology {
            Self::ExistingHomology
        } else if dist <= max_embed as isize {
            Self::PcrHomology
        } else {
            Self::SynthesisBridge
        }
    }
}

impl Junction {
    pub fn between(left: &Node, right: &Node, conf: &AssemblyConfig) -> Self {
        let dist = left.distance_to(right);
        let kind = JunctionKind::classify(
            dist,
            conf.fragments.min_homology,
            conf.fragments.max_homology,
            conf.pcr.max_embed_length,
        );
        let gap = dist.max(0) as usize;
        let pieces = match kind {
            JunctionKind::SynthesisBridge => synthesis_pieces(gap, conf),
            _ => 0,
        };
        Self {
            overlap: (-dist).max(0) as usize,
            gap,
            kind,
            pieces,
        }
    }
}

/// Synthetic fragments needed for a gap, see [`split_gap`].
pub fn synthesis_pieces(gap: usize, conf: &AssemblyConfig) -> usize {
    split_gap(gap, conf.synthesis.max_length, conf.fragments.min_homology)
}

/// One piece per `max_length` bases, more if a piece plus its two homology
/// arms would not fit in one synthesis order.
pub fn split_gap(gap: usize, max_length: usize, min_homology: usize) -> usize {
    if gap == 0 {
        return 0;
    }
    let max_len = max_length.max(1);
    let arms = 2 * min_homology;
    let mut count = gap.div_ceil(max_len);
    while gap.div_ceil(count) + arms > max_len && count < gap {
        count += 1;
    }
    count
}

/// Longest suffix of `left` that is also a prefix of `right`, no shorter than
/// `min_homology` and no longer than `max_homology`. Case is ignored; an
/// empty string means no junction.
pub fn find_homology(left: &str, right: &str, min_homology: usize, max_homology: usize) -> String {
    let left = left.to_ascii_uppercase();
    let right = right.to_ascii_uppercase();
    if min_homology == 0 || left.len() < min_homology {
        return String::new();
    }
    let first = left.len().saturating_sub(max_homology);
    let last = left.len() - min_homology;
    (first..=last)
        .map(|i| &left[i..])
        .find(|suffix| right.starts_with(suffix))
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::node;

    #[test]
    fn test_existing_homology_for_25bp_overlap() {
        let conf = AssemblyConfig::default();
        let a = node("a", 0, 99);
        let b = node("b", 75, 199);
        let j = Junction::between(&a, &b, &conf);
        assert_eq!(j.kind, JunctionKind::ExistingHomology);
        assert_eq!(j.overlap, 25);
        assert_eq!(j.pieces, 0);
        // no synthesis premium on top of the amplification baseline
        assert_eq!(a.cost_to(&b), a.model.pcr_cost);
    }

    #[test]
    fn test_short_gap_is_pcr() {
        let conf = AssemblyConfig::default();
        let j = Junction::between(&node("a", 0, 99), &node("b", 110, 199), &conf);
        assert_eq!(j.kind, JunctionKind::PcrHomology);
        assert_eq!(j.gap, 10);
        let j = Junction::between(&node("a", 0, 99), &node("b", 90, 199), &conf);
        assert_eq!(j.kind, JunctionKind::PcrHomology);
        assert_eq!(j.overlap, 10);
    }

    #[test]
    fn test_excess_overlap_is_pcr() {
        let conf = AssemblyConfig::default();
        let j = Junction::between(&node("a", 0, 999), &node("b", 500, 1500), &conf);
        assert_eq!(j.kind, JunctionKind::PcrHomology);
        assert_eq!(j.overlap, 500);
    }

    #[test]
    fn test_long_gap_is_bridged() {
        let conf = AssemblyConfig::default();
        let gap = 1800 * 7 / 2;
        let j = Junction::between(&node("a", 0, 99), &node("b", 100 + gap, 200 + gap), &conf);
        assert_eq!(j.kind, JunctionKind::SynthesisBridge);
        assert_eq!(j.pieces, 4);
    }

    #[test]
    fn test_synthesis_pieces_make_room_for_arms() {
        let conf = AssemblyConfig::default();
        assert_eq!(synthesis_pieces(0, &conf), 0);
        assert_eq!(synthesis_pieces(100, &conf), 1);
        assert_eq!(synthesis_pieces(1800, &conf), 2);
        assert_eq!(synthesis_pieces(1760, &conf), 1);
    }

    #[test]
    fn test_search_counts_what_the_filler_builds() {
        let conf = AssemblyConfig::default();
        let a = node("a", 1000, 1099);
        for dist in [-200isize, -50, -21, -10, 0, 10, 20, 21, 1000, 1761, 1800, 4000] {
            let start = (1100 + dist) as usize;
            let b = node("b", start, start + 5000);
            let j = Junction::between(&a, &b, &conf);
            assert_eq!(a.synthesis_hop_count(&b), j.pieces, "distance {dist}");
        }
    }

    #[test]
    fn test_find_homology_prefers_longest() {
        let shared = "ACGTTGCAAGGCTTCGATCCGATGACTG";
        let left = format!("CCCCCCCCCC{shared}");
        let right = format!("{}TTTTTTTTTT", shared.to_lowercase());
        assert_eq!(find_homology(&left, &right, 20, 120), shared);
        assert_eq!(find_homology(&left, &right, 20, 25), "");
        assert_eq!(find_homology("ACGT", "ACGT", 20, 120), "");
    }
}
