//! Placement nodes and the reachability / cost model between them.

use crate::{config::AssemblyConfig, junction::split_gap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Existing,
    PcrExtended,
    Synthetic,
    Backbone,
}

/// Cost-model parameters in force when a node was created.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    pub existing_homology_threshold: usize,
    /// Flat cost of amplifying one fragment
    pub pcr_cost: f64,
    pub synthesis_bp_cost: f64,
    pub synthesis_max_length: usize,
    /// Gaps up to this long are closed by primer tails
    pub max_embed_length: usize,
    pub min_homology: usize,
}

impl CostModel {
    pub fn from_config(conf: &AssemblyConfig) -> Self {
        Self {
            existing_homology_threshold: conf.search.existing_homology_threshold,
            pcr_cost: conf.pcr.bp_cost * conf.pcr.primer_length as f64 + conf.pcr.reaction_cost,
            synthesis_bp_cost: conf.synthesis.bp_cost,
            synthesis_max_length: conf.synthesis.max_length.max(1),
            max_embed_length: conf.pcr.max_embed_length,
            min_homology: conf.fragments.min_homology,
        }
    }
}

/// A candidate fragment placed on the unrolled target.
///
/// `start..=end` is inclusive and `start <= end`. Nodes never change after
/// the graph builder made them; the search works on clones shifted by one
/// target length to close the circle.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub unique_key: String,
    pub start: usize,
    pub end: usize,
    pub sequence: String,
    pub kind: NodeKind,
    pub mismatches: usize,
    /// Reference entry the node was found in, PCR template of its primers
    pub parent: Option<Arc<str>>,
    pub model: Arc<CostModel>,
}

pub fn unique_key(start: usize, target_len: usize, id: &str) -> String {
    let canonical = if target_len == 0 { start } else { start % target_len };
    format!("{canonical}|{id}")
}

impl Node {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    /// The same placement one target length further along.
    pub fn shifted(&self, by: usize) -> Self {
        Self {
            start: self.start + by,
            end: self.end + by,
            ..self.clone()
        }
    }

    /// Bases between the end of this node and the start of `other`.
    /// Negative when they overlap, by exactly the number of shared bases.
    pub fn distance_to(&self, other: &Node) -> isize {
        other.start as isize - self.end as isize - 1
    }

    /// Indices of the nodes after `i` in `nodes` (sorted by start) this node
    /// can be joined to.
    ///
    /// Nodes overlapping by more than the homology threshold are always
    /// reachable. Beyond those, up to `synth_budget` further nodes are taken on
    /// the assumption that the gap is bridged by synthesis. The scan stops at
    /// the first node that is neither, so a node only ever looks a short
    /// way ahead. Nodes that end inside this one never extend coverage and
    /// are skipped.
    pub fn reach(&self, nodes: &[Node], i: usize, mut synth_budget: usize) -> Vec<usize> {
        let threshold = -(self.model.existing_homology_threshold as isize);
        let mut ret = vec![];
        for (j, candidate) in nodes.iter().enumerate().skip(i + 1) {
            if candidate.end <= self.end {
                continue;
            }
            if self.distance_to(candidate) < threshold {
                ret.push(j);
            } else if synth_budget > 0 {
                synth_budget -= 1;
                ret.push(j);
            } else {
                break;
            }
        }
        ret
    }

    /// Synthetic fragments needed to bridge from this node to `other`. Gaps
    /// short enough for primer tails need none.
    pub fn synthesis_hop_count(&self, other: &Node) -> usize {
        let dist = self.distance_to(other);
        if dist <= self.model.max_embed_length as isize {
            return 0;
        }
        split_gap(
            dist as usize,
            self.model.synthesis_max_length,
            self.model.min_homology,
        )
    }

    /// Dollar cost of getting from this node to `other`.
    ///
    /// Amplifying `other` always costs the flat PCR baseline, whether the
    /// nodes already overlap or primer tails close a short gap. A gap too long
    /// for primer tails adds `gap * synthesis_bp_cost` on top of the baseline
    /// instead of replacing it: the neighbour is amplified either way. The
    /// cost never drops as the gap grows.
    pub fn cost_to(&self, other: &Node) -> f64 {
        let dist = self.distance_to(other);
        if dist <= self.model.max_embed_length as isize {
            return self.model.pcr_cost;
        }
        self.model.pcr_cost + dist as f64 * self.model.synthesis_bp_cost
    }
}
