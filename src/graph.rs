//! Node graph builder: turns search hits, or an explicit fragment list, into
//! deduplicated placement nodes.

use crate::{
    config::AssemblyConfig,
    error::AssemblyError,
    junction::find_homology,
    matches::Match,
    node::{unique_key, CostModel, Node, NodeKind},
    target::{normalize_dna, undouble, CircularTarget},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

/// A fragment supplied by the caller, to be assembled in the given order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFragment {
    pub id: String,
    pub seq: String,
    pub kind: NodeKind,
}

impl InputFragment {
    pub fn new(id: &str, seq: &str) -> Self {
        Self {
            id: id.to_string(),
            seq: seq.to_string(),
            kind: NodeKind::Existing,
        }
    }
}

/// Nodes for every usable match, at most one per unique key, sorted by
/// start. All nodes start on the first copy of the target.
pub fn build_nodes(matches: &[Match], target: &CircularTarget, conf: &AssemblyConfig) -> Vec<Node> {
    if target.is_empty() {
        return vec![];
    }
    let model = Arc::new(CostModel::from_config(conf));
    let mut nodes: Vec<Node> = Vec::with_capacity(matches.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut parents: HashMap<&str, Arc<str>> = HashMap::new();
    let mut dropped = 0usize;

    for m in matches {
        let parent = m.parent.as_deref().map(|p| {
            parents
                .entry(m.entry.as_str())
                .or_insert_with(|| Arc::from(normalize_dna(p)))
                .clone()
        });
        let Some(node) = node_from_match(m, parent, target, conf, &model) else {
            dropped += 1;
            continue;
        };
        match by_key.get(&node.unique_key) {
            Some(&idx) => {
                if node.mismatches < nodes[idx].mismatches {
                    nodes[idx] = node;
                }
            }
            None => {
                by_key.insert(node.unique_key.clone(), nodes.len());
                nodes.push(node);
            }
        }
    }

    nodes.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.unique_key.cmp(&b.unique_key))
    });
    info!(
        target_id = target.id(),
        matches = matches.len(),
        nodes = nodes.len(),
        dropped,
        "built assembly nodes"
    );
    nodes
}

fn node_from_match(
    m: &Match,
    parent: Option<Arc<str>>,
    target: &CircularTarget,
    conf: &AssemblyConfig,
    model: &Arc<CostModel>,
) -> Option<Node> {
    let seq = normalize_dna(&m.seq);
    let lo = m.start.min(m.end);
    let mut hi = m.start.max(m.end);
    // only a whole circular entry stored twice can outrun the target
    let single = if hi - lo + 1 > target.len() {
        undouble(&seq)
    } else {
        seq.as_str()
    };
    if single.len() < seq.len() {
        hi = lo + (hi - lo + 1) / 2 - 1;
    }
    let span = hi - lo + 1;
    if single.is_empty() || span < conf.fragments.min_match_length {
        debug!(entry = m.entry, span, "dropping short match");
        return None;
    }

    let start = target.canonical(lo);
    let shift = lo - start;
    Some(Node {
        id: m.entry.clone(),
        unique_key: unique_key(start, target.len(), &m.entry),
        start,
        end: hi - shift,
        sequence: single.to_string(),
        kind: NodeKind::Existing,
        mismatches: m.mismatches,
        parent,
        model: model.clone(),
    })
}

/// A linearized backbone placed at `start` on the target it closes.
pub fn backbone_node(
    id: &str,
    linear: &str,
    start: usize,
    target: &CircularTarget,
    conf: &AssemblyConfig,
) -> Node {
    Node {
        id: id.to_string(),
        unique_key: unique_key(start, target.len(), id),
        start,
        end: start + linear.len().max(1) - 1,
        sequence: linear.to_string(),
        kind: NodeKind::Backbone,
        mismatches: 0,
        parent: None,
        model: Arc::new(CostModel::from_config(conf)),
    }
}

/// Lays caller-ordered fragments end to end and derives the vector they
/// build.
///
/// Each fragment is joined to the next on the longest suffix/prefix homology
/// within the configured bounds, the last one wrapping around to the first.
/// The returned nodes keep caller order; the last node runs past the target
/// end by its junction with the first.
pub fn nodes_from_fragments(
    target_id: &str,
    fragments: &[InputFragment],
    conf: &AssemblyConfig,
) -> Result<(CircularTarget, Vec<Node>), AssemblyError> {
    if fragments.is_empty() {
        return Err(AssemblyError::InvalidInput {
            message: "no fragments to assemble".to_string(),
        });
    }
    let model = Arc::new(CostModel::from_config(conf));
    let seqs: Vec<String> = fragments
        .iter()
        .map(|f| {
            let seq = normalize_dna(&f.seq);
            let single = undouble(&seq);
            if single.len() >= conf.fragments.min_match_length {
                single.to_string()
            } else {
                seq
            }
        })
        .collect();
    if let Some(empty) = fragments.iter().zip(&seqs).find(|(_, s)| s.is_empty()) {
        return Err(AssemblyError::InvalidInput {
            message: format!("fragment '{}' has no sequence", empty.0.id),
        });
    }

    let min_homology = conf.fragments.min_homology;
    let max_homology = conf.fragments.max_homology;
    let mut vector = String::new();
    let mut placed: Vec<(usize, usize)> = Vec::with_capacity(seqs.len());
    for (i, seq) in seqs.iter().enumerate() {
        let start = vector.len();
        let end = start + seq.len() - 1;
        let next = &seqs[(i + 1) % seqs.len()];
        // every fragment adds at least one base of its own
        let junction = find_homology(seq, next, min_homology, max_homology)
            .len()
            .min(seq.len() - 1);
        vector.push_str(&seq[..seq.len() - junction]);
        placed.push((start, end));
    }

    let target = CircularTarget::new(target_id, &vector);
    let nodes = fragments
        .iter()
        .zip(seqs)
        .zip(placed)
        .map(|((f, seq), (start, end))| Node {
            id: f.id.clone(),
            unique_key: unique_key(start, target.len(), &f.id),
            start,
            end,
            sequence: seq,
            kind: f.kind,
            mismatches: 0,
            parent: None,
            model: model.clone(),
        })
        .collect();
    Ok((target, nodes))
}
