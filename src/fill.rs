//! Assembly filler: turns a node path into the fragments that are actually
//! ordered, amplified or reused.

use crate::{
    config::AssemblyConfig,
    error::AssemblyError,
    junction::{Junction, JunctionKind},
    node::{Node, NodeKind},
    primers::{DesignError, JunctionPrimers, JunctionRequest, Primer, PrimerDesigner},
    search::Assembly,
    target::{reverse_complement, CircularTarget},
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PrimerPair {
    pub forward: Primer,
    pub reverse: Primer,
    pub penalty: f64,
}

/// A concrete fragment of a filled assembly. `start..=end` is on unrolled
/// target coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id: String,
    pub seq: String,
    pub kind: NodeKind,
    pub start: usize,
    pub end: usize,
    pub cost: f64,
    pub primers: Option<PrimerPair>,
    /// Sequence the primers are run on, when it is more than `seq`
    pub template: Option<Arc<str>>,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }
}

#[derive(Debug, Clone)]
pub struct FilledAssembly {
    /// Unique keys of the nodes the assembly was built from
    pub keys: Vec<String>,
    pub fragments: Vec<Fragment>,
    pub junctions: Vec<Junction>,
    pub cost: f64,
    pub primer_penalty: f64,
    pub flags: Vec<String>,
}

/// An assembly that did not make it, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub keys: Vec<String>,
    pub reason: String,
}

// Bases added before the start (or trimmed, if negative) and after the end of
// each node.
#[derive(Debug, Clone, Copy, Default)]
struct Extension {
    start: isize,
    end: isize,
}

/// Fills every assembly on a worker pool. Junction design failures only
/// reject their own assembly; anything else ends the run.
pub fn fill_all(
    assemblies: &[Assembly],
    target: &CircularTarget,
    conf: &AssemblyConfig,
    designer: &dyn PrimerDesigner,
) -> Result<(Vec<FilledAssembly>, Vec<Rejected>), AssemblyError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(conf.search.workers)
        .build()
        .map_err(|e| AssemblyError::InvalidInput {
            message: format!("could not start filler workers: {e}"),
        })?;
    let results: Vec<Result<FilledAssembly, AssemblyError>> = pool.install(|| {
        assemblies
            .par_iter()
            .map(|a| fill_assembly(a, target, conf, designer))
            .collect()
    });

    let mut filled = vec![];
    let mut rejected = vec![];
    for (assembly, result) in assemblies.iter().zip(results) {
        match result {
            Ok(f) => filled.push(f),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                warn!(target_id = target.id(), keys = ?assembly.keys(), "{e}");
                rejected.push(Rejected {
                    keys: assembly.keys(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok((filled, rejected))
}

/// Turns one node path into fragments.
///
/// Existing-homology junctions keep both neighbours as they are. PCR
/// junctions add the missing homology as primer tails, split between the two
/// sides (all on the non-backbone side when one of them is the backbone), or
/// trim an overlap longer than the maximum. Synthesis bridges become evenly
/// split synthetic fragments overlapping their neighbours by the minimum
/// homology.
pub fn fill_assembly(
    assembly: &Assembly,
    target: &CircularTarget,
    conf: &AssemblyConfig,
    designer: &dyn PrimerDesigner,
) -> Result<FilledAssembly, AssemblyError> {
    let nodes = &assembly.nodes;
    let k = nodes.len();
    let len = target.len();
    if k == 0 || len == 0 {
        return Err(AssemblyError::InvalidInput {
            message: format!("empty assembly for {}", target.id()),
        });
    }
    let closing = nodes[0].shifted(len);
    let right_of = |i: usize| if i + 1 < k { &nodes[i + 1] } else { &closing };

    let junctions: Vec<Junction> = (0..k)
        .map(|i| Junction::between(&nodes[i], right_of(i), conf))
        .collect();

    let mut ext = vec![Extension::default(); k];
    for (i, j) in junctions.iter().enumerate() {
        if j.kind != JunctionKind::PcrHomology {
            continue;
        }
        let left = &nodes[i];
        let right = right_of(i);
        let next = (i + 1) % k;
        if j.overlap > conf.fragments.max_homology {
            let excess = (j.overlap - conf.fragments.max_homology) as isize;
            if left.kind == NodeKind::Backbone {
                ext[next].start -= excess;
            } else {
                ext[i].end -= excess;
            }
            continue;
        }
        let need = conf.fragments.min_homology as isize + left.distance_to(right);
        let (to_left, to_right) = if left.kind == NodeKind::Backbone {
            (0, need)
        } else if right.kind == NodeKind::Backbone {
            (need, 0)
        } else {
            (need - need / 2, need / 2)
        };
        ext[i].end += to_left;
        ext[next].start += to_right;
    }

    // unrolled spans, shifted forward when the first fragment reaches back
    // across the origin
    let mut spans: Vec<(isize, isize)> = nodes
        .iter()
        .zip(&ext)
        .map(|(n, e)| (n.start as isize - e.start, n.end as isize + e.end))
        .collect();
    if spans[0].0 < 0 {
        for span in &mut spans {
            span.0 += len as isize;
            span.1 += len as isize;
        }
    }
    for (n, span) in nodes.iter().zip(&spans) {
        if span.1 < span.0 {
            return Err(design_failed(n, n, "fragment trimmed away"));
        }
    }
    let spans: Vec<(usize, usize)> = spans
        .into_iter()
        .map(|(s, e)| (s as usize, e as usize))
        .collect();
    let right_span = |i: usize| {
        if i + 1 < k {
            spans[i + 1]
        } else {
            (spans[0].0 + len, spans[0].1 + len)
        }
    };

    // primers, junction by junction
    let mut forward: Vec<Option<Primer>> = vec![None; k];
    let mut reverse: Vec<Option<Primer>> = vec![None; k];
    let mut penalty = 0.0;
    for (i, j) in junctions.iter().enumerate() {
        if j.kind != JunctionKind::PcrHomology {
            continue;
        }
        let (l_start, l_end) = spans[i];
        let (r_start, r_end) = right_span(i);
        let l_core_end = (l_end as isize - ext[i].end.max(0)) as usize;
        let r_core_start = (r_start as isize + ext[(i + 1) % k].start.max(0)) as usize;
        let req = JunctionRequest {
            left_template: target.slice(l_start, l_core_end),
            right_template: target.slice(r_core_start, r_end),
            left_tail: target.slice(l_core_end + 1, l_end),
            right_tail: if r_core_start > r_start {
                target.slice(r_start, r_core_start - 1)
            } else {
                String::new()
            },
            homology: (l_end + 1).saturating_sub(r_start),
            min_homology: conf.fragments.min_homology,
            max_homology: conf.fragments.max_homology,
        };
        let JunctionPrimers {
            left_reverse,
            right_forward,
            penalty: pair_penalty,
        } = designer
            .design_junction(&req)
            .map_err(|e| design_error(target, &nodes[i], right_of(i), e))?;
        debug!(
            left = nodes[i].id,
            right = right_of(i).id,
            homology = req.homology,
            pair_penalty,
            "designed junction primers"
        );
        penalty += pair_penalty;
        reverse[i] = Some(left_reverse);
        forward[(i + 1) % k] = Some(right_forward);
    }

    let mut fragments = Vec::with_capacity(assembly.count.max(k));
    for (i, node) in nodes.iter().enumerate() {
        let (start, end) = spans[i];
        let modified = ext[i].start != 0 || ext[i].end != 0;
        let seq = if modified {
            target.slice(start, end)
        } else {
            node.sequence.clone()
        };
        let mut fragment = Fragment {
            id: node.id.clone(),
            seq,
            kind: node.kind,
            start,
            end,
            cost: 0.0,
            primers: None,
            template: node.parent.clone(),
        };
        if node.kind != NodeKind::Backbone
            && (forward[i].is_some() || reverse[i].is_some() || modified)
        {
            let pair = amplify(&fragment.seq, forward[i].take(), reverse[i].take(), designer)
                .map_err(|e| design_error(target, node, node, e))?;
            // junction primers are already in the penalty
            penalty += pair.penalty;
            fragment.cost = conf.pcr.bp_cost
                * (pair.forward.seq.len() + pair.reverse.seq.len()) as f64
                + conf.pcr.reaction_cost;
            fragment.kind = NodeKind::PcrExtended;
            fragment.primers = Some(pair);
        }
        fragments.push(fragment);

        let j = &junctions[i];
        if j.kind == JunctionKind::SynthesisBridge {
            let (r_start, r_end) = right_span(i);
            fragments.extend(synthetic_bridge(
                (end + 1, r_start - 1),
                (start, r_end),
                j.pieces,
                &node.id,
                target,
                conf,
            ));
        }
    }

    let cost = fragments.iter().map(|f| f.cost).sum();
    Ok(FilledAssembly {
        keys: assembly.keys(),
        fragments,
        junctions,
        cost,
        primer_penalty: penalty,
        flags: vec![],
    })
}

/// Completes a primer pair for a fragment. Ends without a junction primer get
/// a plain one; the returned penalty only covers those.
fn amplify(
    seq: &str,
    forward: Option<Primer>,
    reverse: Option<Primer>,
    designer: &dyn PrimerDesigner,
) -> Result<PrimerPair, DesignError> {
    let mut penalty = 0.0;
    let forward = match forward {
        Some(p) => p,
        None => {
            let p = designer.design_end(seq)?;
            penalty += p.penalty;
            p
        }
    };
    let reverse = match reverse {
        Some(p) => p,
        None => {
            let p = designer.design_end(&reverse_complement(seq))?;
            penalty += p.penalty;
            p
        }
    };
    Ok(PrimerPair {
        forward,
        reverse,
        penalty,
    })
}

/// Synthetic fragments covering the `gap`, each reaching `min_homology` bases
/// into its left neighbour, the last one also into its right neighbour.
/// Pieces shorter than the synthesis minimum are widened, but stay strictly
/// inside the `outer` span of the two neighbours.
fn synthetic_bridge(
    (gap_start, gap_end): (usize, usize),
    outer: (usize, usize),
    pieces: usize,
    left_id: &str,
    target: &CircularTarget,
    conf: &AssemblyConfig,
) -> Vec<Fragment> {
    let gap = gap_end + 1 - gap_start;
    let pieces = pieces.max(1);
    let arm = conf.fragments.min_homology;
    (0..pieces)
        .map(|m| {
            let chunk_start = gap_start + m * gap / pieces;
            let chunk_end = gap_start + (m + 1) * gap / pieces - 1;
            let mut start = chunk_start.saturating_sub(arm);
            let mut end = chunk_end + if m + 1 == pieces { arm } else { 0 };
            let short = conf.synthesis.min_length.saturating_sub(end + 1 - start);
            if short > 0 {
                let room_before = start.saturating_sub(outer.0 + 1);
                let room_after = outer.1.saturating_sub(end + 1);
                let after = (short - (short / 2).min(room_before)).min(room_after);
                let before = (short - after).min(room_before);
                if before + after < short {
                    debug!(left = left_id, short, "synthetic fragment stays below minimum length");
                }
                start -= before;
                end += after;
            }
            let seq = target.slice(start, end);
            Fragment {
                id: format!("{left_id}-synthetic-{}", m + 1),
                cost: seq.len() as f64 * conf.synthesis.bp_cost,
                seq,
                kind: NodeKind::Synthetic,
                start,
                end,
                primers: None,
                template: None,
            }
        })
        .collect()
}

fn design_failed(left: &Node, right: &Node, reason: &str) -> AssemblyError {
    AssemblyError::JunctionDesignFailed {
        left: left.id.clone(),
        right: right.id.clone(),
        source: DesignError::NoPrimers {
            reason: reason.to_string(),
        },
    }
}

fn design_error(
    target: &CircularTarget,
    left: &Node,
    right: &Node,
    e: DesignError,
) -> AssemblyError {
    if e.is_tool_failure() {
        AssemblyError::DesignToolError {
            target: target.id().to_string(),
            source: e,
        }
    } else {
        AssemblyError::JunctionDesignFailed {
            left: left.id.clone(),
            right: right.id.clone(),
            source: e,
        }
    }
}
