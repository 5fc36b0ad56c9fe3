//! Assembly search.
//!
//! Every node is tried as the anchor of a circular path. From the anchor the
//! search walks forward over the nodes placed after it, closing the circle on
//! a copy of the anchor one target length further along. For each node a
//! small table of the best partial paths reaching it is kept (fewest
//! fragments, then cost, then node keys), and complete paths feed a bounded
//! top-K set of solutions that prunes everything worse.
//!
//! Without a backbone, a path is only searched from its smallest node, so a
//! circular assembly is found once and not once per rotation. With a
//! backbone, paths must start on it.

use crate::{
    config::AssemblyConfig,
    error::AssemblyError,
    node::{Node, NodeKind},
    target::CircularTarget,
};
use std::cmp::Ordering;
use tracing::{debug, info};

/// A complete circular path. `nodes` does not repeat the anchor at the end.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub nodes: Vec<Node>,
    /// Fragments including the synthetic ones needed to bridge gaps
    pub count: usize,
    pub cost: f64,
}

impl Assembly {
    pub fn keys(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.unique_key.clone()).collect()
    }
}

#[derive(Debug, Clone)]
struct Partial {
    path: Vec<usize>,
    keys: Vec<String>,
    count: usize,
    cost: f64,
}

fn rank(a: (usize, f64, &[String]), b: (usize, f64, &[String])) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.total_cmp(&b.1))
        .then_with(|| a.2.cmp(b.2))
}

impl Partial {
    fn rank_key(&self) -> (usize, f64, &[String]) {
        (self.count, self.cost, &self.keys)
    }
}

/// Best complete assemblies seen so far, at most `capacity` of them.
/// Paths in `excluded` are never kept.
struct Solutions<'a> {
    capacity: usize,
    kept: Vec<(Vec<String>, Assembly)>,
    excluded: &'a [Vec<String>],
}

impl<'a> Solutions<'a> {
    fn new(capacity: usize, excluded: &'a [Vec<String>]) -> Self {
        Self {
            capacity: capacity.max(1),
            kept: vec![],
            excluded,
        }
    }

    /// Whether a path with this count and cost can still make the cut.
    fn admits(&self, count: usize, cost: f64) -> bool {
        if self.kept.len() < self.capacity {
            return true;
        }
        match self.kept.last() {
            Some((_, worst)) => count < worst.count || (count == worst.count && cost <= worst.cost),
            None => true,
        }
    }

    fn insert(&mut self, keys: Vec<String>, found: Assembly) {
        if self.excluded.contains(&keys) || self.kept.iter().any(|(k, _)| *k == keys) {
            return;
        }
        let pos = self.kept.partition_point(|(k, a)| {
            rank((a.count, a.cost, k), (found.count, found.cost, &keys)).is_lt()
        });
        self.kept.insert(pos, (keys, found));
        self.kept.truncate(self.capacity);
    }
}

/// The cheapest circular coverings of `target` by `nodes`, best first.
///
/// `nodes` come from the graph builder: normalized to the first copy of the
/// target, unique by key.
pub fn find_assemblies(
    nodes: &[Node],
    target: &CircularTarget,
    conf: &AssemblyConfig,
) -> Result<Vec<Assembly>, AssemblyError> {
    find_assemblies_excluding(nodes, target, conf, &[])
}

/// Like [`find_assemblies`], skipping the paths whose node keys are listed in
/// `excluded`, so the next best candidates take their place.
pub fn find_assemblies_excluding(
    nodes: &[Node],
    target: &CircularTarget,
    conf: &AssemblyConfig,
    excluded: &[Vec<String>],
) -> Result<Vec<Assembly>, AssemblyError> {
    let no_cover = || AssemblyError::NoCoveringAssembly {
        target: target.id().to_string(),
        max_fragments: conf.search.max_fragments,
    };
    if nodes.is_empty() || target.is_empty() {
        return Err(no_cover());
    }

    let mut ordered: Vec<&Node> = nodes.iter().collect();
    ordered.sort_by(|a, b| by_position(a, b));
    let with_backbone = ordered.iter().any(|n| n.kind == NodeKind::Backbone);

    let mut solutions = Solutions::new(conf.search.max_solutions, excluded);
    for (i, anchor) in ordered.iter().enumerate() {
        if with_backbone && anchor.kind != NodeKind::Backbone {
            continue;
        }
        let local = anchored_nodes(&ordered, i, target.len(), with_backbone);
        search_from_anchor(&local, conf, &mut solutions);
    }

    if solutions.kept.is_empty() {
        return Err(no_cover());
    }
    info!(
        target_id = target.id(),
        nodes = nodes.len(),
        excluded = excluded.len(),
        solutions = solutions.kept.len(),
        best_count = solutions.kept[0].1.count,
        "assembly search finished"
    );
    Ok(solutions.kept.into_iter().map(|(_, a)| a).collect())
}

fn by_position(a: &Node, b: &Node) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| a.unique_key.cmp(&b.unique_key))
}

/// The anchor, every node that may follow it, and the closing copy of the
/// anchor, in position order.
fn anchored_nodes(
    ordered: &[&Node],
    anchor: usize,
    target_len: usize,
    with_backbone: bool,
) -> Vec<Node> {
    let a = ordered[anchor];
    let mut local = vec![a.clone()];
    for (j, n) in ordered.iter().enumerate() {
        if j == anchor {
            continue;
        }
        if j > anchor {
            if !with_backbone || n.kind != NodeKind::Backbone {
                local.push((*n).clone());
            }
        } else if with_backbone && n.kind != NodeKind::Backbone {
            // placed before the anchor: reached across the origin
            local.push(n.shifted(target_len));
        }
    }
    local[1..].sort_by(by_position);
    local.push(a.shifted(target_len));
    local
}

fn search_from_anchor(local: &[Node], conf: &AssemblyConfig, solutions: &mut Solutions<'_>) {
    let closing = local.len() - 1;
    let per_node = conf.search.max_paths_per_node.max(1);
    let mut tables: Vec<Vec<Partial>> = vec![vec![]; local.len()];
    tables[0].push(Partial {
        path: vec![0],
        keys: vec![local[0].unique_key.clone()],
        count: 1,
        cost: 0.0,
    });

    let mut relaxed = 0usize;
    for i in 0..closing {
        let table = std::mem::take(&mut tables[i]);
        if table.is_empty() {
            continue;
        }
        let reachable = local[i].reach(local, i, conf.search.synthesis_hop_budget);
        for partial in &table {
            if !solutions.admits(partial.count, partial.cost) {
                continue;
            }
            for &j in &reachable {
                let hops = local[i].synthesis_hop_count(&local[j]);
                let count = partial.count + hops + usize::from(j != closing);
                if count > conf.search.max_fragments {
                    continue;
                }
                let cost = partial.cost + local[i].cost_to(&local[j]);
                if !solutions.admits(count, cost) {
                    continue;
                }
                relaxed += 1;
                let mut next = partial.clone();
                next.path.push(j);
                next.count = count;
                next.cost = cost;
                if j == closing {
                    let assembly = Assembly {
                        nodes: partial.path.iter().map(|&k| local[k].clone()).collect(),
                        count,
                        cost,
                    };
                    solutions.insert(next.keys, assembly);
                } else {
                    next.keys.push(local[j].unique_key.clone());
                    insert_capped(&mut tables[j], next, per_node);
                }
            }
        }
    }
    debug!(anchor = local[0].unique_key, relaxed, "searched from anchor");
}

fn insert_capped(table: &mut Vec<Partial>, partial: Partial, cap: usize) {
    let pos = table.partition_point(|p| rank(p.rank_key(), partial.rank_key()).is_lt());
    if pos >= cap {
        return;
    }
    table.insert(pos, partial);
    table.truncate(cap);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{tests::node, CostModel};
    use std::sync::Arc;

    fn target() -> CircularTarget {
        CircularTarget::new("pTarget", &"ACGT".repeat(250))
    }

    fn tiling() -> Vec<Node> {
        vec![node("a", 0, 399), node("b", 350, 749), node("c", 700, 1049)]
    }

    #[test]
    fn test_overlapping_tiling_closes_the_circle() {
        let mut conf = AssemblyConfig::default();
        conf.search.synthesis_hop_budget = 0;
        let found = find_assemblies(&tiling(), &target(), &conf).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].keys(), vec!["0|a", "350|b", "700|c"]);
        assert_eq!(found[0].count, 3);
        assert!((found[0].cost - 3.0 * 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_fewest_fragments_beat_cost() {
        // with synthesis allowed, one fragment plus one synthetic bridge wins
        let conf = AssemblyConfig::default();
        let found = find_assemblies(&tiling(), &target(), &conf).unwrap();
        assert_eq!(found[0].keys(), vec!["0|a"]);
        assert_eq!(found[0].count, 2);
        assert_eq!(found[1].keys(), vec!["350|b"]);
        for pair in found.windows(2) {
            assert!(pair[0].count <= pair[1].count);
        }
        let mut sets: Vec<Vec<String>> = found
            .iter()
            .map(|a| {
                let mut keys = a.keys();
                keys.sort();
                keys
            })
            .collect();
        let total = sets.len();
        sets.sort();
        sets.dedup();
        assert_eq!(sets.len(), total);
    }

    #[test]
    fn test_fragment_bound_reports_no_cover() {
        let mut conf = AssemblyConfig::default();
        conf.search.synthesis_hop_budget = 0;
        conf.search.max_fragments = 2;
        let err = find_assemblies(&tiling(), &target(), &conf).unwrap_err();
        assert!(matches!(err, AssemblyError::NoCoveringAssembly { .. }));
    }

    #[test]
    fn test_no_nodes_reports_no_cover() {
        let err = find_assemblies(&[], &target(), &AssemblyConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::NoCoveringAssembly { ref target, max_fragments: 6 } if target == "pTarget"
        ));
    }

    #[test]
    fn test_paths_start_on_the_backbone() {
        let mut nodes = tiling();
        nodes[1].kind = NodeKind::Backbone;
        let found = find_assemblies(&nodes, &target(), &AssemblyConfig::default()).unwrap();
        assert!(!found.is_empty());
        for assembly in &found {
            assert_eq!(assembly.nodes[0].kind, NodeKind::Backbone);
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let conf = AssemblyConfig::default();
        let mut shuffled = tiling();
        shuffled.reverse();
        let a: Vec<Vec<String>> = find_assemblies(&tiling(), &target(), &conf)
            .unwrap()
            .iter()
            .map(Assembly::keys)
            .collect();
        let b: Vec<Vec<String>> = find_assemblies(&shuffled, &target(), &conf)
            .unwrap()
            .iter()
            .map(Assembly::keys)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_gap_closed_by_primer_tails() {
        let mut conf = AssemblyConfig::default();
        conf.synthesis.bp_cost = 1.0;
        conf.search.max_solutions = 1;
        let model = Arc::new(CostModel::from_config(&conf));
        // 10 bases apart, then overlapping by 10 across the origin
        let nodes: Vec<Node> = [("a", 0, 489), ("b", 500, 1009)]
            .into_iter()
            .map(|(id, start, end)| Node {
                model: model.clone(),
                ..node(id, start, end)
            })
            .collect();
        let found = find_assemblies(&nodes, &target(), &conf).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].keys(), vec!["0|a", "500|b"]);
        assert_eq!(found[0].count, 2);
        assert!((found[0].cost - 2.0 * model.pcr_cost).abs() < 1e-9);
    }

    #[test]
    fn test_excluded_paths_make_room() {
        let mut conf = AssemblyConfig::default();
        conf.search.synthesis_hop_budget = 0;
        let mut nodes = tiling();
        nodes.push(node("d", 300, 1020));
        let best = find_assemblies(&nodes, &target(), &conf).unwrap();
        assert_eq!(best[0].keys(), vec!["0|a", "300|d"]);
        let next = find_assemblies_excluding(&nodes, &target(), &conf, &[best[0].keys()]).unwrap();
        assert!(next.iter().all(|a| a.keys() != best[0].keys()));
        assert_eq!(next[0].keys(), vec!["0|a", "300|d", "700|c"]);
        assert_eq!(next[1].keys(), vec!["0|a", "350|b", "700|c"]);
    }
}
