//! Planning entry points: from a target sequence, an ordered fragment list,
//! or a list of named features to ranked, buildable assemblies.

use crate::{
    config::AssemblyConfig,
    enzymes::{digest, BackboneInfo, Enzyme},
    error::AssemblyError,
    features::compose_target,
    fill::{fill_all, FilledAssembly, Fragment, Rejected},
    graph::{backbone_node, build_nodes, nodes_from_fragments, InputFragment},
    matches::MatchSource,
    node::{Node, NodeKind},
    primers::{Primer, PrimerDesigner},
    search::{find_assemblies_excluding, Assembly},
    store::FeatureStore,
    target::{normalize_dna, CircularTarget},
    validate::validate_and_rank,
};
use gentle_assembly_protocol::{
    AssemblyRecord, BackboneRecord, BuildKind, FragmentRecord, PlanOutput, PrimerPairRecord,
    PrimerRecord, RejectedAssembly,
};
use std::path::PathBuf;
use tracing::{debug, info};

/// A backbone cut open by a restriction enzyme, closing every assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backbone {
    pub linear: String,
    pub info: BackboneInfo,
}

impl Backbone {
    pub fn digest(
        id: &str,
        seq: &str,
        enzyme: &Enzyme,
        conf: &AssemblyConfig,
    ) -> Result<Self, AssemblyError> {
        let (linear, info) = digest(id, seq, enzyme, conf.digest.wrap_window)?;
        info!(
            backbone = id,
            enzyme = enzyme.name,
            linear_len = linear.len(),
            forward = info.forward,
            "linearized backbone"
        );
        Ok(Self { linear, info })
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }
}

/// Runs the planning pipeline with one configuration and primer designer.
pub struct Planner<'a> {
    conf: &'a AssemblyConfig,
    designer: &'a dyn PrimerDesigner,
}

impl<'a> Planner<'a> {
    pub fn new(conf: &'a AssemblyConfig, designer: &'a dyn PrimerDesigner) -> Self {
        Self { conf, designer }
    }

    /// Plans `seq` from fragments found in `databases`. With a backbone,
    /// `seq` is the insert and the vector is the insert followed by the
    /// linearized backbone.
    pub fn plan_sequence(
        &self,
        id: &str,
        seq: &str,
        source: &dyn MatchSource,
        databases: &[PathBuf],
        backbone: Option<&Backbone>,
    ) -> Result<PlanOutput, AssemblyError> {
        let insert = normalize_dna(seq);
        if insert.is_empty() {
            return Err(AssemblyError::InvalidInput {
                message: format!("target {id} has no sequence"),
            });
        }
        let vector = match backbone {
            Some(b) => format!("{insert}{}", b.linear),
            None => insert.clone(),
        };
        let target = CircularTarget::new(id, &vector);

        let matches = source
            .search(&target.tripled(), databases)
            .map_err(|e| AssemblyError::SearchToolError {
                target: id.to_string(),
                source: e,
            })?;
        let mut nodes = build_nodes(&matches, &target, self.conf);
        if !matches.is_empty() && nodes.is_empty() {
            return Err(AssemblyError::NoMatches {
                target: id.to_string(),
            });
        }
        if let Some(b) = backbone {
            nodes.retain(|n| n.id != b.id());
            nodes.push(backbone_node(
                b.id(),
                &b.linear,
                insert.len(),
                &target,
                self.conf,
            ));
        }

        self.search_and_finish(&nodes, &target, backbone)
    }

    /// Plans the assembly of `fragments` in the given order, after the
    /// backbone if there is one.
    pub fn plan_fragments(
        &self,
        id: &str,
        fragments: &[InputFragment],
        backbone: Option<&Backbone>,
    ) -> Result<PlanOutput, AssemblyError> {
        let mut ordered = Vec::with_capacity(fragments.len() + 1);
        if let Some(b) = backbone {
            ordered.push(InputFragment {
                id: b.id().to_string(),
                seq: b.linear.clone(),
                kind: NodeKind::Backbone,
            });
        }
        ordered.extend(fragments.iter().cloned());
        let (target, nodes) = nodes_from_fragments(id, &ordered, self.conf)?;
        let assembly = fixed_assembly(nodes, target.len());
        let (ranked, rejected) = self.fill_and_rank(&target, &[assembly])?;
        self.finish(&target, &ranked, &rejected, backbone)
    }

    /// Plans the concatenation of the named features, see
    /// [`compose_target`].
    pub fn plan_features(
        &self,
        query: &str,
        store: &FeatureStore,
        source: &dyn MatchSource,
        databases: &[PathBuf],
        backbone: Option<&Backbone>,
    ) -> Result<PlanOutput, AssemblyError> {
        let seq = compose_target(query, store)?;
        self.plan_sequence(query, &seq, source, databases, backbone)
    }

    /// Searches, fills and validates until some candidate survives. Every
    /// rejected path is excluded from the next search, so later rounds see
    /// the next best candidates.
    fn search_and_finish(
        &self,
        nodes: &[Node],
        target: &CircularTarget,
        backbone: Option<&Backbone>,
    ) -> Result<PlanOutput, AssemblyError> {
        let mut rejected: Vec<Rejected> = vec![];
        let mut excluded: Vec<Vec<String>> = vec![];
        for round in 1..=self.conf.search.max_search_rounds.max(1) {
            let assemblies = match find_assemblies_excluding(nodes, target, self.conf, &excluded) {
                Ok(found) => found,
                Err(AssemblyError::NoCoveringAssembly { .. }) if !rejected.is_empty() => break,
                Err(e) => return Err(e),
            };
            let (ranked, round_rejected) = self.fill_and_rank(target, &assemblies)?;
            excluded.extend(round_rejected.iter().map(|r| r.keys.clone()));
            rejected.extend(round_rejected);
            if !ranked.is_empty() {
                return self.finish(target, &ranked, &rejected, backbone);
            }
            debug!(
                target_id = target.id(),
                round,
                rejected = rejected.len(),
                "every candidate of this round was rejected, searching again"
            );
        }
        self.finish(target, &[], &rejected, backbone)
    }

    fn fill_and_rank(
        &self,
        target: &CircularTarget,
        assemblies: &[Assembly],
    ) -> Result<(Vec<FilledAssembly>, Vec<Rejected>), AssemblyError> {
        let (filled, mut rejected) = fill_all(assemblies, target, self.conf, self.designer)?;
        let (ranked, invalid) = validate_and_rank(filled, target, self.conf);
        rejected.extend(invalid);
        Ok((ranked, rejected))
    }

    fn finish(
        &self,
        target: &CircularTarget,
        ranked: &[FilledAssembly],
        rejected: &[Rejected],
        backbone: Option<&Backbone>,
    ) -> Result<PlanOutput, AssemblyError> {
        let Some(best) = ranked.first() else {
            return Err(AssemblyError::NoValidAssembly {
                target: target.id().to_string(),
                rejected: rejected.len(),
                reason: rejected
                    .last()
                    .map(|r| r.reason.clone())
                    .unwrap_or_default(),
            });
        };
        info!(
            target_id = target.id(),
            assemblies = ranked.len(),
            rejected = rejected.len(),
            best_fragments = best.fragments.len(),
            best_cost = best.cost,
            "planned assemblies"
        );
        Ok(plan_output(target, ranked, rejected, backbone))
    }
}

/// The caller's own path: fragment count and cost as the search would have
/// scored it.
fn fixed_assembly(nodes: Vec<Node>, target_len: usize) -> Assembly {
    let k = nodes.len();
    let mut count = k;
    let mut cost = 0.0;
    for i in 0..k {
        let next = match nodes.get(i + 1) {
            Some(n) => n.clone(),
            None => nodes[0].shifted(target_len),
        };
        count += nodes[i].synthesis_hop_count(&next);
        cost += nodes[i].cost_to(&next);
    }
    Assembly { nodes, count, cost }
}

fn build_kind(kind: NodeKind) -> BuildKind {
    match kind {
        NodeKind::Existing => BuildKind::Existing,
        NodeKind::PcrExtended => BuildKind::Pcr,
        NodeKind::Synthetic => BuildKind::Synthetic,
        NodeKind::Backbone => BuildKind::LinearizedBackbone,
    }
}

fn primer_record(p: &Primer) -> PrimerRecord {
    PrimerRecord {
        sequence: p.seq.clone(),
        tm: p.tm,
        penalty: p.penalty,
    }
}

fn fragment_record(f: &Fragment) -> FragmentRecord {
    FragmentRecord {
        id: f.id.clone(),
        sequence: f.seq.clone(),
        kind: build_kind(f.kind),
        start: f.start,
        end: f.end,
        cost: f.cost,
        primers: f.primers.as_ref().map(|pair| PrimerPairRecord {
            forward: primer_record(&pair.forward),
            reverse: primer_record(&pair.reverse),
            penalty: pair.penalty,
        }),
    }
}

fn assembly_record(rank: usize, a: &FilledAssembly) -> AssemblyRecord {
    AssemblyRecord {
        rank,
        fragment_count: a.fragments.len(),
        total_cost: a.cost,
        primer_penalty: a.primer_penalty,
        flags: a.flags.clone(),
        fragments: a.fragments.iter().map(fragment_record).collect(),
    }
}

fn plan_output(
    target: &CircularTarget,
    ranked: &[FilledAssembly],
    rejected: &[Rejected],
    backbone: Option<&Backbone>,
) -> PlanOutput {
    let mut plan = PlanOutput::new(target.id(), target.seq());
    plan.backbone = backbone.map(|b| BackboneRecord {
        id: b.info.id.clone(),
        sequence: b.info.seq.clone(),
        enzyme: b.info.enzyme.clone(),
        recognition_index: b.info.recognition_index,
        forward: b.info.forward,
    });
    plan.assemblies = ranked
        .iter()
        .enumerate()
        .map(|(i, a)| assembly_record(i + 1, a))
        .collect();
    plan.rejected = rejected
        .iter()
        .map(|r| RejectedAssembly {
            node_ids: r.keys.clone(),
            reason: r.reason.clone(),
        })
        .collect();
    plan
}
