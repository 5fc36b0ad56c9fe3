//! Whole-assembly checks and the final ordering of filled assemblies.

use crate::{
    config::{AssemblyConfig, ValidationConfig},
    fill::{FilledAssembly, Fragment, Rejected},
    iupac_code::IupacCode,
    target::{reverse_complement, CircularTarget},
};
use itertools::Itertools;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Fragments, in assembly order, must tile the circle: each one starts no
/// later than the base after its predecessor ends, and the total length
/// minus all junction overlaps is exactly the target length.
pub fn check_coverage(fragments: &[Fragment], target_len: usize) -> Result<(), String> {
    let Some(first) = fragments.first() else {
        return Err("assembly has no fragments".to_string());
    };
    let mut overlaps = 0usize;
    for (i, f) in fragments.iter().enumerate() {
        let next_start = fragments
            .get(i + 1)
            .map(|n| n.start)
            .unwrap_or(first.start + target_len);
        if next_start > f.end + 1 {
            return Err(format!(
                "{} bases after {} are not covered",
                next_start - f.end - 1,
                f.id
            ));
        }
        let next_len = fragments.get(i + 1).unwrap_or(first).len();
        let overlap = (f.end + 1).saturating_sub(next_start);
        if next_start < f.start || overlap >= f.len() || overlap >= next_len {
            return Err(format!("{} is overlapped end to end by its neighbour", f.id));
        }
        overlaps += overlap;
    }
    let total: usize = fragments.iter().map(Fragment::len).sum();
    if total < overlaps || total - overlaps != target_len {
        return Err(format!(
            "fragments cover {} bases of a {target_len} bp target",
            total.saturating_sub(overlaps)
        ));
    }
    Ok(())
}

/// The shared sequence at each junction, the last one wrapping to the first
/// fragment.
pub fn junction_sequences(fragments: &[Fragment], target: &CircularTarget) -> Vec<String> {
    let Some(first) = fragments.first() else {
        return vec![];
    };
    fragments
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let next_start = fragments
                .get(i + 1)
                .map(|n| n.start)
                .unwrap_or(first.start + target.len());
            target.slice(next_start, f.end)
        })
        .collect()
}

/// Soft problems with an assembly, as human-readable flags.
pub fn flag_assembly(
    filled: &FilledAssembly,
    target: &CircularTarget,
    conf: &ValidationConfig,
) -> Vec<String> {
    let mut flags = vec![];
    let junctions = junction_sequences(&filled.fragments, target);

    for ((i, a), (j, b)) in junctions.iter().enumerate().tuple_combinations() {
        if !a.is_empty() && (a == b || reverse_complement(a) == *b) {
            flags.push(format!(
                "duplicate junction sequence at junctions {} and {}",
                i + 1,
                j + 1
            ));
        }
    }

    for (i, seq) in junctions.iter().enumerate() {
        if has_inverted_repeat(seq, conf.inverted_repeat_stem) {
            flags.push(format!("inverted repeat in junction {}", i + 1));
        }
    }

    for f in &filled.fragments {
        let Some(pair) = &f.primers else {
            continue;
        };
        // sites anywhere on the parent entry count, not just in the amplicon
        let template = f.template.as_deref().unwrap_or(&f.seq);
        for (strand, primer) in [("forward", &pair.forward), ("reverse", &pair.reverse)] {
            let sites = binding_sites(
                template,
                primer.anneal(),
                conf.off_target_max_mismatches,
                conf.off_target_exact_3prime,
            );
            if sites > 1 {
                flags.push(format!(
                    "{strand} primer of {} binds {sites} sites in its template",
                    f.id
                ));
            }
        }
    }
    flags
}

/// Whether a stretch of `stem` bases is followed, further along in `seq`, by
/// its own reverse complement.
pub fn has_inverted_repeat(seq: &str, stem: usize) -> bool {
    if stem == 0 || seq.len() < 2 * stem {
        return false;
    }
    let seq = seq.to_ascii_uppercase();
    (0..=seq.len() - 2 * stem).any(|p| {
        let rc = reverse_complement(&seq[p..p + stem]);
        seq[p + stem..].contains(&rc)
    })
}

/// Sites on either strand of `template` where `anneal` binds with at most
/// `max_mismatches` mismatches and an exact match over its last
/// `exact_3prime` bases.
pub fn binding_sites(
    template: &str,
    anneal: &str,
    max_mismatches: usize,
    exact_3prime: usize,
) -> usize {
    let anneal = anneal.to_ascii_uppercase();
    let forward = template.to_ascii_uppercase();
    let reverse = reverse_complement(&forward);
    [forward, reverse]
        .iter()
        .map(|strand| {
            count_sites(
                strand.as_bytes(),
                anneal.as_bytes(),
                max_mismatches,
                exact_3prime,
            )
        })
        .sum()
}

fn count_sites(
    template: &[u8],
    anneal: &[u8],
    max_mismatches: usize,
    exact_3prime: usize,
) -> usize {
    let window_len = anneal.len();
    if window_len == 0 || template.len() < window_len || exact_3prime > window_len {
        return 0;
    }
    let from = window_len - exact_3prime;
    template
        .windows(window_len)
        .filter(|window| {
            window[from..] == anneal[from..]
                && window
                    .iter()
                    .zip(anneal)
                    .filter(|(t, a)| !IupacCode::from_letter(**t).matches(**a))
                    .count()
                    <= max_mismatches
        })
        .count()
}

fn rank(a: &FilledAssembly, b: &FilledAssembly) -> Ordering {
    a.fragments
        .len()
        .cmp(&b.fragments.len())
        .then_with(|| a.cost.total_cmp(&b.cost))
        .then_with(|| a.flags.len().cmp(&b.flags.len()))
        .then_with(|| a.primer_penalty.total_cmp(&b.primer_penalty))
        .then_with(|| a.keys.cmp(&b.keys))
}

/// Drops assemblies that do not tile the target, flags the rest and sorts
/// them best first. Flagged assemblies are only dropped when configured to.
pub fn validate_and_rank(
    filled: Vec<FilledAssembly>,
    target: &CircularTarget,
    conf: &AssemblyConfig,
) -> (Vec<FilledAssembly>, Vec<Rejected>) {
    let mut kept = vec![];
    let mut rejected = vec![];
    for mut assembly in filled {
        if let Err(reason) = check_coverage(&assembly.fragments, target.len()) {
            debug!(keys = ?assembly.keys, reason, "assembly does not tile the target");
            rejected.push(Rejected {
                keys: assembly.keys,
                reason,
            });
            continue;
        }
        assembly.flags = flag_assembly(&assembly, target, &conf.validation);
        if conf.validation.drop_flagged && !assembly.flags.is_empty() {
            rejected.push(Rejected {
                reason: assembly.flags.join("; "),
                keys: assembly.keys,
            });
            continue;
        }
        kept.push(assembly);
    }
    kept.sort_by(rank);
    info!(
        target_id = target.id(),
        kept = kept.len(),
        rejected = rejected.len(),
        "ranked assemblies"
    );
    (kept, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fill::PrimerPair,
        node::NodeKind,
        primers::Primer,
        target::tests::random_dna,
    };
    use std::sync::Arc;

    fn fragment(id: &str, start: usize, end: usize, target: &CircularTarget) -> Fragment {
        Fragment {
            id: id.to_string(),
            seq: target.slice(start, end),
            kind: NodeKind::Existing,
            start,
            end,
            cost: 0.0,
            primers: None,
            template: None,
        }
    }

    fn filled(keys: &[&str], fragments: Vec<Fragment>, cost: f64) -> FilledAssembly {
        FilledAssembly {
            keys: keys.iter().map(ToString::to_string).collect(),
            fragments,
            junctions: vec![],
            cost,
            primer_penalty: 0.0,
            flags: vec![],
        }
    }

    #[test]
    fn test_coverage_accepts_tiling_and_rejects_gaps() {
        let t = CircularTarget::new("t", &random_dna(1000, 5));
        let good = vec![
            fragment("a", 0, 399, &t),
            fragment("b", 370, 749, &t),
            fragment("c", 720, 1029, &t),
        ];
        assert!(check_coverage(&good, 1000).is_ok());
        let gapped = vec![fragment("a", 0, 399, &t), fragment("b", 410, 1029, &t)];
        let err = check_coverage(&gapped, 1000).unwrap_err();
        assert!(err.contains("10 bases after a"));
        assert!(check_coverage(&[], 1000).is_err());
    }

    #[test]
    fn test_coverage_rejects_double_counted_region() {
        let t = CircularTarget::new("t", &random_dna(1000, 5));
        // wraps more than once around the circle
        let frags = vec![fragment("a", 0, 999, &t), fragment("b", 980, 2019, &t)];
        assert!(check_coverage(&frags, 1000).is_err());
    }

    #[test]
    fn test_duplicate_junctions_are_flagged() {
        let repeat = "ACGTTGCAAGGCTTCGATCCGATGACTGAA";
        let unit = random_dna(470, 9);
        let seq = format!("{repeat}{unit}{repeat}{unit}");
        let t = CircularTarget::new("t", &seq);
        // both junctions sit on a copy of the repeat
        let frags = vec![fragment("a", 0, 529, &t), fragment("b", 500, 1029, &t)];
        let f = filled(&["0|a", "500|b"], frags, 0.0);
        let flags = flag_assembly(&f, &t, &ValidationConfig::default());
        assert!(flags.iter().any(|f| f.starts_with("duplicate junction")), "{flags:?}");
    }

    #[test]
    fn test_inverted_repeat() {
        let stem = "GGATCCAAGT";
        let hairpin = format!("TTT{stem}AAAA{}TTT", reverse_complement(stem));
        assert!(has_inverted_repeat(&hairpin, 10));
        assert!(!has_inverted_repeat("ACGTTGCAAGGCTTCGATCCGATGACTG", 10));
        assert!(!has_inverted_repeat("ACGT", 10));
    }

    #[test]
    fn test_binding_sites_need_exact_three_prime_end() {
        let anneal = "GATTACAGATTACAGG";
        let template = format!("{anneal}TTTTTTTTTTGATTCCAGATTACAGG");
        // second copy has one mismatch away from the 3' end
        assert_eq!(binding_sites(&template, anneal, 1, 5), 2);
        assert_eq!(binding_sites(&template, anneal, 0, 5), 1);
        // a mismatch inside the 3' window does not bind
        let template = format!("{anneal}TTTTTTTTTTGATTACAGATTACAGC");
        assert_eq!(binding_sites(&template, anneal, 1, 5), 1);
        // reverse strand sites count too
        let template = format!("{anneal}TTTTTTTTTT{}", reverse_complement(anneal));
        assert_eq!(binding_sites(&template, anneal, 0, 5), 2);
    }

    #[test]
    fn test_primer_binding_outside_the_amplicon_is_flagged() {
        let t = CircularTarget::new("t", &random_dna(1000, 5));
        let primer = |seq: String| Primer {
            seq,
            tm: 60.0,
            penalty: 0.0,
            tail_len: 0,
        };
        let mut a = fragment("a", 0, 529, &t);
        a.primers = Some(PrimerPair {
            forward: primer(t.slice(0, 19)),
            reverse: primer(reverse_complement(&t.slice(510, 529))),
            penalty: 0.0,
        });
        let frags = vec![a.clone(), fragment("b", 500, 1029, &t)];
        let conf = ValidationConfig::default();
        let off_target = |flags: &[String]| flags.iter().any(|f| f.contains("primer of a binds"));
        assert!(!off_target(&flag_assembly(&filled(&["a"], frags.clone(), 0.0), &t, &conf)));

        // the parent plasmid carries a second copy of the forward site
        let parent = format!("{}{}{}", a.seq, random_dna(300, 77), t.slice(0, 19));
        let mut frags = frags;
        frags[0].template = Some(Arc::from(parent));
        let flags = flag_assembly(&filled(&["a"], frags, 0.0), &t, &conf);
        assert!(flags.iter().any(|f| f == "forward primer of a binds 2 sites in its template"), "{flags:?}");
    }

    #[test]
    fn test_rank_orders_by_count_then_cost() {
        let t = CircularTarget::new("t", &random_dna(1000, 5));
        let three = || {
            vec![
                fragment("a", 0, 399, &t),
                fragment("b", 370, 749, &t),
                fragment("c", 720, 1029, &t),
            ]
        };
        let two = vec![fragment("a", 0, 529, &t), fragment("b", 500, 1029, &t)];
        let candidates = vec![
            filled(&["x"], three(), 10.0),
            filled(&["y"], three(), 5.0),
            filled(&["z"], two, 50.0),
        ];
        let (kept, rejected) = validate_and_rank(candidates, &t, &AssemblyConfig::default());
        assert!(rejected.is_empty());
        let order: Vec<&str> = kept.iter().map(|a| a.keys[0].as_str()).collect();
        assert_eq!(order, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_flagged_assemblies_dropped_when_configured() {
        let repeat = "ACGTTGCAAGGCTTCGATCCGATGACTGAA";
        let unit = random_dna(470, 9);
        let t = CircularTarget::new("t", &format!("{repeat}{unit}{repeat}{unit}"));
        let frags = vec![fragment("a", 0, 529, &t), fragment("b", 500, 1029, &t)];
        let mut conf = AssemblyConfig::default();
        let (kept, _) = validate_and_rank(vec![filled(&["a"], frags.clone(), 0.0)], &t, &conf);
        assert_eq!(kept.len(), 1);
        assert!(!kept[0].flags.is_empty());
        conf.validation.drop_flagged = true;
        let (kept, rejected) = validate_and_rank(vec![filled(&["a"], frags, 0.0)], &t, &conf);
        assert!(kept.is_empty());
        assert!(rejected[0].reason.contains("duplicate junction"));
    }
}
