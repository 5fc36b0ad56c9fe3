//! Primer design contract and the built-in Tm-based designer.

use crate::{
    config::PcrConfig,
    target::{reverse_complement, wallace_tm},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("no primers: {reason}")]
    NoPrimers { reason: String },

    #[error("could not find primer design executable '{executable}'")]
    ToolNotFound { executable: String },

    #[error("primer design command failed: {command} (status={status:?}, stderr='{stderr}')")]
    ToolFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("'{executable}' did not finish within {after:?}")]
    Timeout {
        executable: String,
        after: std::time::Duration,
    },

    #[error("unreadable primer design output: {reason}")]
    BadOutput { reason: String },

    #[error("primer design I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl DesignError {
    /// Failures that say nothing about the junction itself: the tool is not
    /// there at all.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. } | Self::Io(_))
    }
}

/// A single primer, 5' to 3'. The first `tail_len` bases are the added tail,
/// the rest anneals to the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primer {
    pub seq: String,
    pub tm: f64,
    pub penalty: f64,
    pub tail_len: usize,
}

impl Primer {
    pub fn anneal(&self) -> &str {
        &self.seq[self.tail_len.min(self.seq.len())..]
    }

    pub fn anneal_len(&self) -> usize {
        self.seq.len() - self.tail_len.min(self.seq.len())
    }
}

/// What the filler needs for one PCR junction.
///
/// Both templates are written on the top strand. `left_tail` is appended to
/// the 3' end of the left fragment and `right_tail` prepended to the 5' end of
/// the right one; `homology` is the overlap the two products will share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionRequest {
    pub left_template: String,
    pub right_template: String,
    pub left_tail: String,
    pub right_tail: String,
    pub homology: usize,
    pub min_homology: usize,
    pub max_homology: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JunctionPrimers {
    /// Reverse primer amplifying the left fragment
    pub left_reverse: Primer,
    /// Forward primer amplifying the right fragment
    pub right_forward: Primer,
    pub penalty: f64,
}

/// Designs amplification primers.
///
/// Implementations must be pure functions of their input; the filler calls
/// them from several worker threads at once.
pub trait PrimerDesigner: Sync {
    fn design_junction(&self, req: &JunctionRequest) -> Result<JunctionPrimers, DesignError>;

    /// A tail-less primer annealing at the 5' end of `template`.
    fn design_end(&self, template: &str) -> Result<Primer, DesignError>;
}

/// Checks shared by every designer before anything is run.
pub fn check_junction_request(req: &JunctionRequest) -> Result<(), DesignError> {
    if req.homology < req.min_homology || req.homology > req.max_homology {
        return Err(DesignError::NoPrimers {
            reason: format!(
                "junction homology {} outside [{}, {}]",
                req.homology, req.min_homology, req.max_homology
            ),
        });
    }
    Ok(())
}

/// Deterministic designer using the Wallace rule: picks the shortest anneal
/// length reaching the target Tm.
#[derive(Debug, Clone)]
pub struct TmPrimerDesigner {
    target_tm: f64,
    min_anneal: usize,
    max_anneal: usize,
    max_tail: usize,
    max_pair_penalty: f64,
}

impl TmPrimerDesigner {
    pub fn new(conf: &PcrConfig, min_homology: usize) -> Self {
        Self {
            target_tm: conf.target_tm,
            min_anneal: conf.min_anneal_length,
            max_anneal: conf.max_anneal_length.max(conf.min_anneal_length),
            max_tail: conf.max_embed_length + min_homology,
            max_pair_penalty: conf.max_pair_penalty,
        }
    }

    fn anneal(&self, template: &str) -> Result<(String, f64), DesignError> {
        let template = template.to_ascii_uppercase();
        if template.len() < self.min_anneal {
            return Err(DesignError::NoPrimers {
                reason: format!(
                    "template of {} bp is shorter than the minimum anneal length {}",
                    template.len(),
                    self.min_anneal
                ),
            });
        }
        let longest = self.max_anneal.min(template.len());
        let len = (self.min_anneal..=longest)
            .find(|&len| wallace_tm(&template[..len]) >= self.target_tm)
            .unwrap_or(longest);
        let seq = template[..len].to_string();
        let tm = wallace_tm(&seq);
        Ok((seq, tm))
    }

    fn primer(&self, tail: &str, template: &str) -> Result<Primer, DesignError> {
        if tail.len() > self.max_tail {
            return Err(DesignError::NoPrimers {
                reason: format!("{} bp tail exceeds {} bp", tail.len(), self.max_tail),
            });
        }
        let (anneal, tm) = self.anneal(template)?;
        Ok(Primer {
            seq: format!("{}{anneal}", tail.to_ascii_uppercase()),
            tm,
            penalty: (tm - self.target_tm).abs(),
            tail_len: tail.len(),
        })
    }
}

impl PrimerDesigner for TmPrimerDesigner {
    fn design_junction(&self, req: &JunctionRequest) -> Result<JunctionPrimers, DesignError> {
        check_junction_request(req)?;
        let left_reverse = self.primer(
            &reverse_complement(&req.left_tail),
            &reverse_complement(&req.left_template),
        )?;
        let right_forward = self.primer(&req.right_tail, &req.right_template)?;
        let penalty = left_reverse.penalty + right_forward.penalty;
        if penalty > self.max_pair_penalty {
            return Err(DesignError::NoPrimers {
                reason: format!(
                    "pair penalty {penalty:.1} above {:.1}",
                    self.max_pair_penalty
                ),
            });
        }
        Ok(JunctionPrimers {
            left_reverse,
            right_forward,
            penalty,
        })
    }

    fn design_end(&self, template: &str) -> Result<Primer, DesignError> {
        self.primer("", template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn designer() -> TmPrimerDesigner {
        TmPrimerDesigner::new(&PcrConfig::default(), 20)
    }

    fn request(left_tail: &str, right_tail: &str, homology: usize) -> JunctionRequest {
        JunctionRequest {
            left_template: "TTTTTTTTTTACGTACGTACGTACGTACGTACGT".to_string(),
            right_template: "GCGCATATATATATATATATATATCCCCCCCCCC".to_string(),
            left_tail: left_tail.to_string(),
            right_tail: right_tail.to_string(),
            homology,
            min_homology: 20,
            max_homology: 120,
        }
    }

    #[test]
    fn test_shortest_anneal_reaching_tm() {
        let p = designer().design_end(&"ACGT".repeat(10)).unwrap();
        assert_eq!(p.anneal_len(), 20);
        assert_eq!(p.tail_len, 0);
        assert!(p.tm >= 60.0);
    }

    #[test]
    fn test_tails_are_added_on_the_right_strand() {
        let r = designer()
            .design_junction(&request("AAAAAAAAAAC", "GGGGGGGGGG", 21))
            .unwrap();
        assert!(r.right_forward.seq.starts_with("GGGGGGGGGG"));
        assert!(r.right_forward.anneal().starts_with("GCGCAT"));
        // reverse primer carries the reverse complement of the left tail
        assert!(r.left_reverse.seq.starts_with("GTTTTTTTTTT"));
        assert!(r.left_reverse.anneal().starts_with("ACGTACG"));
        assert!((r.penalty - r.left_reverse.penalty - r.right_forward.penalty).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_homology_out_of_bounds() {
        let err = designer().design_junction(&request("", "", 5)).unwrap_err();
        assert!(matches!(err, DesignError::NoPrimers { .. }));
        assert!(!err.is_tool_failure());
    }

    #[test]
    fn test_rejects_long_tail_and_short_template() {
        let tail = "A".repeat(41);
        assert!(designer().design_junction(&request(&tail, "", 41)).is_err());
        assert!(designer().design_end("ACGT").is_err());
    }
}
