//! Restriction enzymes with explicit cut markers, and backbone linearization.
//!
//! A recognition sequence carries one `^` (cut in the top strand) and one `_`
//! (cut in the bottom strand), eg `G^AATT_C` for EcoRI.

use crate::{
    error::AssemblyError,
    iupac_code::IupacCode,
    target::{normalize_dna, reverse_complement, undouble},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const TOP_CUT_MARKER: char = '^';
pub const BOTTOM_CUT_MARKER: char = '_';

#[derive(Clone, Debug)]
pub struct Enzyme {
    pub name: String,
    /// Recognition sequence without the markers
    pub recognition: String,
    /// Cut index in the top strand, relative to the recognition start
    pub top_cut: usize,
    /// Cut index in the bottom strand, relative to the recognition start
    pub bottom_cut: usize,
    forward_regex: Regex,
    reverse_regex: Regex,
}

/// A backbone as it was before digestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneInfo {
    pub id: String,
    pub seq: String,
    pub enzyme: String,
    /// Start of the recognition site used, on the top strand
    pub recognition_index: usize,
    pub forward: bool,
}

/// Checks that `recognition` has exactly one cut marker per strand and only
/// IUPAC letters otherwise.
pub fn check_recognition(recognition: &str) -> Result<(), AssemblyError> {
    let invalid = |reason: String| AssemblyError::InvalidRecognitionSyntax {
        sequence: recognition.to_string(),
        reason,
    };
    let top = recognition.matches(TOP_CUT_MARKER).count();
    let bottom = recognition.matches(BOTTOM_CUT_MARKER).count();
    if top != 1 || bottom != 1 {
        return Err(invalid(format!(
            "expected one '{TOP_CUT_MARKER}' and one '{BOTTOM_CUT_MARKER}', found {top} and {bottom}"
        )));
    }
    if let Some(c) = recognition
        .bytes()
        .filter(|c| *c != TOP_CUT_MARKER as u8 && *c != BOTTOM_CUT_MARKER as u8)
        .find(|c| !IupacCode::is_valid_letter(*c))
    {
        return Err(invalid(format!("'{}' is not an IUPAC code", char::from(c))));
    }
    if recognition.len() == 2 {
        return Err(invalid("no recognition bases".to_string()));
    }
    Ok(())
}

fn recognition_regex(recognition: &str) -> Result<Regex, regex::Error> {
    let pattern: String = recognition
        .bytes()
        .map(|c| IupacCode::from_letter(c).to_regex_class())
        .collect();
    Regex::new(&pattern)
}

impl Enzyme {
    pub fn parse(name: &str, recognition: &str) -> Result<Self, AssemblyError> {
        let marked = recognition.trim().to_ascii_uppercase();
        check_recognition(&marked)?;
        let mut top_cut = 0;
        let mut bottom_cut = 0;
        let mut plain = String::with_capacity(marked.len());
        for c in marked.chars() {
            match c {
                TOP_CUT_MARKER => top_cut = plain.len(),
                BOTTOM_CUT_MARKER => bottom_cut = plain.len(),
                c => plain.push(c),
            }
        }
        let to_error = |e: regex::Error| AssemblyError::InvalidRecognitionSyntax {
            sequence: recognition.to_string(),
            reason: e.to_string(),
        };
        let forward_regex = recognition_regex(&plain).map_err(to_error)?;
        let reverse_regex = recognition_regex(&reverse_complement(&plain)).map_err(to_error)?;
        Ok(Self {
            name: name.to_string(),
            recognition: plain,
            top_cut,
            bottom_cut,
            forward_regex,
            reverse_regex,
        })
    }

    /// Earliest recognition site on the circular `seq`, on either strand.
    /// Sites crossing the origin are found through the `wrap` bases appended
    /// from the start. Forward wins a tie.
    pub fn find_site(&self, seq: &str, wrap: usize) -> Option<(usize, bool)> {
        let extended = format!("{seq}{}", &seq[..wrap.min(seq.len())]);
        let first_at = |re: &Regex| {
            re.find(&extended)
                .map(|m| m.start())
                .filter(|start| *start < seq.len())
        };
        match (first_at(&self.forward_regex), first_at(&self.reverse_regex)) {
            (Some(f), Some(r)) if r < f => Some((r, false)),
            (Some(f), _) => Some((f, true)),
            (None, Some(r)) => Some((r, false)),
            (None, None) => None,
        }
    }
}

/// Cuts a circular backbone open at the first site of `enzyme`.
///
/// With a 3' overhang or a blunt cut, the result is the whole circle starting
/// at the top-strand cut. With a 5' overhang it runs from the bottom-strand
/// cut around to the top-strand cut, leaving out the single-stranded
/// overhang.
pub fn digest(
    id: &str,
    seq: &str,
    enzyme: &Enzyme,
    wrap_window: usize,
) -> Result<(String, BackboneInfo), AssemblyError> {
    let no_site = |reason: String| AssemblyError::NoValidCutsite {
        fragment: id.to_string(),
        enzyme: enzyme.name.clone(),
        reason,
    };
    let seq = normalize_dna(seq);
    if seq.len() < wrap_window {
        return Err(no_site(format!(
            "{} bp is too short for digestion, need at least {wrap_window}",
            seq.len()
        )));
    }
    let seq = undouble(&seq).to_string();
    let (recognition_index, forward) = enzyme
        .find_site(&seq, wrap_window)
        .ok_or_else(|| no_site(format!("no {} site", enzyme.recognition)))?;

    let len = seq.len();
    let rotated = |from: usize, take: usize| -> String {
        seq.bytes()
            .cycle()
            .skip(from % len)
            .take(take)
            .map(char::from)
            .collect()
    };
    // on a reverse site the enzyme's strands are swapped and read backwards
    let site_len = enzyme.recognition.len();
    let (top_cut, bottom_cut) = if forward {
        (enzyme.top_cut, enzyme.bottom_cut)
    } else {
        (site_len - enzyme.bottom_cut, site_len - enzyme.top_cut)
    };
    let linear = if top_cut >= bottom_cut {
        rotated(recognition_index + top_cut, len)
    } else {
        let overhang = bottom_cut - top_cut;
        rotated(recognition_index + bottom_cut, len - overhang.min(len))
    };

    Ok((
        linear,
        BackboneInfo {
            id: id.to_string(),
            seq: seq.clone(),
            enzyme: enzyme.name.clone(),
            recognition_index,
            forward,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker_positions() {
        let e = Enzyme::parse("EcoRI", "g^aatt_c").unwrap();
        assert_eq!(e.recognition, "GAATTC");
        assert_eq!(e.top_cut, 1);
        assert_eq!(e.bottom_cut, 5);
        let e = Enzyme::parse("PstI", "C_TGCA^G").unwrap();
        assert_eq!((e.top_cut, e.bottom_cut), (5, 1));
    }

    #[test]
    fn test_parse_rejects_bad_markers() {
        for bad in ["GAATTC", "G^AA^TT_C", "G^AATTC", "G^AA_TT_C", "G^AAJT_C", "^_"] {
            assert!(
                matches!(
                    Enzyme::parse("x", bad),
                    Err(AssemblyError::InvalidRecognitionSyntax { .. })
                ),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_iupac_codes_match_classes() {
        let e = Enzyme::parse("BsaJI", "C^CNN_GG").unwrap();
        assert_eq!(e.find_site("TTTTCCATGGTTTT", 0), Some((4, true)));
        assert_eq!(e.find_site("TTTTCCATCGTTTT", 0), None);
    }

    #[test]
    fn test_digest_five_prime_overhang_drops_overhang() {
        let e = Enzyme::parse("EcoRI", "G^AATT_C").unwrap();
        let left = "TTTTTTTTTTCCCCCCCCCCAAAAAAAAAA";
        let right = "GGGGGGGGGGTTTTTTTTTT";
        let seq = format!("{left}GAATTC{right}");
        let (linear, info) = digest("pBack", &seq, &e, 38).unwrap();
        assert_eq!(linear, format!("C{right}{left}G"));
        assert_eq!(linear.len(), seq.len() - 4);
        assert_eq!(info.recognition_index, 30);
        assert!(info.forward);
        assert_eq!(info.seq, seq);
    }

    #[test]
    fn test_digest_site_across_origin() {
        let e = Enzyme::parse("EcoRI", "G^AATT_C").unwrap();
        let middle = "TTTTTTTTTTCCCCCCCCCCAAAAAAAAAAGGGGGGGGGG";
        let seq = format!("ATTC{middle}GA");
        let (linear, info) = digest("pBack", &seq, &e, 38).unwrap();
        assert_eq!(info.recognition_index, seq.len() - 2);
        assert_eq!(linear, &seq[3..seq.len() - 1]);
    }

    #[test]
    fn test_digest_three_prime_overhang_keeps_whole_circle() {
        let e = Enzyme::parse("PstI", "C_TGCA^G").unwrap();
        let seq = format!("{}CTGCAG{}", "A".repeat(20), "T".repeat(20));
        let (linear, _) = digest("pBack", &seq, &e, 38).unwrap();
        assert_eq!(linear.len(), seq.len());
        assert!(linear.starts_with("GTTTT"));
        assert!(linear.ends_with("CTGCA"));
    }

    #[test]
    fn test_digest_finds_reverse_strand_site() {
        let e = Enzyme::parse("BsaI", "GGTCTCN^NNNN_").unwrap();
        let seq = format!("{}GAGACC{}", "A".repeat(25), "A".repeat(25));
        let (_, info) = digest("pBack", &seq, &e, 38).unwrap();
        assert!(!info.forward);
        assert_eq!(info.recognition_index, 25 - 5);
    }

    #[test]
    fn test_digest_mirrors_cuts_on_reverse_site() {
        // BsaI cuts 1/5 after GGTCTC; read on the top strand as GAGACC that
        // is 5/1 before it
        let e = Enzyme::parse("BsaI", "GGTCTCN^NNNN_").unwrap();
        let left = "ACGTTGCAAGGCTTCGATCCA";
        let right = "TTGACCAGTAGGCATCGGATCAACTT";
        let seq = format!("{left}CCCAAGAGACC{right}");
        let (linear, info) = digest("pBack", &seq, &e, 38).unwrap();
        assert!(!info.forward);
        assert_eq!(info.recognition_index, 21);
        // the 4 base 5' overhang CCCA is left out
        assert_eq!(linear, format!("AGAGACC{right}{left}"));
        assert_eq!(linear.len(), seq.len() - 4);
    }

    #[test]
    fn test_digest_halves_doubled_backbone() {
        let e = Enzyme::parse("EcoRI", "G^AATT_C").unwrap();
        let unit = format!("{}GAATTC{}", "T".repeat(20), "C".repeat(20));
        let (linear, info) = digest("pBack", &format!("{unit}{unit}"), &e, 38).unwrap();
        assert_eq!(info.seq, unit);
        assert_eq!(linear.len(), unit.len() - 4);
    }

    #[test]
    fn test_digest_errors() {
        let e = Enzyme::parse("EcoRI", "G^AATT_C").unwrap();
        let short = digest("pShort", "GAATTC", &e, 38).unwrap_err();
        assert!(matches!(short, AssemblyError::NoValidCutsite { .. }));
        assert!(short.to_string().contains("pShort"));
        let none = digest("pNone", &"ACGT".repeat(20), &e, 38).unwrap_err();
        assert!(none.to_string().contains("no GAATTC site"));
    }
}
