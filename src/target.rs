//! The circular target and its coordinate layers.
//!
//! Matches are searched against the target written out three times so that
//! hits crossing the origin come back contiguous. Everything downstream works
//! on "unrolled" coordinates (a position may exceed the target length) and
//! uses [`CircularTarget::canonical`] to map back onto the molecule.

use crate::iupac_code::IupacCode;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircularTarget {
    id: String,
    seq: String,
}

impl CircularTarget {
    pub fn new(id: &str, seq: &str) -> Self {
        Self {
            id: id.to_string(),
            seq: normalize_dna(seq),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seq(&self) -> &str {
        &self.seq
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// The sequence handed to the similarity search.
    pub fn tripled(&self) -> String {
        self.seq.repeat(3)
    }

    #[inline(always)]
    pub fn canonical(&self, idx: usize) -> usize {
        if self.seq.is_empty() { 0 } else { idx % self.len() }
    }

    /// Inclusive range on unrolled coordinates, wrapping across the origin as
    /// often as needed. Empty when `end < start`.
    pub fn slice(&self, start: usize, end: usize) -> String {
        if end < start || self.seq.is_empty() {
            return String::new();
        }
        let bytes = self.seq.as_bytes();
        (start..=end)
            .map(|i| char::from(bytes[i % bytes.len()]))
            .collect()
    }
}

/// Upper-case and strip whitespace.
pub fn normalize_dna(seq: &str) -> String {
    seq.chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn reverse_complement(seq: &str) -> String {
    seq.as_bytes()
        .iter()
        .rev()
        .map(|c| IupacCode::letter_complement(*c))
        .map(char::from)
        .collect()
}

/// Circular entries are sometimes stored twice in a row. Returns the first
/// half when the sequence is an exact doubled repeat.
pub fn undouble(seq: &str) -> &str {
    let half = seq.len() / 2;
    if half > 0
        && seq.len() % 2 == 0
        && seq.is_char_boundary(half)
        && seq[..half].eq_ignore_ascii_case(&seq[half..])
    {
        &seq[..half]
    } else {
        seq
    }
}

/// Melting temperature by the Wallace rule, 2*(A+T) + 4*(G+C).
pub fn wallace_tm(seq: &str) -> f64 {
    seq.bytes()
        .map(|b| match b.to_ascii_uppercase() {
            b'G' | b'C' => 4.0,
            b'A' | b'T' => 2.0,
            _ => 0.0,
        })
        .sum()
}
