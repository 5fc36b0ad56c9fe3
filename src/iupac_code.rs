const DNA_BITMASK_A: u8 = 1;
const DNA_BITMASK_C: u8 = 2;
const DNA_BITMASK_G: u8 = 4;
const DNA_BITMASK_T: u8 = 8;
const DNA_BITMASK_N: u8 = DNA_BITMASK_A | DNA_BITMASK_C | DNA_BITMASK_G | DNA_BITMASK_T;

/// Letters and their base sets, in the order used when rendering a code back
/// to a letter.
const IUPAC_LETTERS: [(u8, u8); 15] = [
    (b'A', DNA_BITMASK_A),
    (b'C', DNA_BITMASK_C),
    (b'G', DNA_BITMASK_G),
    (b'T', DNA_BITMASK_T),
    (b'W', DNA_BITMASK_A | DNA_BITMASK_T),
    (b'S', DNA_BITMASK_C | DNA_BITMASK_G),
    (b'M', DNA_BITMASK_A | DNA_BITMASK_C),
    (b'K', DNA_BITMASK_G | DNA_BITMASK_T),
    (b'R', DNA_BITMASK_A | DNA_BITMASK_G),
    (b'Y', DNA_BITMASK_C | DNA_BITMASK_T),
    (b'B', DNA_BITMASK_C | DNA_BITMASK_G | DNA_BITMASK_T),
    (b'D', DNA_BITMASK_A | DNA_BITMASK_G | DNA_BITMASK_T),
    (b'H', DNA_BITMASK_A | DNA_BITMASK_C | DNA_BITMASK_T),
    (b'V', DNA_BITMASK_A | DNA_BITMASK_C | DNA_BITMASK_G),
    (b'N', DNA_BITMASK_N),
];

/// A bitmasked IUPAC code for DNA bases, eg DNA_BITMASK_A|DNA_BITMASK_C
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IupacCode(u8);

impl IupacCode {
    pub fn new(bitmask: u8) -> Self {
        Self(bitmask & DNA_BITMASK_N)
    }

    /// Unknown letters map to the empty code. `U` reads as `T`, `X` as `N`.
    #[inline(always)]
    pub fn from_letter(letter: u8) -> Self {
        match letter.to_ascii_uppercase() {
            b'U' => Self(DNA_BITMASK_T),
            b'X' => Self(DNA_BITMASK_N),
            upper => IUPAC_LETTERS
                .iter()
                .find(|(l, _)| *l == upper)
                .map(|(_, mask)| Self(*mask))
                .unwrap_or(Self(0)),
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every base of `base` is allowed by this code.
    #[inline(always)]
    pub fn matches(self, base: u8) -> bool {
        let other = Self::from_letter(base);
        !other.is_empty() && other.0 & self.0 == other.0
    }

    #[inline(always)]
    pub fn is_valid_letter(letter: u8) -> bool {
        !Self::from_letter(letter).is_empty()
    }

    #[inline(always)]
    pub fn to_vec(&self) -> Vec<u8> {
        [
            (DNA_BITMASK_A, b'A'),
            (DNA_BITMASK_C, b'C'),
            (DNA_BITMASK_G, b'G'),
            (DNA_BITMASK_T, b'T'),
        ]
        .iter()
        .filter(|(mask, _)| self.0 & mask != 0)
        .map(|(_, base)| *base)
        .collect()
    }

    pub fn to_letter(&self) -> Option<u8> {
        IUPAC_LETTERS
            .iter()
            .find(|(_, mask)| *mask == self.0)
            .map(|(l, _)| *l)
    }

    /// Complement of every base in the set: A<->T, C<->G.
    pub fn complement(self) -> Self {
        let mut ret = 0;
        if self.0 & DNA_BITMASK_A != 0 {
            ret |= DNA_BITMASK_T;
        }
        if self.0 & DNA_BITMASK_T != 0 {
            ret |= DNA_BITMASK_A;
        }
        if self.0 & DNA_BITMASK_C != 0 {
            ret |= DNA_BITMASK_G;
        }
        if self.0 & DNA_BITMASK_G != 0 {
            ret |= DNA_BITMASK_C;
        }
        Self(ret)
    }

    /// Regex fragment for this code: a bare base or a character class.
    pub fn to_regex_class(&self) -> String {
        let bases = self.to_vec();
        match bases.len() {
            0 => String::new(),
            1 => char::from(bases[0]).to_string(),
            _ => format!("[{}]", String::from_utf8_lossy(&bases)),
        }
    }

    /// Complement of a single letter, keeping ambiguity codes and the case of
    /// the input. Non-IUPAC letters come back as `N`.
    #[inline(always)]
    pub fn letter_complement(letter: u8) -> u8 {
        let code = Self::from_letter(letter);
        if code.is_empty() {
            return b'N';
        }
        let ret = code.complement().to_letter().unwrap_or(b'N');
        if letter.is_ascii_lowercase() {
            ret.to_ascii_lowercase()
        } else {
            ret
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base2iupac() {
        assert!(IupacCode::from_letter(b'V').matches(b'G'));
        assert!(!IupacCode::from_letter(b'H').matches(b'G'));
        assert_eq!(IupacCode::from_letter(b'A'), IupacCode::new(DNA_BITMASK_A));
        assert_eq!(IupacCode::from_letter(b'u'), IupacCode::new(DNA_BITMASK_T));
        assert_eq!(IupacCode::from_letter(b'X'), IupacCode::new(DNA_BITMASK_N));
        assert_eq!(IupacCode::from_letter(b'Z'), IupacCode::new(0));
    }

    #[test]
    fn test_matches() {
        assert!(IupacCode::from_letter(b'R').matches(b'A'));
        assert!(IupacCode::from_letter(b'R').matches(b'g'));
        assert!(!IupacCode::from_letter(b'R').matches(b'C'));
        assert!(IupacCode::from_letter(b'N').matches(b'T'));
        assert!(!IupacCode::from_letter(b'A').matches(b'N'));
    }

    #[test]
    fn test_regex_class() {
        assert_eq!(IupacCode::from_letter(b'A').to_regex_class(), "A");
        assert_eq!(IupacCode::from_letter(b'W').to_regex_class(), "[AT]");
        assert_eq!(IupacCode::from_letter(b'N').to_regex_class(), "[ACGT]");
    }

    #[test]
    fn test_complement() {
        assert_eq!(IupacCode::letter_complement(b'A'), b'T');
        assert_eq!(IupacCode::letter_complement(b'C'), b'G');
        assert_eq!(IupacCode::letter_complement(b'U'), b'A');
        assert_eq!(IupacCode::letter_complement(b'a'), b't');
        assert_eq!(IupacCode::letter_complement(b'R'), b'Y');
        assert_eq!(IupacCode::letter_complement(b'W'), b'W');
        assert_eq!(IupacCode::letter_complement(b'N'), b'N');
        assert_eq!(IupacCode::letter_complement(b'-'), b'N');
    }
}
