//! Flat-file stores of named sequences: features and restriction enzymes.
//!
//! One record per line, `name<TAB>sequence`, no header. Stores are owned
//! values: load one, hand it to whoever needs it, and every `set`/`delete`
//! writes the file straight back.

use crate::{
    enzymes::{check_recognition, Enzyme},
    error::AssemblyError,
    target::normalize_dna,
};
use bio::alignment::distance::levenshtein;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Names within this edit distance of a query are offered as near misses.
const NEAR_MISS_DISTANCE: u32 = 2;
/// Fewer substring hits than this and the near misses are shown as well.
const MIN_CONTAINING: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    path: Option<PathBuf>,
    /// In file order
    entries: Vec<(String, String)>,
}

impl SequenceStore {
    /// Reads the store at `path`. A missing file is an empty store that will
    /// be created on the first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AssemblyError> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self {
            path: Some(path.clone()),
            entries: vec![],
        };
        if !path.exists() {
            debug!(path = %path.display(), "store file missing, starting empty");
            return Ok(store);
        }
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_path(&path)
            .map_err(|e| io_error(&path, "read", e))?;
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| io_error(&path, "read", e))?;
            match (record.get(0), record.get(1)) {
                (Some(name), Some(seq)) if !name.trim().is_empty() => {
                    upsert(&mut store.entries, name.trim(), seq.trim());
                }
                _ => warn!(path = %path.display(), line = line + 1, "skipping malformed record"),
            }
        }
        Ok(store)
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut ret: Vec<&str> = self.entries.iter().map(|(n, _)| n.as_str()).collect();
        ret.sort();
        ret
    }

    /// All entries, sorted by name.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut ret: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(n, s)| (n.as_str(), s.as_str()))
            .collect();
        ret.sort();
        ret
    }

    /// Entries matching `query`: the exact name if present, otherwise names
    /// containing it (when there are enough of them), otherwise names within a
    /// small edit distance together with the few containing ones.
    pub fn find(&self, query: &str) -> Vec<(&str, &str)> {
        if let Some((name, seq)) = self.entries.iter().find(|(n, _)| n == query) {
            return vec![(name.as_str(), seq.as_str())];
        }
        let lower = query.to_lowercase();
        let mut containing = vec![];
        let mut near = vec![];
        for (name, seq) in self.entries() {
            let name_lower = name.to_lowercase();
            if name_lower.contains(&lower) {
                containing.push((name, seq));
            } else if name.len() > NEAR_MISS_DISTANCE as usize
                && levenshtein(lower.as_bytes(), name_lower.as_bytes()) <= NEAR_MISS_DISTANCE
            {
                near.push((name, seq));
            }
        }
        if containing.len() >= MIN_CONTAINING {
            return containing;
        }
        near.extend(containing);
        near.sort();
        near
    }

    /// Creates or updates `name`. Returns whether it existed before. Nothing
    /// changes, in memory or on disk, when the write fails.
    pub fn set(&mut self, name: &str, seq: &str) -> Result<bool, AssemblyError> {
        let name = name.trim();
        let seq = seq.trim();
        let unusable = |s: &str| s.chars().any(|c| c.is_control());
        if name.is_empty() || unusable(name) {
            return Err(AssemblyError::InvalidInput {
                message: format!("{name:?} is not a usable store name"),
            });
        }
        if unusable(seq) {
            return Err(AssemblyError::InvalidInput {
                message: format!("sequence for '{name}' contains control characters"),
            });
        }
        let mut entries = self.entries.clone();
        let existed = upsert(&mut entries, name, seq);
        self.persist(&entries)?;
        self.entries = entries;
        Ok(existed)
    }

    /// Removes `name`. Returns whether it was there.
    pub fn delete(&mut self, name: &str) -> Result<bool, AssemblyError> {
        let mut entries = self.entries.clone();
        entries.retain(|(n, _)| n != name);
        if entries.len() == self.entries.len() {
            return Ok(false);
        }
        self.persist(&entries)?;
        self.entries = entries;
        Ok(true)
    }

    fn persist(&self, entries: &[(String, String)]) -> Result<(), AssemblyError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .from_path(path)
            .map_err(|e| io_error(path, "write", e))?;
        for (name, seq) in entries {
            wtr.write_record([name, seq])
                .map_err(|e| io_error(path, "write", e))?;
        }
        wtr.flush().map_err(|e| AssemblyError::Io {
            context: format!("could not write store {}", path.display()),
            source: e,
        })
    }
}

fn upsert(entries: &mut Vec<(String, String)>, name: &str, seq: &str) -> bool {
    match entries.iter_mut().find(|(n, _)| n == name) {
        Some(entry) => {
            entry.1 = seq.to_string();
            true
        }
        None => {
            entries.push((name.to_string(), seq.to_string()));
            false
        }
    }
}

fn io_error(path: &Path, what: &str, e: csv::Error) -> AssemblyError {
    AssemblyError::Io {
        context: format!("could not {what} store {}", path.display()),
        source: e.into(),
    }
}

fn not_found(what: &str, name: &str) -> AssemblyError {
    AssemblyError::NotFound {
        what: what.to_string(),
        name: name.to_string(),
    }
}

/// Named features, stored upper-case.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    store: SequenceStore,
}

impl FeatureStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AssemblyError> {
        Ok(Self {
            store: SequenceStore::open(path)?,
        })
    }

    pub fn new(store: SequenceStore) -> Self {
        Self { store }
    }

    pub fn get(&self, name: &str) -> Result<&str, AssemblyError> {
        self.store.get(name).ok_or_else(|| not_found("feature", name))
    }

    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.store.entries()
    }

    pub fn find(&self, query: &str) -> Vec<(&str, &str)> {
        self.store.find(query)
    }

    pub fn set(&mut self, name: &str, seq: &str) -> Result<bool, AssemblyError> {
        let seq = normalize_dna(seq);
        if seq.is_empty() {
            return Err(AssemblyError::InvalidInput {
                message: format!("feature '{name}' has no sequence"),
            });
        }
        self.store.set(name, &seq)
    }

    pub fn delete(&mut self, name: &str) -> Result<bool, AssemblyError> {
        self.store.delete(name)
    }
}

/// Restriction enzymes by name, recognition sequences with cut markers.
#[derive(Debug, Clone)]
pub struct EnzymeStore {
    store: SequenceStore,
    invalid_chars: Regex,
}

impl EnzymeStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AssemblyError> {
        Self::new(SequenceStore::open(path)?)
    }

    pub fn new(store: SequenceStore) -> Result<Self, AssemblyError> {
        let invalid_chars =
            Regex::new(r"[^ATGCMRWYSKHDVBNX_\^]").map_err(|e| AssemblyError::InvalidInput {
                message: e.to_string(),
            })?;
        Ok(Self {
            store,
            invalid_chars,
        })
    }

    pub fn get(&self, name: &str) -> Result<Enzyme, AssemblyError> {
        let recognition = self.store.get(name).ok_or_else(|| not_found("enzyme", name))?;
        Enzyme::parse(name, recognition)
    }

    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.store.entries()
    }

    pub fn find(&self, query: &str) -> Vec<(&str, &str)> {
        self.store.find(query)
    }

    /// Upper-cases the recognition sequence and drops anything that is not an
    /// IUPAC letter or a cut marker, then refuses it unless exactly one marker
    /// of each kind is left. Nothing is written on refusal.
    pub fn set(&mut self, name: &str, recognition: &str) -> Result<bool, AssemblyError> {
        let cleaned = self
            .invalid_chars
            .replace_all(&recognition.to_ascii_uppercase(), "")
            .to_string();
        check_recognition(&cleaned)?;
        self.store.set(name, &cleaned)
    }

    pub fn delete(&mut self, name: &str) -> Result<bool, AssemblyError> {
        self.store.delete(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names<'a>(found: &[(&'a str, &'a str)]) -> Vec<&'a str> {
        found.iter().map(|(n, _)| *n).collect()
    }

    #[test]
    fn test_open_reads_tab_separated_records() {
        let td = tempdir().unwrap();
        let path = td.path().join("features.tsv");
        std::fs::write(&path, "pSB1C3\tACGT\nbroken line\nlacZ\tGGCC\n").unwrap();
        let store = SequenceStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("lacZ"), Some("GGCC"));
        assert_eq!(store.get("broken line"), None);
    }

    #[test]
    fn test_set_and_delete_persist() {
        let td = tempdir().unwrap();
        let path = td.path().join("features.tsv");
        let mut store = SequenceStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert!(!store.set("a", "ACGT").unwrap());
        assert!(!store.set("b", "TTTT").unwrap());
        assert!(store.set("a", "GGGG").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\tGGGG\nb\tTTTT\n");
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        let reread = SequenceStore::open(&path).unwrap();
        assert_eq!(reread.entries(), vec![("b", "TTTT")]);
        assert_eq!(reread.names(), vec!["b"]);
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let td = tempdir().unwrap();
        let mut store = SequenceStore::open(td.path().join("gone/features.tsv")).unwrap();
        assert!(matches!(store.set("a", "ACGT"), Err(AssemblyError::Io { .. })));
        assert!(store.is_empty());
        assert_eq!(store.get("a"), None);
    }

    #[test]
    fn test_set_rejects_names_that_break_records() {
        let mut store = SequenceStore::in_memory();
        for bad in ["", "a\tb", "a\nb", "a\rb"] {
            assert!(
                matches!(store.set(bad, "ACGT"), Err(AssemblyError::InvalidInput { .. })),
                "{bad:?} accepted"
            );
        }
        assert!(store.set("ok", "AC\nGT").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_exact_containing_and_near() {
        let mut store = SequenceStore::in_memory();
        for name in ["EcoRI", "EcoRV", "EcoRII", "EcoNI", "BamHI", "HindIII"] {
            store.set(name, "A").unwrap();
        }
        assert_eq!(names(&store.find("BamHI")), vec!["BamHI"]);
        // enough names contain "ecor"
        assert_eq!(names(&store.find("ecor")), vec!["EcoRI", "EcoRII", "EcoRV"]);
        // too few containing names: near misses are shown with them
        assert_eq!(names(&store.find("BamH")), vec!["BamHI"]);
        assert_eq!(names(&store.find("HindII")), vec!["HindIII"]);
        assert_eq!(names(&store.find("BanHI")), vec!["BamHI"]);
        assert!(store.find("XhoI").is_empty());
    }

    #[test]
    fn test_enzyme_store_rejects_malformed_recognition() {
        let td = tempdir().unwrap();
        let path = td.path().join("enzymes.tsv");
        let mut store = EnzymeStore::open(&path).unwrap();
        assert!(matches!(
            store.set("EcoRI", "GAATTC"),
            Err(AssemblyError::InvalidRecognitionSyntax { .. })
        ));
        assert!(matches!(
            store.set("EcoRI", "G^AA^TT_C"),
            Err(AssemblyError::InvalidRecognitionSyntax { .. })
        ));
        assert!(!path.exists());
        store.set("EcoRI", " g^aatt_c 1").unwrap();
        assert_eq!(store.entries(), vec![("EcoRI", "G^AATT_C")]);
        let enzyme = store.get("EcoRI").unwrap();
        assert_eq!(enzyme.recognition, "GAATTC");
        assert!(matches!(
            store.get("PstI"),
            Err(AssemblyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_feature_store_upper_cases() {
        let mut store = FeatureStore::new(SequenceStore::in_memory());
        store.set("ori", "acg t\n").unwrap();
        assert_eq!(store.get("ori").unwrap(), "ACGT");
        assert!(store.set("empty", " ").is_err());
        let err = store.get("missing").unwrap_err();
        assert_eq!(err.to_string(), "feature 'missing' not found");
    }
}
