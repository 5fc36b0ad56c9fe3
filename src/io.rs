//! Reading input sequences from FASTA or GenBank files.

use anyhow::{anyhow, Result};
use bio::io::fasta;
use gb_io::seq::Topology;
use std::{fs::File, path::Path};

/// A named input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub seq: String,
    pub circular: bool,
}

impl SequenceRecord {
    pub fn new(id: &str, seq: &str) -> Self {
        Self {
            id: id.to_string(),
            seq: seq.to_string(),
            circular: false,
        }
    }
}

/// All records of a FASTA or GenBank file, told apart by the first
/// non-blank character.
pub fn read_sequences<P: AsRef<Path>>(path: P) -> Result<Vec<SequenceRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let ret = match text.trim_start().chars().next() {
        Some('>') => from_fasta_file(path)?,
        Some(_) if text.trim_start().starts_with("LOCUS") => from_genbank_file(path)?,
        _ => return Err(anyhow!("{} is neither FASTA nor GenBank", path.display())),
    };
    if ret.is_empty() {
        return Err(anyhow!("no sequences in {}", path.display()));
    }
    Ok(ret)
}

pub fn from_fasta_file(path: &Path) -> Result<Vec<SequenceRecord>> {
    let file = File::open(path)?;
    let mut ret = vec![];
    for record in fasta::Reader::new(file).records() {
        let record = record?;
        ret.push(SequenceRecord::new(
            record.id(),
            &String::from_utf8_lossy(record.seq()),
        ));
    }
    Ok(ret)
}

pub fn from_genbank_file(path: &Path) -> Result<Vec<SequenceRecord>> {
    Ok(gb_io::reader::parse_file(path)?
        .into_iter()
        .enumerate()
        .map(|(i, seq)| SequenceRecord {
            id: seq.name.clone().unwrap_or_else(|| format!("sequence_{}", i + 1)),
            seq: String::from_utf8_lossy(&seq.seq).to_string(),
            circular: seq.topology == Topology::Circular,
        })
        .collect())
}

/// Writes `records` as FASTA, eg a query file for an external search.
pub fn write_fasta<W: std::io::Write>(writer: W, records: &[SequenceRecord]) -> Result<()> {
    let mut writer = fasta::Writer::new(writer);
    for record in records {
        writer.write(&record.id, None, record.seq.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_io::seq::Seq;
    use tempfile::tempdir;

    #[test]
    fn test_fasta_round_trip() {
        let td = tempdir().unwrap();
        let path = td.path().join("in.fa");
        let records = vec![
            SequenceRecord::new("pA", "ACGTACGT"),
            SequenceRecord::new("pB", "GGGG"),
        ];
        write_fasta(File::create(&path).unwrap(), &records).unwrap();
        assert_eq!(read_sequences(&path).unwrap(), records);
    }

    #[test]
    fn test_genbank_topology() {
        let td = tempdir().unwrap();
        let path = td.path().join("in.gb");
        let mut seq = Seq::empty();
        seq.name = Some("pCirc".to_string());
        seq.topology = Topology::Circular;
        seq.seq = b"acgtacgtacgtacgtacgt".to_vec();
        gb_io::writer::write(File::create(&path).unwrap(), &seq).unwrap();
        let records = read_sequences(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "pCirc");
        assert!(records[0].circular);
        assert_eq!(records[0].seq.to_ascii_uppercase(), "ACGT".repeat(5));
    }

    #[test]
    fn test_unknown_format() {
        let td = tempdir().unwrap();
        let path = td.path().join("in.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(read_sequences(&path).is_err());
        std::fs::write(&path, "").unwrap();
        assert!(read_sequences(&path).is_err());
    }
}
