//! `blastn` as a [`MatchSource`].

use crate::{
    io::{write_fasta, SequenceRecord},
    matches::{Match, MatchSource, SearchError},
};
use std::{
    collections::{BTreeSet, HashMap},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Output},
};
use tracing::{debug, info, warn};

const DEFAULT_BLASTN_BIN: &str = "blastn";
const BLASTN_ENV_BIN: &str = "GENTLE_BLASTN_BIN";
const DEFAULT_BLASTDBCMD_BIN: &str = "blastdbcmd";
const BLASTDBCMD_ENV_BIN: &str = "GENTLE_BLASTDBCMD_BIN";
const ENTRY_FORMAT: &str = "%i %s";
const OUTPUT_FORMAT: &str = "6 sseqid qstart qend sstart send sseq mismatch";
const OUTPUT_COLUMNS: usize = 7;
/// Files a formatted nucleotide database may be known by.
const DATABASE_SUFFIXES: [&str; 4] = ["", ".nsq", ".nal", ".ndb"];

#[derive(Debug, Clone)]
pub struct BlastMatchSource {
    executable: String,
    /// Fetches whole entries, for primer checks against the PCR template
    entry_executable: String,
    perc_identity: u32,
}

impl Default for BlastMatchSource {
    fn default() -> Self {
        Self {
            executable: executable_from_env(BLASTN_ENV_BIN, DEFAULT_BLASTN_BIN),
            entry_executable: executable_from_env(BLASTDBCMD_ENV_BIN, DEFAULT_BLASTDBCMD_BIN),
            perc_identity: 100,
        }
    }
}

fn executable_from_env(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl BlastMatchSource {
    pub fn with_executable(executable: &str) -> Self {
        Self {
            executable: executable.to_string(),
            ..Self::default()
        }
    }

    pub fn with_entry_executable(mut self, executable: &str) -> Self {
        self.entry_executable = executable.to_string();
        self
    }

    pub fn with_perc_identity(mut self, perc_identity: u32) -> Self {
        self.perc_identity = perc_identity.min(100);
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    fn run(&self, executable: &str, args: &[String]) -> Result<Output, SearchError> {
        let output = Command::new(executable)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SearchError::ToolNotFound {
                    executable: executable.to_string(),
                },
                _ => SearchError::Io(e),
            })?;
        if !output.status.success() {
            return Err(SearchError::ToolFailed {
                command: format!("{executable} {}", args.join(" ")),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn search_database(&self, query: &Path, db: &Path) -> Result<Vec<Match>, SearchError> {
        let args: Vec<String> = vec![
            "-task".to_string(),
            "blastn".to_string(),
            "-db".to_string(),
            db.display().to_string(),
            "-query".to_string(),
            query.display().to_string(),
            "-outfmt".to_string(),
            OUTPUT_FORMAT.to_string(),
            "-perc_identity".to_string(),
            self.perc_identity.to_string(),
        ];
        let output = self.run(&self.executable, &args)?;
        parse_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Whole sequences of `ids` in `db`, keyed by id.
    fn fetch_entries(
        &self,
        db: &Path,
        ids: &BTreeSet<&str>,
    ) -> Result<HashMap<String, String>, SearchError> {
        let mut batch = tempfile::Builder::new()
            .prefix("gentle-entries-")
            .suffix(".txt")
            .tempfile()?;
        for id in ids {
            writeln!(batch, "{id}")?;
        }
        batch.flush()?;
        let args: Vec<String> = vec![
            "-db".to_string(),
            db.display().to_string(),
            "-entry_batch".to_string(),
            batch.path().display().to_string(),
            "-outfmt".to_string(),
            ENTRY_FORMAT.to_string(),
        ];
        let output = self.run(&self.entry_executable, &args)?;
        Ok(parse_entries(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Attaches the parent entry to every hit. Entries that cannot be fetched
    /// are logged and left out.
    fn attach_parents(&self, db: &Path, found: &mut [Match]) {
        let ids: BTreeSet<&str> = found.iter().map(|m| m.entry.as_str()).collect();
        if ids.is_empty() {
            return;
        }
        let entries = match self.fetch_entries(db, &ids) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(db = %db.display(), "could not fetch parent entries: {e}");
                return;
            }
        };
        for m in found.iter_mut() {
            m.parent = entries.get(entry_key(&m.entry)).cloned();
        }
    }
}

fn database_reachable(db: &Path) -> bool {
    DATABASE_SUFFIXES.iter().any(|suffix| {
        let mut name = db.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name).exists()
    })
}

impl MatchSource for BlastMatchSource {
    fn search(&self, query: &str, databases: &[PathBuf]) -> Result<Vec<Match>, SearchError> {
        let reachable: Vec<&PathBuf> = databases
            .iter()
            .filter(|db| {
                let ok = database_reachable(db);
                if !ok {
                    warn!(db = %db.display(), "skipping unreachable database");
                }
                ok
            })
            .collect();
        if reachable.is_empty() {
            return Err(SearchError::NoDatabase(databases.to_vec()));
        }

        let query_file = tempfile::Builder::new()
            .prefix("gentle-query-")
            .suffix(".fa")
            .tempfile()?;
        write_fasta(query_file.as_file(), &[SequenceRecord::new("query", query)])
            .map_err(|e| SearchError::Io(std::io::Error::other(e.to_string())))?;

        let mut ret = vec![];
        for db in reachable {
            let mut found = self.search_database(query_file.path(), db)?;
            self.attach_parents(db, &mut found);
            debug!(db = %db.display(), hits = found.len(), "blastn finished");
            ret.extend(found);
        }
        info!(hits = ret.len(), "sequence search finished");
        Ok(ret)
    }
}

// blastdbcmd reports local ids with a `lcl|` prefix blastn leaves off
fn entry_key(id: &str) -> &str {
    id.strip_prefix("lcl|").unwrap_or(id)
}

/// Parses `blastdbcmd` output in [`ENTRY_FORMAT`], one `id sequence` line per
/// entry.
pub fn parse_entries(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(id, seq)| (entry_key(id).to_string(), seq.trim().to_string()))
        .filter(|(_, seq)| !seq.is_empty())
        .collect()
}

/// Parses tabular `blastn` output in the column order of [`OUTPUT_FORMAT`].
/// Offsets become 0-based; a subject running backwards marks a
/// reverse-strand hit.
pub fn parse_output(text: &str) -> Result<Vec<Match>, SearchError> {
    let mut ret = vec![];
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = |reason: String| SearchError::BadOutput {
            line: idx + 1,
            reason,
        };
        let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
        if cols.len() < OUTPUT_COLUMNS {
            return Err(bad(format!(
                "expected {OUTPUT_COLUMNS} columns, found {}",
                cols.len()
            )));
        }
        let number = |i: usize| -> Result<usize, SearchError> {
            cols[i]
                .parse::<usize>()
                .map_err(|e| bad(format!("column {}: '{}': {e}", i + 1, cols[i])))
        };
        let (qstart, qend) = (number(1)?, number(2)?);
        let (sstart, send) = (number(3)?, number(4)?);
        if qstart == 0 || qend == 0 {
            return Err(bad("query offsets are 1-based".to_string()));
        }
        ret.push(Match {
            entry: cols[0].to_string(),
            seq: cols[5].chars().filter(|c| *c != '-').collect(),
            start: qstart - 1,
            end: qend - 1,
            reverse_complement: sstart > send,
            mismatches: number(6)?,
            parent: None,
        });
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_output() {
        let text = "# BLASTN 2.12.0+\n\
                    gnl|addgene|107006\t11\t20\t1\t10\tACGT-ACGTAC\t0\n\
                    \n\
                    igem:BBa_K1\t5\t8\t40\t37\tGGCC\t1\n";
        let found = parse_output(text).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].entry, "gnl|addgene|107006");
        assert_eq!((found[0].start, found[0].end), (10, 19));
        assert_eq!(found[0].seq, "ACGTACGTAC");
        assert!(!found[0].reverse_complement);
        assert!(found[1].reverse_complement);
        assert_eq!(found[1].mismatches, 1);
    }

    #[test]
    fn test_parse_output_rejects_garbage() {
        assert!(matches!(
            parse_output("a\t1\t2\n"),
            Err(SearchError::BadOutput { line: 1, .. })
        ));
        assert!(matches!(
            parse_output("a\t1\tx\t1\t2\tAC\t0\n"),
            Err(SearchError::BadOutput { .. })
        ));
        assert!(parse_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_entries() {
        let text = "gnl|addgene|107006 ACGTACGTAC\nlcl|pSB1C3 GGCCTTAA\n\nbroken\n";
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["gnl|addgene|107006"], "ACGTACGTAC");
        assert_eq!(entries[entry_key("lcl|pSB1C3")], "GGCCTTAA");
        assert_eq!(entries.get("pSB1C3").map(String::as_str), Some("GGCCTTAA"));
    }

    #[test]
    fn test_missing_entry_tool_leaves_hits_alone() {
        let source = BlastMatchSource::default().with_entry_executable("gentle-no-such-blastdbcmd");
        let mut found = vec![Match::new("pSB1C3", "ACGT", 0, 3)];
        source.attach_parents(Path::new("/nonexistent/db"), &mut found);
        assert_eq!(found[0].parent, None);
    }

    #[test]
    fn test_missing_database() {
        let source = BlastMatchSource::with_executable("gentle-no-such-blastn");
        let err = source
            .search("ACGT", &[PathBuf::from("/nonexistent/db")])
            .unwrap_err();
        assert!(matches!(err, SearchError::NoDatabase(_)));
        assert!(matches!(
            source.search("ACGT", &[]),
            Err(SearchError::NoDatabase(_))
        ));
    }

    #[test]
    fn test_missing_executable() {
        let td = tempdir().unwrap();
        let db = td.path().join("parts");
        std::fs::write(td.path().join("parts.nsq"), b"").unwrap();
        let source = BlastMatchSource::with_executable("gentle-no-such-blastn");
        assert!(matches!(
            source.search("ACGT", &[db]),
            Err(SearchError::ToolNotFound { .. })
        ));
    }
}
