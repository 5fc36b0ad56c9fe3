//! Similarity-search hits and the contract of whatever produces them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// One hit of a reference entry against the tripled target.
///
/// `start`/`end` are 0-based, inclusive, on the tripled target. A hit on the
/// reverse strand may come back with `start > end`; the node builder
/// normalizes that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub entry: String,
    pub seq: String,
    pub start: usize,
    pub end: usize,
    pub reverse_complement: bool,
    pub mismatches: usize,
    /// The whole reference entry, when the source can provide it
    #[serde(default)]
    pub parent: Option<String>,
}

impl Match {
    pub fn new(entry: &str, seq: &str, start: usize, end: usize) -> Self {
        Self {
            entry: entry.to_string(),
            seq: seq.to_string(),
            start,
            end,
            reverse_complement: false,
            mismatches: 0,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Length of the span on the target.
    pub fn span_len(&self) -> usize {
        self.start.abs_diff(self.end) + 1
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no sequence database is reachable: {}", .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    NoDatabase(Vec<PathBuf>),

    #[error("could not find search executable '{executable}'")]
    ToolNotFound { executable: String },

    #[error("search command failed: {command} (status={status:?}, stderr='{stderr}')")]
    ToolFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("unreadable search output line {line}: {reason}")]
    BadOutput { line: usize, reason: String },

    #[error("search I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Finds candidate fragments for a target in reference databases.
///
/// Returns an empty list, not an error, when nothing matches.
pub trait MatchSource {
    fn search(&self, query: &str, databases: &[PathBuf]) -> Result<Vec<Match>, SearchError>;
}

/// A fixed list of matches, for callers that ran the search themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticMatchSource {
    matches: Vec<Match>,
}

impl StaticMatchSource {
    pub fn new(matches: Vec<Match>) -> Self {
        Self { matches }
    }
}

impl MatchSource for StaticMatchSource {
    fn search(&self, _query: &str, _databases: &[PathBuf]) -> Result<Vec<Match>, SearchError> {
        Ok(self.matches.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_len_either_orientation() {
        let mut m = Match::new("db:1", "ATGC", 10, 13);
        assert_eq!(m.span_len(), 4);
        m.start = 13;
        m.end = 10;
        assert_eq!(m.span_len(), 4);
    }

    #[test]
    fn test_no_database_message_lists_paths() {
        let err = SearchError::NoDatabase(vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(err.to_string(), "no sequence database is reachable: /a, /b");
    }
}
