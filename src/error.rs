use thiserror::Error;

use crate::{matches::SearchError, primers::DesignError};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no usable fragment matches for {target}")]
    NoMatches { target: String },

    #[error("no valid {enzyme} cutsite in {fragment}: {reason}")]
    NoValidCutsite {
        fragment: String,
        enzyme: String,
        reason: String,
    },

    #[error("{sequence} is not a valid recognition sequence: {reason}")]
    InvalidRecognitionSyntax { sequence: String, reason: String },

    #[error("could not design primers for the {left}/{right} junction: {source}")]
    JunctionDesignFailed {
        left: String,
        right: String,
        #[source]
        source: DesignError,
    },

    #[error("no assembly of at most {max_fragments} fragments covers {target}")]
    NoCoveringAssembly {
        target: String,
        max_fragments: usize,
    },

    #[error("all {rejected} candidate assemblies for {target} were rejected, last: {reason}")]
    NoValidAssembly {
        target: String,
        rejected: usize,
        reason: String,
    },

    #[error("sequence search failed for {target}: {source}")]
    SearchToolError {
        target: String,
        #[source]
        source: SearchError,
    },

    #[error("primer design tool failed for {target}: {source}")]
    DesignToolError {
        target: String,
        #[source]
        source: DesignError,
    },

    #[error("{what} '{name}' not found")]
    NotFound { what: String, name: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Serde {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AssemblyError {
    /// Errors that end a planning run. Everything else invalidates a single
    /// candidate and is kept for diagnostics.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::JunctionDesignFailed { .. })
    }
}
