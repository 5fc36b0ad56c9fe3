//! Machine-readable contracts for assembly plans.
//!
//! These types are what the planner hands to writers and what downstream
//! tools read back. They carry no behavior beyond JSON persistence.

use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path};

pub const PLAN_SCHEMA: &str = "gentle.assembly_plan.v1";

/// How a concrete fragment is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildKind {
    Existing,
    Pcr,
    Synthetic,
    LinearizedBackbone,
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Existing => "existing",
            Self::Pcr => "pcr",
            Self::Synthetic => "synthetic",
            Self::LinearizedBackbone => "linearized-backbone",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerRecord {
    pub sequence: String,
    /// Melting temperature of the annealing part only
    pub tm: f64,
    pub penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerPairRecord {
    pub forward: PrimerRecord,
    pub reverse: PrimerRecord,
    pub penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub id: String,
    pub sequence: String,
    pub kind: BuildKind,
    /// Inclusive span on the target, may run past the target length when
    /// the fragment crosses the origin.
    pub start: usize,
    pub end: usize,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primers: Option<PrimerPairRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRecord {
    pub rank: usize,
    pub fragment_count: usize,
    pub total_cost: f64,
    pub primer_penalty: f64,
    #[serde(default)]
    pub flags: Vec<String>,
    pub fragments: Vec<FragmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackboneRecord {
    pub id: String,
    /// Backbone sequence before linearization
    pub sequence: String,
    pub enzyme: String,
    pub recognition_index: usize,
    pub forward: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAssembly {
    pub node_ids: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub schema: String,
    pub target_id: String,
    pub target_sequence: String,
    pub target_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backbone: Option<BackboneRecord>,
    pub assemblies: Vec<AssemblyRecord>,
    #[serde(default)]
    pub rejected: Vec<RejectedAssembly>,
}

#[derive(Debug)]
pub enum ProtocolError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "plan I/O failed: {e}"),
            Self::Json(e) => write!(f, "plan JSON is invalid: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Json(err)
    }
}

impl PlanOutput {
    pub fn new(target_id: &str, target_sequence: &str) -> Self {
        Self {
            schema: PLAN_SCHEMA.to_string(),
            target_id: target_id.to_string(),
            target_sequence: target_sequence.to_string(),
            target_length: target_sequence.len(),
            backbone: None,
            assemblies: vec![],
            rejected: vec![],
        }
    }

    pub fn best(&self) -> Option<&AssemblyRecord> {
        self.assemblies.first()
    }

    pub fn to_json_pretty(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ProtocolError> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
