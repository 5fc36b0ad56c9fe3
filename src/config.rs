use crate::error::AssemblyError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentsConfig {
    /// Shortest end-to-end overlap accepted as a homology junction
    pub min_homology: usize,
    pub max_homology: usize,
    /// Matches shorter than this are dropped before node construction
    pub min_match_length: usize,
}

impl Default for FragmentsConfig {
    fn default() -> Self {
        Self {
            min_homology: 20,
            max_homology: 120,
            min_match_length: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcrConfig {
    pub bp_cost: f64,
    /// Primer length assumed by the search cost model (both primers)
    pub primer_length: usize,
    pub reaction_cost: f64,
    /// Most bases a primer tail may add to a fragment end
    pub max_embed_length: usize,
    pub max_pair_penalty: f64,
    pub target_tm: f64,
    pub min_anneal_length: usize,
    pub max_anneal_length: usize,
    /// Seconds one external design call may take before the junction is
    /// given up
    pub tool_timeout_secs: u64,
}

impl Default for PcrConfig {
    fn default() -> Self {
        Self {
            bp_cost: 0.6,
            primer_length: 60,
            reaction_cost: 0.0,
            max_embed_length: 20,
            max_pair_penalty: 30.0,
            target_tm: 60.0,
            min_anneal_length: 18,
            max_anneal_length: 30,
            tool_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub bp_cost: f64,
    pub max_length: usize,
    pub min_length: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            bp_cost: 0.07,
            max_length: 1800,
            min_length: 125,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Overlap (bp) beyond which two nodes join on existing homology
    pub existing_homology_threshold: usize,
    /// Successors per node that may be reached by synthesis
    pub synthesis_hop_budget: usize,
    pub max_fragments: usize,
    pub max_paths_per_node: usize,
    pub max_solutions: usize,
    /// Searches to run while every candidate found is rejected
    pub max_search_rounds: usize,
    /// Worker threads for primer design, 0 = one per CPU
    pub workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            existing_homology_threshold: 20,
            synthesis_hop_budget: 2,
            max_fragments: 6,
            max_paths_per_node: 12,
            max_solutions: 5,
            max_search_rounds: 8,
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub drop_flagged: bool,
    pub inverted_repeat_stem: usize,
    pub off_target_max_mismatches: usize,
    pub off_target_exact_3prime: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            drop_flagged: false,
            inverted_repeat_stem: 10,
            off_target_max_mismatches: 1,
            off_target_exact_3prime: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Bases re-appended to a circular backbone so sites crossing the origin
    /// are found; also the shortest backbone accepted
    pub wrap_window: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self { wrap_window: 38 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub fragments: FragmentsConfig,
    pub pcr: PcrConfig,
    pub synthesis: SynthesisConfig,
    pub search: SearchConfig,
    pub validation: ValidationConfig,
    pub digest: DigestConfig,
}

impl AssemblyConfig {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, AssemblyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| AssemblyError::Io {
            context: format!("Could not read config file '{}'", path.display()),
            source: e,
        })?;
        let ret: Self = serde_json::from_str(&text).map_err(|e| AssemblyError::Serde {
            context: format!("Could not parse config JSON '{}'", path.display()),
            source: e,
        })?;
        ret.validate()?;
        Ok(ret)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), AssemblyError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|e| AssemblyError::Serde {
            context: "Could not serialize config".to_string(),
            source: e,
        })?;
        std::fs::write(path, text).map_err(|e| AssemblyError::Io {
            context: format!("Could not write config file '{}'", path.display()),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        let invalid = |message: String| Err(AssemblyError::InvalidInput { message });
        if self.fragments.min_homology == 0 {
            return invalid("fragments.min_homology must be positive".to_string());
        }
        if self.fragments.min_homology > self.fragments.max_homology {
            return invalid(format!(
                "fragments.min_homology ({}) exceeds fragments.max_homology ({})",
                self.fragments.min_homology, self.fragments.max_homology
            ));
        }
        if self.synthesis.max_length <= 2 * self.fragments.min_homology {
            return invalid(format!(
                "synthesis.max_length ({}) leaves no room between two {}bp homology arms",
                self.synthesis.max_length, self.fragments.min_homology
            ));
        }
        if self.synthesis.min_length > self.synthesis.max_length {
            return invalid("synthesis.min_length exceeds synthesis.max_length".to_string());
        }
        if self.pcr.min_anneal_length == 0
            || self.pcr.min_anneal_length > self.pcr.max_anneal_length
        {
            return invalid(format!(
                "pcr anneal length range {}..={} is empty",
                self.pcr.min_anneal_length, self.pcr.max_anneal_length
            ));
        }
        if self.search.max_fragments == 0 {
            return invalid("search.max_fragments must be positive".to_string());
        }
        if self.search.max_paths_per_node == 0
            || self.search.max_solutions == 0
            || self.search.max_search_rounds == 0
        {
            return invalid(
                "search.max_paths_per_node, search.max_solutions and search.max_search_rounds must be positive"
                    .to_string(),
            );
        }
        Ok(())
    }
}
