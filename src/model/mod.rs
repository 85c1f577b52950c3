pub mod network;
pub mod universe;

pub use network::ReactionNetwork;
pub use universe::{CandidateUniverse, GeneOrigin, UniverseEntry};

use crate::error::{GapxError, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_lower_bound() -> f64 {
    0.0
}

fn default_upper_bound() -> f64 {
    1000.0
}

/// A single biochemical reaction.
///
/// Negative stoichiometric coefficients mark substrates, positive ones
/// products. A reaction with a negative lower bound may run in reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub stoichiometry: IndexMap<String, f64>,
    #[serde(default = "default_lower_bound")]
    pub lower_bound: f64,
    #[serde(default = "default_upper_bound")]
    pub upper_bound: f64,
    #[serde(default)]
    pub subsystem: Option<String>,
}

impl Reaction {
    pub fn new(id: &str, stoichiometry: &[(&str, f64)]) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            stoichiometry: stoichiometry
                .iter()
                .map(|(met, coeff)| (met.to_string(), *coeff))
                .collect(),
            lower_bound: default_lower_bound(),
            upper_bound: default_upper_bound(),
            subsystem: None,
        }
    }

    pub fn with_bounds(mut self, lower_bound: f64, upper_bound: f64) -> Self {
        self.lower_bound = lower_bound;
        self.upper_bound = upper_bound;
        self
    }

    pub fn is_reversible(&self) -> bool {
        self.lower_bound < 0.0
    }

    pub fn substrates(&self) -> impl Iterator<Item = &str> {
        self.stoichiometry
            .iter()
            .filter(|(_, coeff)| **coeff < 0.0)
            .map(|(met, _)| met.as_str())
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.stoichiometry
            .iter()
            .filter(|(_, coeff)| **coeff > 0.0)
            .map(|(met, _)| met.as_str())
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GapxError::Model("Reaction id must not be empty".to_string()));
        }
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(GapxError::Model(format!(
                "Reaction {} has non-finite bounds",
                self.id
            )));
        }
        if self.lower_bound > self.upper_bound {
            return Err(GapxError::Model(format!(
                "Reaction {} has lower bound {} above upper bound {}",
                self.id, self.lower_bound, self.upper_bound
            )));
        }
        if self.stoichiometry.values().any(|c| !c.is_finite()) {
            return Err(GapxError::Model(format!(
                "Reaction {} has a non-finite stoichiometric coefficient",
                self.id
            )));
        }
        Ok(())
    }
}

/// The genome-scale model under curation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetabolicModel {
    pub id: String,
    pub reactions: Vec<Reaction>,
    /// Reaction whose flux stands for growth (biomass)
    pub objective: String,
    /// Metabolites the growth medium supplies
    pub medium: Vec<String>,
    /// Reactions that are never pruned; the objective is always one of them
    #[serde(default)]
    pub core_reactions: Vec<String>,
}

impl MetabolicModel {
    pub fn reaction(&self, id: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.id == id)
    }

    pub fn objective_reaction(&self) -> Result<&Reaction> {
        self.reaction(&self.objective).ok_or_else(|| {
            GapxError::Model(format!("Objective reaction {} not found", self.objective))
        })
    }

    /// Core set including the objective reaction.
    pub fn core_set(&self) -> IndexSet<&str> {
        let mut core: IndexSet<&str> = self.core_reactions.iter().map(String::as_str).collect();
        core.insert(self.objective.as_str());
        core
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = IndexSet::new();
        for reaction in &self.reactions {
            reaction.validate()?;
            if !seen.insert(reaction.id.as_str()) {
                return Err(GapxError::Model(format!(
                    "Duplicate reaction {} in model {}",
                    reaction.id, self.id
                )));
            }
        }
        self.objective_reaction()?;
        for core in &self.core_reactions {
            if !seen.contains(core.as_str()) {
                return Err(GapxError::Model(format!("Core reaction {} not found", core)));
            }
        }
        Ok(())
    }
}

/// Reactions eligible for gap-filling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateDatabase {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

/// Base model plus gap-filling database, as read from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model: MetabolicModel,
    #[serde(default)]
    pub database: CandidateDatabase,
}

impl ModelBundle {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GapxError::Model(format!("Failed to read model bundle {}: {}", path.display(), e))
        })?;
        let bundle: ModelBundle = serde_json::from_str(&contents).map_err(|e| {
            GapxError::Model(format!("Failed to parse model bundle {}: {}", path.display(), e))
        })?;
        bundle.validate()?;
        log::info!(
            "Loaded model {} ({} reactions) with {} database reactions",
            bundle.model.id,
            bundle.model.reactions.len(),
            bundle.database.reactions.len()
        );
        Ok(bundle)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        for reaction in &self.database.reactions {
            reaction.validate()?;
        }
        Ok(())
    }
}
