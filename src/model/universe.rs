use super::{CandidateDatabase, MetabolicModel, Reaction};
use crate::error::{GapxError, Result};
use crate::types::{EditState, Fingerprint};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a universe reaction comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneOrigin {
    Base,
    Database,
}

#[derive(Debug, Clone)]
pub struct UniverseEntry {
    pub reaction: Reaction,
    pub origin: GeneOrigin,
    /// Core reactions keep `Present` in every genome
    pub core: bool,
}

impl UniverseEntry {
    pub fn id(&self) -> &str {
        &self.reaction.id
    }

    /// State the unmodified base model implies for this reaction.
    pub fn default_state(&self) -> EditState {
        match self.origin {
            GeneOrigin::Base => EditState::Present,
            GeneOrigin::Database => EditState::Absent,
        }
    }

    /// State a toggled gene takes.
    pub fn toggled_state(&self) -> EditState {
        match self.origin {
            GeneOrigin::Base => EditState::Absent,
            GeneOrigin::Database => EditState::CandidateAdded,
        }
    }

    pub fn is_toggle_eligible(&self) -> bool {
        !self.core
    }

    pub fn allows(&self, state: EditState) -> bool {
        if self.core {
            return state == EditState::Present;
        }
        state == self.default_state() || state == self.toggled_state()
    }
}

/// Fixed, ordered set of reactions a genome assigns states to.
///
/// Base reactions come first in model order, followed by database reactions
/// in database order. The ordering never changes for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct CandidateUniverse {
    entries: Vec<UniverseEntry>,
    index: IndexMap<String, usize>,
    objective: usize,
    medium: Vec<String>,
    id: Fingerprint,
}

impl CandidateUniverse {
    pub fn build(model: &MetabolicModel, database: &CandidateDatabase) -> Result<Self> {
        model.validate()?;
        let core = model.core_set();

        let mut entries = Vec::with_capacity(model.reactions.len() + database.reactions.len());
        let mut index = IndexMap::new();

        for reaction in &model.reactions {
            index.insert(reaction.id.clone(), entries.len());
            entries.push(UniverseEntry {
                reaction: reaction.clone(),
                origin: GeneOrigin::Base,
                core: core.contains(reaction.id.as_str()),
            });
        }

        for reaction in &database.reactions {
            if index.contains_key(&reaction.id) {
                log::warn!(
                    "Database reaction {} already present in model {}, skipping",
                    reaction.id,
                    model.id
                );
                continue;
            }
            index.insert(reaction.id.clone(), entries.len());
            entries.push(UniverseEntry {
                reaction: reaction.clone(),
                origin: GeneOrigin::Database,
                core: false,
            });
        }

        let objective = *index.get(&model.objective).ok_or_else(|| {
            GapxError::Model(format!("Objective reaction {} not found", model.objective))
        })?;

        let id = Self::compute_id(&entries);
        let universe = Self {
            entries,
            index,
            objective,
            medium: model.medium.clone(),
            id,
        };
        log::debug!(
            "Candidate universe {}: {} genes, {} toggle-eligible",
            universe.id.short(),
            universe.len(),
            universe.toggle_eligible_count()
        );
        Ok(universe)
    }

    fn compute_id(entries: &[UniverseEntry]) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        for entry in entries {
            hasher.update(entry.id().as_bytes());
            hasher.update(&[0, entry.origin as u8, entry.core as u8]);
        }
        Fingerprint::from_hash(hasher.finalize())
    }

    pub fn id(&self) -> Fingerprint {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[UniverseEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> &UniverseEntry {
        &self.entries[index]
    }

    pub fn position(&self, reaction_id: &str) -> Option<usize> {
        self.index.get(reaction_id).copied()
    }

    pub fn objective_index(&self) -> usize {
        self.objective
    }

    pub fn medium(&self) -> &[String] {
        &self.medium
    }

    pub fn toggle_eligible_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_toggle_eligible()).count()
    }

    pub fn default_states(&self) -> Vec<EditState> {
        self.entries.iter().map(UniverseEntry::default_state).collect()
    }
}
