use crate::error::{GapxError, Result};
use crate::model::{CandidateUniverse, MetabolicModel};
use crate::types::{EditState, Fingerprint, ModelEdits};
use std::fmt;
use std::sync::Arc;

/// One edit state per universe reaction, in universe order. Immutable;
/// operators build new genomes and cloning only bumps two reference counts.
#[derive(Clone)]
pub struct Genome {
    universe: Arc<CandidateUniverse>,
    states: Arc<[EditState]>,
    fingerprint: Fingerprint,
}

impl Genome {
    /// The unmodified base model.
    pub fn base(universe: Arc<CandidateUniverse>) -> Self {
        let states = universe.default_states();
        Self::assemble(universe, states)
    }

    pub fn from_states(universe: Arc<CandidateUniverse>, states: Vec<EditState>) -> Result<Self> {
        if states.len() != universe.len() {
            return Err(GapxError::InvalidGenome(format!(
                "Genome has {} genes but universe {} has {}",
                states.len(),
                universe.id().short(),
                universe.len()
            )));
        }
        for (idx, (entry, state)) in universe.entries().iter().zip(&states).enumerate() {
            if !entry.allows(*state) {
                return Err(GapxError::InvalidGenome(format!(
                    "Gene {} ({}) cannot take state {:?}",
                    idx,
                    entry.id(),
                    state
                )));
            }
        }
        Ok(Self::assemble(universe, states))
    }

    /// Build from one toggle flag per gene; flags on core genes are ignored.
    pub fn from_toggles(universe: Arc<CandidateUniverse>, toggles: &[bool]) -> Result<Self> {
        if toggles.len() != universe.len() {
            return Err(GapxError::InvalidGenome(format!(
                "Toggle vector has {} entries but universe has {}",
                toggles.len(),
                universe.len()
            )));
        }
        let states = universe
            .entries()
            .iter()
            .zip(toggles)
            .map(|(entry, &toggled)| {
                if toggled && entry.is_toggle_eligible() {
                    entry.toggled_state()
                } else {
                    entry.default_state()
                }
            })
            .collect();
        Ok(Self::assemble(universe, states))
    }

    fn assemble(universe: Arc<CandidateUniverse>, states: Vec<EditState>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(universe.id().to_hex().as_bytes());
        let bytes: Vec<u8> = states.iter().map(|s| s.as_byte()).collect();
        hasher.update(&bytes);
        Self {
            universe,
            states: states.into(),
            fingerprint: Fingerprint::from_hash(hasher.finalize()),
        }
    }

    pub fn universe(&self) -> &Arc<CandidateUniverse> {
        &self.universe
    }

    pub fn same_universe(&self, other: &Genome) -> bool {
        self.universe.id() == other.universe.id()
    }

    pub fn states(&self) -> &[EditState] {
        &self.states
    }

    pub fn state(&self, index: usize) -> EditState {
        self.states[index]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn is_toggled(&self, index: usize) -> bool {
        self.states[index] != self.universe.entry(index).default_state()
    }

    pub fn toggles(&self) -> Vec<bool> {
        (0..self.len()).map(|i| self.is_toggled(i)).collect()
    }

    /// Reactions carrying flux capacity in the edited model.
    pub fn active_mask(&self) -> Vec<bool> {
        self.states.iter().map(|s| s.is_active()).collect()
    }

    pub fn additions(&self) -> usize {
        self.states.iter().filter(|s| **s == EditState::CandidateAdded).count()
    }

    pub fn deletions(&self) -> usize {
        self.universe
            .entries()
            .iter()
            .zip(self.states.iter())
            .filter(|(entry, state)| entry.default_state() == EditState::Present && **state == EditState::Absent)
            .count()
    }

    /// Number of genes whose state differs from `other`.
    pub fn distance(&self, other: &Genome) -> usize {
        self.states
            .iter()
            .zip(other.states.iter())
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Mutation distance from the unmodified base model.
    pub fn distance_from_base(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_toggled(i)).count()
    }

    /// Edit list in the form the simulation oracle consumes.
    pub fn edits(&self) -> ModelEdits {
        let mut edits = ModelEdits::default();
        for (entry, state) in self.universe.entries().iter().zip(self.states.iter()) {
            match (entry.default_state(), state) {
                (EditState::Absent, EditState::CandidateAdded) => edits.added.push(entry.id().to_string()),
                (EditState::Present, EditState::Absent) => edits.removed.push(entry.id().to_string()),
                _ => {}
            }
        }
        edits
    }

    /// The edited model: every active reaction of the universe, keeping the
    /// base objective, medium and core set.
    pub fn to_model(&self, id: impl Into<String>) -> MetabolicModel {
        let entries = self.universe.entries();
        MetabolicModel {
            id: id.into(),
            reactions: entries
                .iter()
                .zip(self.states.iter())
                .filter(|(_, state)| state.is_active())
                .map(|(entry, _)| entry.reaction.clone())
                .collect(),
            objective: entries[self.universe.objective_index()].id().to_string(),
            medium: self.universe.medium().to_vec(),
            core_reactions: entries.iter().filter(|e| e.core).map(|e| e.id().to_string()).collect(),
        }
    }

    /// One toggle bit per gene, least significant bit first, as lowercase hex.
    pub fn encode(&self) -> String {
        let mut bytes = vec![0u8; self.len().div_ceil(8)];
        for i in 0..self.len() {
            if self.is_toggled(i) {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn decode(universe: Arc<CandidateUniverse>, encoded: &str) -> Result<Self> {
        let expected = universe.len().div_ceil(8) * 2;
        if encoded.len() != expected {
            return Err(GapxError::InvalidGenome(format!(
                "Encoded genome has {} hex digits, expected {}",
                encoded.len(),
                expected
            )));
        }
        let mut toggles = vec![false; universe.len()];
        for (byte_idx, chunk) in encoded.as_bytes().chunks(2).enumerate() {
            let text = std::str::from_utf8(chunk)
                .map_err(|_| GapxError::InvalidGenome("Encoded genome is not ASCII".to_string()))?;
            let byte = u8::from_str_radix(text, 16)
                .map_err(|_| GapxError::InvalidGenome(format!("Invalid hex digits '{}'", text)))?;
            for bit in 0..8 {
                if byte & (1 << bit) == 0 {
                    continue;
                }
                let idx = byte_idx * 8 + bit;
                if idx >= universe.len() {
                    return Err(GapxError::InvalidGenome("Padding bits set in encoded genome".to_string()));
                }
                if !universe.entry(idx).is_toggle_eligible() {
                    return Err(GapxError::InvalidGenome(format!(
                        "Core reaction {} is toggled in encoded genome",
                        universe.entry(idx).id()
                    )));
                }
                toggles[idx] = true;
            }
        }
        Self::from_toggles(universe, &toggles)
    }
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.same_universe(other) && self.states == other.states
    }
}

impl Eq for Genome {}

impl fmt::Debug for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Genome({} +{} -{})",
            self.fingerprint.short(),
            self.additions(),
            self.deletions()
        )
    }
}
