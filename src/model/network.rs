use super::universe::CandidateUniverse;
use indexmap::IndexSet;

#[derive(Debug, Clone)]
struct CompiledReaction {
    substrates: Vec<usize>,
    products: Vec<usize>,
    reversible: bool,
}

impl CompiledReaction {
    /// (inputs, outputs) for each direction the reaction may run in.
    fn directions(&self) -> impl Iterator<Item = (&[usize], &[usize])> {
        let forward = Some((self.substrates.as_slice(), self.products.as_slice()));
        let reverse = self
            .reversible
            .then_some((self.products.as_slice(), self.substrates.as_slice()));
        forward.into_iter().chain(reverse)
    }
}

/// Index-based view of the universe's stoichiometry.
///
/// Metabolite identifiers are interned once so that producibility and
/// consumption checks run over plain vectors.
#[derive(Debug, Clone)]
pub struct ReactionNetwork {
    metabolites: IndexSet<String>,
    reactions: Vec<CompiledReaction>,
    medium: Vec<usize>,
    objective: usize,
}

impl ReactionNetwork {
    pub fn compile(universe: &CandidateUniverse) -> Self {
        let mut metabolites = IndexSet::new();
        let mut intern = |id: &str| -> usize { metabolites.insert_full(id.to_string()).0 };

        let medium: Vec<usize> = universe.medium().iter().map(|m| intern(m.as_str())).collect();
        let reactions = universe
            .entries()
            .iter()
            .map(|entry| CompiledReaction {
                substrates: entry.reaction.substrates().map(&mut intern).collect(),
                products: entry.reaction.products().map(&mut intern).collect(),
                reversible: entry.reaction.is_reversible(),
            })
            .collect();

        Self {
            metabolites,
            reactions,
            medium,
            objective: universe.objective_index(),
        }
    }

    pub fn metabolite_count(&self) -> usize {
        self.metabolites.len()
    }

    pub fn metabolite_id(&self, index: usize) -> &str {
        &self.metabolites[index]
    }

    pub fn is_medium(&self, metabolite: usize) -> bool {
        self.medium.contains(&metabolite)
    }

    /// Metabolites consumed by the objective (biomass precursors).
    pub fn objective_substrates(&self) -> &[usize] {
        &self.reactions[self.objective].substrates
    }

    /// Fixpoint of metabolites producible from the medium using the
    /// reactions flagged in `active`.
    pub fn producible(&self, active: &[bool]) -> Vec<bool> {
        let mut producible = vec![false; self.metabolites.len()];
        for &m in &self.medium {
            producible[m] = true;
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (idx, reaction) in self.reactions.iter().enumerate() {
                if !active[idx] {
                    continue;
                }
                for (inputs, outputs) in reaction.directions() {
                    if inputs.iter().all(|&m| producible[m]) {
                        for &m in outputs {
                            if !producible[m] {
                                producible[m] = true;
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        producible
    }

    /// Outputs of every direction of `reaction` whose inputs are all producible.
    pub fn firing_outputs<'a>(
        &'a self,
        reaction: usize,
        producible: &'a [bool],
    ) -> impl Iterator<Item = usize> + 'a {
        self.reactions[reaction]
            .directions()
            .filter(move |(inputs, _)| inputs.iter().all(|&m| producible[m]))
            .flat_map(|(_, outputs)| outputs.iter().copied())
    }

    pub fn can_fire(&self, reaction: usize, producible: &[bool]) -> bool {
        self.reactions[reaction]
            .directions()
            .any(|(inputs, _)| inputs.iter().all(|&m| producible[m]))
    }

    /// Number of active reactions able to take each metabolite as an input.
    pub fn consumer_counts(&self, active: &[bool]) -> Vec<usize> {
        let mut counts = vec![0usize; self.metabolites.len()];
        for (idx, reaction) in self.reactions.iter().enumerate() {
            if !active[idx] {
                continue;
            }
            let mut seen: Vec<usize> = reaction.directions().flat_map(|(i, _)| i.iter().copied()).collect();
            seen.sort_unstable();
            seen.dedup();
            for m in seen {
                counts[m] += 1;
            }
        }
        counts
    }

    /// True when `reaction` itself is among the consumers of `metabolite`.
    pub fn consumes(&self, reaction: usize, metabolite: usize) -> bool {
        self.reactions[reaction]
            .directions()
            .any(|(inputs, _)| inputs.contains(&metabolite))
    }
}
