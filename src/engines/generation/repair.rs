use crate::config::RepairConfig;
use crate::engines::generation::genome::Genome;
use crate::model::ReactionNetwork;
use crate::types::EditState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    /// Already satisfied every rule
    Clean,
    /// Converged after reverting `removed` additions
    Repaired { removed: usize },
    /// No fixpoint within the pass budget; the genome is returned unmodified
    /// and must be rejected by the feasibility gate
    Unconverged,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub genome: Genome,
    pub status: RepairStatus,
    pub passes: usize,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        matches!(self.status, RepairStatus::Repaired { .. })
    }

    pub fn is_rejected(&self) -> bool {
        self.status == RepairStatus::Unconverged
    }
}

/// Reverts gap-filled reactions that cannot carry flux from the medium, or
/// (optionally) whose products nothing consumes. Base reactions are never
/// touched. Passes repeat until one changes nothing.
pub struct RepairOperator {
    network: Arc<ReactionNetwork>,
    config: RepairConfig,
}

impl RepairOperator {
    pub fn new(network: Arc<ReactionNetwork>, config: RepairConfig) -> Self {
        Self { network, config }
    }

    pub fn repair(&self, genome: &Genome) -> RepairOutcome {
        let mut states = genome.states().to_vec();
        let mut removed = 0;

        for pass in 1..=self.config.max_passes {
            let violations = self.violating_additions(&states);
            if violations.is_empty() {
                let status = if removed == 0 {
                    RepairStatus::Clean
                } else {
                    RepairStatus::Repaired { removed }
                };
                let repaired = if removed == 0 {
                    genome.clone()
                } else {
                    match Genome::from_states(genome.universe().clone(), states) {
                        Ok(g) => g,
                        Err(e) => {
                            log::error!("Repair produced an invalid genome: {}", e);
                            return self.unconverged(genome, pass);
                        }
                    }
                };
                return RepairOutcome {
                    genome: repaired,
                    status,
                    passes: pass,
                };
            }

            log::trace!(
                "Repair pass {} on {:?} reverts {} additions",
                pass,
                genome,
                violations.len()
            );
            for idx in violations {
                states[idx] = EditState::Absent;
                removed += 1;
            }
        }

        log::warn!(
            "Repair of {:?} did not converge within {} passes",
            genome,
            self.config.max_passes
        );
        self.unconverged(genome, self.config.max_passes)
    }

    fn unconverged(&self, genome: &Genome, passes: usize) -> RepairOutcome {
        RepairOutcome {
            genome: genome.clone(),
            status: RepairStatus::Unconverged,
            passes,
        }
    }

    /// Indices of gap-filled reactions breaking a connectivity rule.
    fn violating_additions(&self, states: &[EditState]) -> Vec<usize> {
        let active: Vec<bool> = states.iter().map(|s| s.is_active()).collect();
        let producible = self.network.producible(&active);
        let consumers = if self.config.prune_dead_ends {
            self.network.consumer_counts(&active)
        } else {
            Vec::new()
        };
        let precursors = self.network.objective_substrates();

        states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == EditState::CandidateAdded)
            .filter_map(|(idx, _)| {
                if !self.network.can_fire(idx, &producible) {
                    return Some(idx);
                }
                if !self.config.prune_dead_ends {
                    return None;
                }
                let mut outputs = self.network.firing_outputs(idx, &producible).peekable();
                if outputs.peek().is_none() {
                    // sinks and secretions consume by definition
                    return None;
                }
                let used = outputs.any(|m| {
                    let own = usize::from(self.network.consumes(idx, m));
                    precursors.contains(&m) || self.network.is_medium(m) || consumers[m] > own
                });
                (!used).then_some(idx)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateDatabase, CandidateUniverse, MetabolicModel, Reaction};
    use crate::engines::generation::operators::random_genome;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup(config: RepairConfig) -> (Arc<CandidateUniverse>, RepairOperator) {
        let model = MetabolicModel {
            id: "toy".to_string(),
            reactions: vec![
                Reaction::new("R1", &[("glc", -1.0), ("pyr", 1.0)]),
                Reaction::new("BIOMASS", &[("pyr", -1.0), ("lip", -1.0)]),
            ],
            objective: "BIOMASS".to_string(),
            medium: vec!["glc".to_string()],
            core_reactions: vec![],
        };
        let database = CandidateDatabase {
            source: "custom".to_string(),
            reactions: vec![
                Reaction::new("D_ACC", &[("pyr", -1.0), ("acc", 1.0)]),   // 2
                Reaction::new("D_LIP", &[("acc", -1.0), ("lip", 1.0)]),   // 3
                Reaction::new("D_ORPHAN", &[("xyz", -1.0), ("lip", 1.0)]), // 4
                Reaction::new("D_WASTE", &[("pyr", -1.0), ("waste", 1.0)]), // 5
                Reaction::new("D_CHAIN1", &[("glc", -1.0), ("m1", 1.0)]), // 6
                Reaction::new("D_CHAIN2", &[("m1", -1.0), ("m2", 1.0)]),  // 7
                Reaction::new("D_SINK", &[("waste", -1.0)]),              // 8
            ],
        };
        let universe = Arc::new(CandidateUniverse::build(&model, &database).unwrap());
        let network = Arc::new(ReactionNetwork::compile(&universe));
        (universe, RepairOperator::new(network, config))
    }

    fn with_additions(universe: &Arc<CandidateUniverse>, added: &[usize]) -> Genome {
        let mut toggles = vec![false; universe.len()];
        for &i in added {
            toggles[i] = true;
        }
        Genome::from_toggles(universe.clone(), &toggles).unwrap()
    }

    #[test]
    fn test_connected_pathway_is_clean() {
        let (u, op) = setup(RepairConfig::default());
        let genome = with_additions(&u, &[2, 3]);
        let outcome = op.repair(&genome);
        assert_eq!(outcome.status, RepairStatus::Clean);
        assert_eq!(outcome.genome, genome);
        assert_eq!(outcome.passes, 1);
    }

    #[test]
    fn test_unreachable_addition_is_reverted() {
        let (u, op) = setup(RepairConfig::default());
        let outcome = op.repair(&with_additions(&u, &[2, 3, 4]));
        assert_eq!(outcome.status, RepairStatus::Repaired { removed: 1 });
        assert_eq!(outcome.genome, with_additions(&u, &[2, 3]));
    }

    #[test]
    fn test_dead_end_chain_unwinds_over_passes() {
        let (u, op) = setup(RepairConfig::default());
        let outcome = op.repair(&with_additions(&u, &[6, 7]));
        // m2 is never consumed, then m1 loses its only consumer
        assert_eq!(outcome.status, RepairStatus::Repaired { removed: 2 });
        assert_eq!(outcome.passes, 3);
        assert_eq!(outcome.genome.additions(), 0);
    }

    #[test]
    fn test_sink_keeps_its_feeder() {
        let (u, op) = setup(RepairConfig::default());
        let genome = with_additions(&u, &[5, 8]);
        assert_eq!(op.repair(&genome).status, RepairStatus::Clean);
        let outcome = op.repair(&with_additions(&u, &[5]));
        assert_eq!(outcome.status, RepairStatus::Repaired { removed: 1 });
    }

    #[test]
    fn test_dead_ends_kept_when_rule_disabled() {
        let (u, op) = setup(RepairConfig {
            prune_dead_ends: false,
            ..Default::default()
        });
        let genome = with_additions(&u, &[6, 7]);
        assert_eq!(op.repair(&genome).status, RepairStatus::Clean);
    }

    #[test]
    fn test_pass_budget_exhaustion_returns_input() {
        let (u, op) = setup(RepairConfig {
            max_passes: 2,
            prune_dead_ends: true,
        });
        let genome = with_additions(&u, &[6, 7]);
        let outcome = op.repair(&genome);
        assert!(outcome.is_rejected());
        assert_eq!(outcome.genome, genome);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let (u, op) = setup(RepairConfig::default());
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..200 {
            let genome = random_genome(&u, 0.5, &mut rng).unwrap();
            let once = op.repair(&genome);
            let twice = op.repair(&once.genome);
            assert_eq!(twice.genome, once.genome);
            if !once.is_rejected() {
                assert_eq!(twice.status, RepairStatus::Clean);
            }
        }
    }

    #[test]
    fn test_base_reactions_never_touched() {
        let (u, op) = setup(RepairConfig::default());
        let mut toggles = vec![false; u.len()];
        toggles[0] = true; // prune R1, starving everything downstream
        toggles[2] = true;
        toggles[3] = true;
        let genome = Genome::from_toggles(u.clone(), &toggles).unwrap();
        let outcome = op.repair(&genome);
        assert_eq!(outcome.genome.state(0), EditState::Absent);
        assert_eq!(outcome.genome.additions(), 0);
    }
}
