use super::oracle::{MetabolicOracle, SimulationError, SimulationReport};
use crate::model::{CandidateUniverse, ReactionNetwork};
use crate::types::{EditState, ModelEdits};
use std::sync::Arc;

/// Solver-free oracle: the edited model grows at the objective's upper bound
/// when every objective substrate is producible from the medium.
pub struct TopologyOracle {
    universe: Arc<CandidateUniverse>,
    network: Arc<ReactionNetwork>,
}

impl TopologyOracle {
    pub fn new(universe: Arc<CandidateUniverse>, network: Arc<ReactionNetwork>) -> Self {
        Self { universe, network }
    }

    fn active_mask(&self, edits: &ModelEdits) -> Result<Vec<bool>, SimulationError> {
        let mut active: Vec<bool> = self
            .universe
            .entries()
            .iter()
            .map(|e| e.default_state() == EditState::Present)
            .collect();
        for (ids, value) in [(&edits.added, true), (&edits.removed, false)] {
            for id in ids {
                let idx = self.universe.position(id).ok_or_else(|| {
                    SimulationError::Failure(format!("Unknown reaction {} in edit list", id))
                })?;
                active[idx] = value;
            }
        }
        Ok(active)
    }
}

impl MetabolicOracle for TopologyOracle {
    fn simulate(&self, edits: &ModelEdits) -> Result<SimulationReport, SimulationError> {
        let active = self.active_mask(edits)?;
        let objective = self.universe.objective_index();
        if !active[objective] {
            return Err(SimulationError::Infeasible("objective reaction removed".to_string()));
        }

        let producible = self.network.producible(&active);
        let missing: Vec<String> = self
            .network
            .objective_substrates()
            .iter()
            .filter(|&&m| !producible[m])
            .map(|&m| format!("precursor:{}", self.network.metabolite_id(m)))
            .collect();

        if missing.is_empty() {
            Ok(SimulationReport {
                growth_rate: self.universe.entry(objective).reaction.upper_bound.max(0.0),
                feasible: true,
                diagnostics: Vec::new(),
            })
        } else {
            Ok(SimulationReport {
                growth_rate: 0.0,
                feasible: false,
                diagnostics: missing,
            })
        }
    }

    fn name(&self) -> &str {
        "topology"
    }
}
