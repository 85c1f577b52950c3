use crate::engines::generation::genome::Genome;
use crate::types::{ModelEdits, OracleResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Raw answer of the metabolic simulation collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub growth_rate: f64,
    pub feasible: bool,
    pub diagnostics: Vec<String>,
}

/// Failures the simulation collaborator may raise
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Infeasible problem: {0}")]
    Infeasible(String),

    #[error("Solver timed out after {0:?}")]
    SolverTimeout(Duration),

    #[error("Simulation failure: {0}")]
    Failure(String),
}

/// Capability interface to the metabolic simulation engine.
///
/// Implementations must be deterministic for a fixed edit list, or report a
/// `cache_salt` that changes whenever their internal randomness does.
pub trait MetabolicOracle: Send + Sync {
    fn simulate(&self, edits: &ModelEdits) -> Result<SimulationReport, SimulationError>;

    fn cache_salt(&self) -> Option<u64> {
        None
    }

    fn name(&self) -> &str {
        "oracle"
    }
}

/// Marshals genomes into edit lists and oracle answers into `OracleResponse`.
/// Collaborator failures never get past this point.
#[derive(Clone)]
pub struct OracleAdapter {
    oracle: Arc<dyn MetabolicOracle>,
}

impl OracleAdapter {
    pub fn new(oracle: Arc<dyn MetabolicOracle>) -> Self {
        Self { oracle }
    }

    pub fn cache_salt(&self) -> Option<u64> {
        self.oracle.cache_salt()
    }

    pub fn evaluate(&self, genome: &Genome) -> OracleResponse {
        let edits = genome.edits();
        match self.oracle.simulate(&edits) {
            Ok(report) => Self::translate(report),
            Err(err) => {
                log::debug!("{} rejected {:?}: {}", self.oracle.name(), genome, err);
                let tag = match &err {
                    SimulationError::Infeasible(_) => "infeasible",
                    SimulationError::SolverTimeout(_) => "solver_timeout",
                    SimulationError::Failure(_) => "simulation_failure",
                };
                OracleResponse::infeasible(vec![format!("{}: {}", tag, err)])
            }
        }
    }

    fn translate(report: SimulationReport) -> OracleResponse {
        if !report.growth_rate.is_finite() {
            let mut violated = report.diagnostics;
            violated.push("invalid_growth_rate".to_string());
            return OracleResponse::infeasible(violated);
        }
        OracleResponse {
            growth_rate: report.growth_rate.max(0.0),
            feasible: report.feasible,
            violated_constraints: if report.feasible { Vec::new() } else { report.diagnostics },
        }
    }
}
