pub mod cache;
pub mod fitness;
pub mod oracle;
pub mod orchestrator;
pub mod topology;

pub use cache::FitnessCache;
pub use fitness::FitnessEvaluator;
pub use oracle::{MetabolicOracle, OracleAdapter, SimulationError, SimulationReport};
pub use orchestrator::{
    CancellationToken, EvaluationOrchestrator, EvaluationStats, GenerationEvaluation, Incident,
    IncidentKind,
};
pub use topology::TopologyOracle;
