pub mod controller;
pub mod genome;
pub mod hall_of_fame;
pub mod operators;
pub mod population;
pub mod progress;
pub mod repair;

pub use controller::{ControllerState, GaController, OperatorStats, ProgressCallback, RunOutcome};
pub use genome::Genome;
pub use hall_of_fame::{Elite, HallOfFame};
pub use population::{DiversityStats, FitnessSummary, Individual, Lineage, Origin, Population, PopulationManager};
pub use progress::{ChannelProgressCallback, GenerationReport, LogProgressCallback, ProgressMessage};
pub use repair::{RepairOperator, RepairOutcome, RepairStatus};
