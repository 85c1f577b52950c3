pub mod traits;
pub mod run;
pub mod evolution;
pub mod evaluation;
pub mod repair;
pub mod manager;

pub use manager::{RunConfig, ValidatedConfig};
pub use run::{ExportSection, ModelSection, RunSection};
pub use evolution::{AdaptiveMutationConfig, CrossoverMode, EvolutionConfig, InitPopulationConfig};
pub use evaluation::{EvaluationConfig, FitnessWeights};
pub use repair::RepairConfig;
pub use traits::ConfigSection;
