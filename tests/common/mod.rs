#![allow(dead_code)]

use gapx::config::{RunConfig, ValidatedConfig};
use gapx::engines::evaluation::{MetabolicOracle, SimulationError, SimulationReport, TopologyOracle};
use gapx::engines::generation::{GaController, GenerationReport, ProgressCallback};
use gapx::model::{CandidateDatabase, CandidateUniverse, MetabolicModel, ModelBundle, Reaction, ReactionNetwork};
use gapx::types::{ModelEdits, TerminationReason};
use gapx::engines::evaluation::CancellationToken;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Growth of the objective reaction when every precursor is reachable
pub const BASE_GROWTH: f64 = 0.8;

/// Toy model: glucose and ammonium feed a biomass reaction that also needs
/// lipid. With `complete` the base model makes lipid itself; without it the
/// lipid has to come from the database.
pub fn bundle(complete: bool) -> ModelBundle {
    let mut reactions = vec![
        Reaction::new("R1", &[("glc", -1.0), ("g6p", 1.0)]),
        Reaction::new("R2", &[("g6p", -1.0), ("pyr", 1.0)]),
        Reaction::new("R3", &[("pyr", -1.0), ("ac", 1.0)]),
        Reaction::new("R4", &[("pyr", -1.0), ("nh4", -1.0), ("ala", 1.0)]),
        Reaction::new("BIOMASS", &[("g6p", -1.0), ("ala", -1.0), ("lip", -1.0)]).with_bounds(0.0, BASE_GROWTH),
    ];
    if complete {
        reactions.push(Reaction::new("R5", &[("pyr", -1.0), ("lip", 1.0)]));
    }

    ModelBundle {
        model: MetabolicModel {
            id: if complete { "toy_complete" } else { "toy_gap" }.to_string(),
            reactions,
            objective: "BIOMASS".to_string(),
            medium: vec!["glc".to_string(), "nh4".to_string()],
            core_reactions: vec!["R1".to_string()],
        },
        database: CandidateDatabase {
            source: "toy".to_string(),
            reactions: vec![
                Reaction::new("D_SHORT", &[("pyr", -1.0), ("lip", 1.0)]),
                Reaction::new("D_ACC", &[("pyr", -1.0), ("acc", 1.0)]),
                Reaction::new("D_ACC_LIP", &[("acc", -1.0), ("lip", 1.0)]),
                Reaction::new("D_ORPHAN", &[("xyz", -1.0), ("lip", 1.0)]),
                Reaction::new("D_WASTE", &[("pyr", -1.0), ("waste", 1.0)]),
            ],
        },
    }
}

pub fn universe(bundle: &ModelBundle) -> (Arc<CandidateUniverse>, Arc<ReactionNetwork>) {
    let universe = Arc::new(CandidateUniverse::build(&bundle.model, &bundle.database).unwrap());
    let network = Arc::new(ReactionNetwork::compile(&universe));
    (universe, network)
}

/// Small, fast run writing into `output`, without timings so manifests
/// can be compared byte for byte.
pub fn config(output: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.run.name = "toy".to_string();
    config.run.seed = 42;
    config.run.output_dir = output.to_path_buf();
    config.run.record_timings = false;
    config.model.bundle = output.join("bundle.json");
    config.evolution.population_size = 20;
    config.evolution.elitism_count = 2;
    config.evolution.mutation_rate = 0.1;
    config.evolution.max_generations = 5;
    config.evolution.stagnation_window = 50;
    config.evaluation.workers = 4;
    config.evaluation.task_timeout_ms = 10_000;
    config
}

/// Topology oracle that counts its calls and can stall on chosen edits.
pub struct ScriptedOracle {
    inner: TopologyOracle,
    pub calls: AtomicUsize,
    stall_when_removed: Option<(&'static str, Duration)>,
}

impl ScriptedOracle {
    pub fn new(universe: &Arc<CandidateUniverse>, network: &Arc<ReactionNetwork>) -> Self {
        Self {
            inner: TopologyOracle::new(universe.clone(), network.clone()),
            calls: AtomicUsize::new(0),
            stall_when_removed: None,
        }
    }

    pub fn stalling(mut self, reaction: &'static str, delay: Duration) -> Self {
        self.stall_when_removed = Some((reaction, delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetabolicOracle for ScriptedOracle {
    fn simulate(&self, edits: &ModelEdits) -> Result<SimulationReport, SimulationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((reaction, delay)) = self.stall_when_removed {
            if edits.removed.iter().any(|r| r == reaction) {
                std::thread::sleep(delay);
            }
        }
        self.inner.simulate(edits)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn controller(
    config: RunConfig,
    bundle: &ModelBundle,
    oracle: Arc<ScriptedOracle>,
    cancel: CancellationToken,
) -> GaController {
    let (universe, network) = universe(bundle);
    GaController::with_cancellation(validated(config), universe, network, oracle, cancel)
        .unwrap()
        .with_model_id(bundle.model.id.clone())
}

pub fn validated(config: RunConfig) -> ValidatedConfig {
    config.validate().unwrap()
}

/// Records every callback and can pull the plug after a given generation.
#[derive(Default)]
pub struct RecordingCallback {
    pub started: Vec<usize>,
    pub completed: Vec<(usize, f64)>,
    pub reports: Vec<GenerationReport>,
    pub terminated: Option<(TerminationReason, usize)>,
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl ProgressCallback for RecordingCallback {
    fn on_generation_start(&mut self, generation: usize) {
        self.started.push(generation);
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        self.completed.push((report.generation, report.fitness.best));
        self.reports.push(report.clone());
        if let Some((after, token)) = &self.cancel_after {
            if report.generation >= *after {
                token.cancel();
            }
        }
    }

    fn on_terminated(&mut self, reason: &TerminationReason, generations: usize) {
        self.terminated = Some((reason.clone(), generations));
    }
}
