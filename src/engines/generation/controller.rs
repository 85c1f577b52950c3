use crate::config::ValidatedConfig;
use crate::engines::evaluation::{
    CancellationToken, EvaluationOrchestrator, EvaluationStats, FitnessEvaluator, GenerationEvaluation,
    MetabolicOracle, OracleAdapter, TopologyOracle,
};
use crate::engines::generation::{
    genome::Genome,
    hall_of_fame::{Elite, HallOfFame},
    operators::{crossover, mutate, perturb, random_genome},
    population::{Individual, Lineage, Origin, Population, PopulationManager},
    progress::GenerationReport,
    repair::{RepairOperator, RepairOutcome, RepairStatus},
};
use crate::error::{GapxError, Result, EXIT_RUN_CANCELLED, EXIT_RUN_FAILED};
use crate::manifest::{GenerationEntry, HallOfFameRecord, ManifestHeader, ManifestWriter, RunSummary};
use crate::model::{CandidateUniverse, ModelBundle, ReactionNetwork};
use crate::types::{EvaluationStatus, TerminationReason};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, report: &GenerationReport);
    fn on_terminated(&mut self, reason: &TerminationReason, generations: usize);
}

impl<C: ProgressCallback + ?Sized> ProgressCallback for &mut C {
    fn on_generation_start(&mut self, generation: usize) {
        (**self).on_generation_start(generation)
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        (**self).on_generation_complete(report)
    }

    fn on_terminated(&mut self, reason: &TerminationReason, generations: usize) {
        (**self).on_terminated(reason, generations)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Initializing,
    Evaluating,
    Selecting,
    Reproducing,
    Converged(TerminationReason),
    Terminated(TerminationReason),
}

/// How the individuals of one generation were produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub seeded: usize,
    pub elites: usize,
    pub crossovers: usize,
    pub clones: usize,
    pub mutated: usize,
    pub gene_flips: usize,
    pub repaired: usize,
    pub genes_reverted: usize,
    pub repair_rejected: usize,
}

impl OperatorStats {
    fn record_repair(&mut self, outcome: &RepairOutcome) {
        match outcome.status {
            RepairStatus::Clean => {}
            RepairStatus::Repaired { removed } => {
                self.repaired += 1;
                self.genes_reverted += removed;
            }
            RepairStatus::Unconverged => self.repair_rejected += 1,
        }
    }
}

/// What a finished run hands back to its caller
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub termination: TerminationReason,
    pub best: Option<Elite>,
    pub hall_of_fame: Vec<Elite>,
    pub generations_completed: usize,
    pub manifest_path: PathBuf,
    /// Where the best edited model was exported, if anywhere
    pub best_model_path: Option<PathBuf>,
}

impl RunOutcome {
    pub fn is_converged(&self) -> bool {
        self.termination.is_converged()
    }

    /// Process exit status for a run that returned normally.
    pub fn exit_code(&self) -> i32 {
        match self.termination {
            TerminationReason::Cancelled => EXIT_RUN_CANCELLED,
            TerminationReason::Failed(_) => EXIT_RUN_FAILED,
            _ => 0,
        }
    }
}

/// Mutable bookkeeping of one run
struct RunState {
    rng: StdRng,
    generation: usize,
    generations_completed: usize,
    best_so_far: Option<f64>,
    stale_generations: usize,
    mutation_rate: f64,
    operators: OperatorStats,
    totals: EvaluationStats,
    started: Instant,
}

/// Top-level GA state machine.
///
/// Drives `Initializing → Evaluating → Selecting → Reproducing → Evaluating`
/// until a termination criterion fires. The controller itself is strictly
/// sequential: a generation is fully evaluated (or timed out) before any
/// selection happens. The manifest entry of a generation is appended in
/// `Selecting`, right after ranking, so that the termination check always
/// sees a recorded generation.
pub struct GaController {
    config: ValidatedConfig,
    universe: Arc<CandidateUniverse>,
    repair: RepairOperator,
    orchestrator: EvaluationOrchestrator,
    hall_of_fame: HallOfFame,
    cancel: CancellationToken,
    model_id: String,
    state: ControllerState,
}

impl GaController {
    pub fn new(
        config: ValidatedConfig,
        universe: Arc<CandidateUniverse>,
        network: Arc<ReactionNetwork>,
        oracle: Arc<dyn MetabolicOracle>,
    ) -> Result<Self> {
        Self::with_cancellation(config, universe, network, oracle, CancellationToken::new())
    }

    pub fn with_cancellation(
        config: ValidatedConfig,
        universe: Arc<CandidateUniverse>,
        network: Arc<ReactionNetwork>,
        oracle: Arc<dyn MetabolicOracle>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if universe.toggle_eligible_count() == 0 {
            return Err(GapxError::Configuration(
                "Candidate universe has no toggle-eligible reactions".to_string(),
            ));
        }
        let repair = RepairOperator::new(Arc::clone(&network), config.repair.clone());
        let evaluator = FitnessEvaluator::new(
            OracleAdapter::new(oracle),
            RepairOperator::new(network, config.repair.clone()),
            &config.evaluation,
            universe.toggle_eligible_count(),
        );
        let orchestrator = EvaluationOrchestrator::new(
            Arc::new(evaluator),
            config.evaluation.workers,
            config.evaluation.task_timeout(),
            cancel.clone(),
        )?;

        Ok(Self {
            hall_of_fame: HallOfFame::new(config.evolution.hall_of_fame_size),
            model_id: String::new(),
            config,
            universe,
            repair,
            orchestrator,
            cancel,
            state: ControllerState::Initializing,
        })
    }

    /// Controller over a loaded bundle, scored by the built-in topology oracle.
    pub fn from_bundle(config: ValidatedConfig, bundle: &ModelBundle) -> Result<Self> {
        bundle.validate()?;
        let universe = Arc::new(CandidateUniverse::build(&bundle.model, &bundle.database)?);
        let network = Arc::new(ReactionNetwork::compile(&universe));
        let oracle = Arc::new(TopologyOracle::new(Arc::clone(&universe), Arc::clone(&network)));
        let mut controller = Self::new(config, universe, network, oracle)?;
        controller.model_id = bundle.model.id.clone();
        Ok(controller)
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn universe(&self) -> &Arc<CandidateUniverse> {
        &self.universe
    }

    fn transition(&mut self, next: ControllerState) {
        log::debug!("Controller {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the GA to termination. The manifest is finalized on every exit
    /// path, including fatal errors.
    pub fn run<C: ProgressCallback>(mut self, mut callback: C) -> Result<RunOutcome> {
        let manifest_path = self.config.run.manifest_path();
        let mut writer = ManifestWriter::create(&manifest_path, self.config.run.record_timings)?;
        let mut run = RunState {
            rng: StdRng::seed_from_u64(self.config.run.seed),
            generation: 0,
            generations_completed: 0,
            best_so_far: None,
            stale_generations: 0,
            mutation_rate: self.config.evolution.mutation_rate,
            operators: OperatorStats::default(),
            totals: EvaluationStats::default(),
            started: Instant::now(),
        };

        log::info!(
            "Starting run '{}' (seed {}, {} genes, {} toggle-eligible)",
            self.config.run.name,
            self.config.run.seed,
            self.universe.len(),
            self.universe.toggle_eligible_count()
        );

        let driven = self
            .write_header(&mut writer)
            .and_then(|()| self.drive(&mut writer, &mut run, &mut callback));
        let reason = match driven {
            Ok(reason) => reason,
            Err(err) => {
                log::error!("Run failed: {}", err);
                let reason = TerminationReason::Failed(err.to_string());
                self.transition(ControllerState::Terminated(reason.clone()));
                if let Err(finalize_err) = self.finalize(&mut writer, &run, &reason) {
                    log::error!("Could not finalize manifest: {}", finalize_err);
                }
                callback.on_terminated(&reason, run.generations_completed);
                return Err(err);
            }
        };

        self.finalize(&mut writer, &run, &reason)?;
        let best_model_path = self.export_best_model()?;
        callback.on_terminated(&reason, run.generations_completed);

        Ok(RunOutcome {
            best: self.hall_of_fame.best().cloned(),
            hall_of_fame: self.hall_of_fame.get_all().to_vec(),
            generations_completed: run.generations_completed,
            manifest_path,
            best_model_path,
            termination: reason,
        })
    }

    fn drive<C: ProgressCallback>(
        &mut self,
        writer: &mut ManifestWriter,
        run: &mut RunState,
        callback: &mut C,
    ) -> Result<TerminationReason> {
        let mut manager: Option<PopulationManager> = None;
        let mut evaluation: Option<GenerationEvaluation> = None;
        let mut generation_started = Instant::now();

        loop {
            match self.state.clone() {
                ControllerState::Initializing => {
                    let initial = self.initial_population(run)?;
                    manager = Some(PopulationManager::new(
                        initial,
                        self.config.evolution.tournament_size,
                        self.config.evolution.elitism_count,
                    )?);
                    self.transition(ControllerState::Evaluating);
                }
                ControllerState::Evaluating => {
                    let manager = manager.as_mut().ok_or_else(not_initialized)?;
                    generation_started = Instant::now();
                    callback.on_generation_start(run.generation);

                    let genomes = manager.current().genomes();
                    let result = self.orchestrator.evaluate_generation(&genomes)?;
                    accumulate(&mut run.totals, &result.stats);

                    if result.cancelled {
                        for (genome, fitness) in genomes.iter().zip(&result.results) {
                            if matches!(fitness.status, EvaluationStatus::Evaluated | EvaluationStatus::Infeasible) {
                                self.hall_of_fame.try_add(genome, fitness, run.generation);
                            }
                        }
                        log::warn!("Run cancelled while evaluating generation {}", run.generation);
                        self.transition(ControllerState::Terminated(TerminationReason::Cancelled));
                        continue;
                    }

                    manager.record_results(result.results.clone())?;
                    evaluation = Some(result);
                    self.transition(ControllerState::Selecting);
                }
                ControllerState::Selecting => {
                    let manager = manager.as_ref().ok_or_else(not_initialized)?;
                    let result = evaluation.take().ok_or_else(not_initialized)?;
                    let entry = self.select(manager, run, result, generation_started)?;
                    let report = GenerationReport::new(&entry, self.hall_of_fame.len());
                    writer.append_generation(entry)?;
                    run.generations_completed += 1;
                    callback.on_generation_complete(&report);

                    let next = match self.check_termination(manager, run) {
                        Some(reason) if reason.is_converged() => ControllerState::Converged(reason),
                        Some(reason) => ControllerState::Terminated(reason),
                        None => ControllerState::Reproducing,
                    };
                    self.transition(next);
                }
                ControllerState::Reproducing => {
                    let manager = manager.as_mut().ok_or_else(not_initialized)?;
                    let next = self.reproduce(manager, run)?;
                    manager.advance(next)?;
                    run.generation += 1;
                    self.transition(ControllerState::Evaluating);
                }
                ControllerState::Converged(reason) | ControllerState::Terminated(reason) => {
                    return Ok(reason);
                }
            }
        }
    }

    fn write_header(&self, writer: &mut ManifestWriter) -> Result<()> {
        let config: &crate::config::RunConfig = &self.config;
        writer.write_header(ManifestHeader {
            run_name: self.config.run.name.clone(),
            seed: self.config.run.seed,
            model_id: self.model_id.clone(),
            universe_id: self.universe.id(),
            universe_size: self.universe.len(),
            toggle_eligible: self.universe.toggle_eligible_count(),
            config: serde_json::to_value(config)?,
            started_at: Some(chrono::Utc::now().to_rfc3339()),
        })
    }

    fn initial_population(&self, run: &mut RunState) -> Result<Population> {
        let n = self.config.evolution.population_size;
        let init = &self.config.evolution.init;
        let base = Genome::base(Arc::clone(&self.universe));

        let mut seeds: Vec<(Genome, Origin)> = Vec::with_capacity(n);
        if init.include_base_genome {
            seeds.push((base.clone(), Origin::Base));
        }
        let remaining = n - seeds.len();
        let random_count = (remaining as f64 * init.random_fraction).round() as usize;
        for i in 0..remaining {
            if i < random_count {
                seeds.push((
                    random_genome(&self.universe, init.random_toggle_probability, &mut run.rng)?,
                    Origin::Random,
                ));
            } else {
                seeds.push((perturb(&base, init.conservative_flip_rate, &mut run.rng)?, Origin::Conservative));
            }
        }

        let mut stats = OperatorStats {
            seeded: seeds.len(),
            ..Default::default()
        };
        let outcomes = self.repair_all(seeds.iter().map(|(g, _)| g.clone()).collect());
        let individuals = outcomes
            .into_iter()
            .zip(seeds)
            .map(|(outcome, (_, origin))| {
                stats.record_repair(&outcome);
                Individual::new(outcome.genome, Lineage::seed(origin))
            })
            .collect();

        run.operators = stats;
        log::debug!("Initial population of {} built", n);
        Ok(Population::new(0, individuals))
    }

    /// Repair in parallel; output order matches input order.
    fn repair_all(&self, genomes: Vec<Genome>) -> Vec<RepairOutcome> {
        let repair = &self.repair;
        genomes.par_iter().map(|g| repair.repair(g)).collect()
    }

    fn select(
        &mut self,
        manager: &PopulationManager,
        run: &mut RunState,
        evaluation: GenerationEvaluation,
        generation_started: Instant,
    ) -> Result<GenerationEntry> {
        let population = manager.current();
        let ranking = population.ranking();
        let best_idx = *ranking.first().ok_or_else(not_initialized)?;
        let best = population.individual(best_idx);
        let best_result = best.fitness.clone().ok_or_else(not_initialized)?;

        for &idx in &ranking {
            let individual = population.individual(idx);
            if let Some(result) = &individual.fitness {
                self.hall_of_fame.try_add(&individual.genome, result, run.generation);
            }
        }

        let summary = population.summary();
        let improved = match run.best_so_far {
            None => true,
            Some(previous) => is_improvement(summary.best, previous, self.config.evolution.stagnation_epsilon),
        };
        if improved {
            run.best_so_far = Some(summary.best);
            run.stale_generations = 0;
        } else {
            run.stale_generations += 1;
        }

        log::info!(
            "Generation {}: best={:.6} mean={:.6e} worst={:.6e} feasible={}/{} incidents={}",
            run.generation,
            summary.best,
            summary.mean,
            summary.worst,
            summary.feasible,
            population.len(),
            evaluation.incidents.len()
        );

        let entry = GenerationEntry {
            generation: run.generation,
            fitness: summary,
            best_fingerprint: best_result.fingerprint,
            best_growth_rate: best_result.growth_rate,
            best_feasible: best_result.feasible,
            mutation_rate: run.mutation_rate,
            diversity: population.diversity(),
            operators: std::mem::take(&mut run.operators),
            evaluation: evaluation.stats,
            incidents: evaluation.incidents,
            wall_clock_ms: Some(generation_started.elapsed().as_secs_f64() * 1000.0),
        };

        self.adapt_mutation_rate(run, improved);
        Ok(entry)
    }

    fn adapt_mutation_rate(&self, run: &mut RunState, improved: bool) {
        let adaptive = &self.config.evolution.adaptive_mutation;
        if !adaptive.enabled {
            return;
        }
        if improved {
            run.mutation_rate = self.config.evolution.mutation_rate;
        } else if run.stale_generations > 0 && run.stale_generations % adaptive.window == 0 {
            let raised = (run.mutation_rate * adaptive.scale_up).min(adaptive.max_rate);
            if raised > run.mutation_rate {
                log::debug!("Raising mutation rate {:.4} -> {:.4}", run.mutation_rate, raised);
                run.mutation_rate = raised;
            }
        }
    }

    fn check_termination(&self, manager: &PopulationManager, run: &RunState) -> Option<TerminationReason> {
        let evolution = &self.config.evolution;
        if self.cancel.is_cancelled() {
            return Some(TerminationReason::Cancelled);
        }
        if let (Some(target), Some(best)) = (evolution.target_growth, manager.current().best()) {
            let reached = best
                .fitness
                .as_ref()
                .map_or(false, |r| r.feasible && r.growth_rate >= target);
            if reached {
                return Some(TerminationReason::TargetGrowthReached);
            }
        }
        if run.generations_completed >= evolution.max_generations {
            return Some(TerminationReason::MaxGenerations);
        }
        if run.stale_generations >= evolution.stagnation_window {
            return Some(TerminationReason::Stagnation);
        }
        None
    }

    fn reproduce(&self, manager: &PopulationManager, run: &mut RunState) -> Result<Population> {
        let evolution = &self.config.evolution;
        let n = manager.population_size();
        let elites = manager.elites();
        let needed = n - elites.len();
        let k = needed + needed % 2;
        let parents = manager.select_parents(k, &mut run.rng);

        let mut stats = OperatorStats {
            elites: elites.len(),
            ..Default::default()
        };
        let mut offspring: Vec<(Genome, Lineage)> = Vec::with_capacity(k);
        for pair in parents.chunks(2) {
            let [(ia, a), (ib, b)] = pair else {
                return Err(GapxError::InvalidGenome("Parent pool has an odd size".to_string()));
            };
            let (child_a, child_b, lineage_a, lineage_b) = if run.rng.gen::<f64>() < evolution.crossover_rate {
                let (ca, cb) = crossover(a, b, &evolution.crossover, &mut run.rng)?;
                stats.crossovers += 1;
                let lineage = Lineage {
                    origin: Origin::Crossover,
                    parents: vec![*ia, *ib],
                };
                (ca, cb, lineage.clone(), lineage)
            } else {
                stats.clones += 1;
                (
                    a.clone(),
                    b.clone(),
                    Lineage {
                        origin: Origin::Clone,
                        parents: vec![*ia],
                    },
                    Lineage {
                        origin: Origin::Clone,
                        parents: vec![*ib],
                    },
                )
            };
            for (child, lineage) in [(child_a, lineage_a), (child_b, lineage_b)] {
                let (mutated, flips) = mutate(&child, run.mutation_rate, &mut run.rng)?;
                if flips > 0 {
                    stats.mutated += 1;
                    stats.gene_flips += flips;
                }
                offspring.push((mutated, lineage));
            }
        }
        offspring.truncate(needed);

        let outcomes = self.repair_all(offspring.iter().map(|(g, _)| g.clone()).collect());
        let mut individuals: Vec<Individual> = elites
            .into_iter()
            .map(|(idx, genome)| {
                Individual::new(
                    genome,
                    Lineage {
                        origin: Origin::Elite,
                        parents: vec![idx],
                    },
                )
            })
            .collect();
        for (outcome, (_, lineage)) in outcomes.into_iter().zip(offspring) {
            stats.record_repair(&outcome);
            individuals.push(Individual::new(outcome.genome, lineage));
        }

        log::debug!(
            "Generation {} bred: {} crossovers, {} clones, {} genes flipped, {} repaired",
            run.generation + 1,
            stats.crossovers,
            stats.clones,
            stats.gene_flips,
            stats.repaired
        );
        run.operators = stats;
        Ok(Population::new(run.generation + 1, individuals))
    }

    /// Write the best edited model as JSON when `export.best_model` is set.
    fn export_best_model(&self) -> Result<Option<PathBuf>> {
        let path = match self.config.export.best_model_path(&self.config.run) {
            Some(path) => path,
            None => return Ok(None),
        };
        let best = match self.hall_of_fame.best() {
            Some(best) => best,
            None => {
                log::warn!("No evaluated genome to export to {}", path.display());
                return Ok(None);
            }
        };

        let base_id = if self.model_id.is_empty() {
            self.config.run.name.as_str()
        } else {
            self.model_id.as_str()
        };
        let model = best.genome.to_model(format!("{}_gapx", base_id));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&model)?)?;
        log::info!(
            "Exported best model ({} reactions) to {}",
            model.reactions.len(),
            path.display()
        );
        Ok(Some(path))
    }

    fn finalize(&mut self, writer: &mut ManifestWriter, run: &RunState, reason: &TerminationReason) -> Result<()> {
        if writer.is_finalized() {
            return Ok(());
        }
        let best = self.hall_of_fame.best();
        let hall_of_fame = self
            .hall_of_fame
            .get_all()
            .iter()
            .map(|elite| HallOfFameRecord {
                fingerprint: elite.result.fingerprint,
                genome: elite.genome.encode(),
                fitness: elite.result.fitness,
                growth_rate: elite.result.growth_rate,
                feasible: elite.result.feasible,
                additions: elite.genome.additions(),
                deletions: elite.genome.deletions(),
                generation: elite.generation,
            })
            .collect();

        let summary = RunSummary {
            seed: self.config.run.seed,
            termination: reason.clone(),
            converged: reason.is_converged(),
            generations_completed: run.generations_completed,
            best_genome: best.map(|e| e.genome.encode()),
            best_edits: best.map(|e| e.genome.edits()),
            best_result: best.map(|e| e.result.clone()),
            total_evaluations: run.totals.submitted,
            oracle_calls: run.totals.oracle_calls,
            cache_hits: run.totals.cache_hits,
            retries: run.totals.retries,
            timeouts: run.totals.timeouts,
            worker_failures: run.totals.worker_failures,
            hall_of_fame,
            total_wall_time_ms: Some(run.started.elapsed().as_secs_f64() * 1000.0),
            finished_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        writer.finalize(summary)?;

        match best {
            Some(elite) => log::info!(
                "Run ended ({}) after {} generations; best fitness {:.6}, growth {:.6}, {} additions, {} deletions",
                reason,
                run.generations_completed,
                elite.result.fitness,
                elite.result.growth_rate,
                elite.genome.additions(),
                elite.genome.deletions()
            ),
            None => log::info!("Run ended ({}) before any genome was evaluated", reason),
        }
        Ok(())
    }
}

fn accumulate(totals: &mut EvaluationStats, stats: &EvaluationStats) {
    totals.submitted += stats.submitted;
    totals.oracle_calls += stats.oracle_calls;
    totals.cache_hits += stats.cache_hits;
    totals.retries += stats.retries;
    totals.timeouts += stats.timeouts;
    totals.worker_failures += stats.worker_failures;
    totals.skipped += stats.skipped;
}

/// A generation is stale when the best fitness gained less than `epsilon`.
fn is_improvement(best: f64, previous: f64, epsilon: f64) -> bool {
    best - previous >= epsilon
}

fn not_initialized() -> GapxError {
    GapxError::InvalidGenome("Controller state reached before the population exists".to_string())
}
