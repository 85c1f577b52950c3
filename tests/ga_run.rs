mod common;

use common::{RecordingCallback, ScriptedOracle, BASE_GROWTH};
use gapx::config::{EvaluationConfig, RepairConfig, RunConfig};
use gapx::engines::evaluation::{CancellationToken, FitnessEvaluator, MetabolicOracle, OracleAdapter};
use gapx::engines::generation::{
    ChannelProgressCallback, GaController, Genome, LogProgressCallback, ProgressMessage, RepairOperator,
    RunOutcome,
};
use gapx::error::EXIT_RUN_CANCELLED;
use gapx::manifest::RunManifest;
use gapx::model::ModelBundle;
use gapx::types::{EvaluationStatus, ModelEdits, TerminationReason, FITNESS_FLOOR};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

fn run_toy(config: RunConfig, bundle: &ModelBundle) -> (RunOutcome, Arc<ScriptedOracle>) {
    let (universe, network) = common::universe(bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network));
    let controller = common::controller(config, bundle, oracle.clone(), CancellationToken::new());
    let outcome = controller.run(LogProgressCallback).unwrap();
    (outcome, oracle)
}

#[test]
fn test_run_to_max_generations_writes_full_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);
    let (universe, network) = common::universe(&bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network));
    let controller = common::controller(common::config(dir.path()), &bundle, oracle.clone(), CancellationToken::new());

    let mut callback = RecordingCallback::default();
    let outcome = controller.run(&mut callback).unwrap();

    assert_eq!(outcome.termination, TerminationReason::MaxGenerations);
    assert!(!outcome.is_converged());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.generations_completed, 5);
    assert_eq!(callback.started, vec![0, 1, 2, 3, 4]);
    assert_eq!(callback.completed.len(), 5);
    assert_eq!(callback.terminated, Some((TerminationReason::MaxGenerations, 5)));

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert!(manifest.is_finalized());
    assert_eq!(manifest.header.seed, 42);
    assert_eq!(manifest.header.model_id, "toy_gap");
    assert_eq!(manifest.header.universe_size, 10);
    assert_eq!(manifest.header.toggle_eligible, 8);
    assert_eq!(manifest.header.config().unwrap().evolution.population_size, 20);
    assert!(manifest.header.started_at.is_none());

    let generations: Vec<usize> = manifest.generations.iter().map(|g| g.generation).collect();
    assert_eq!(generations, vec![0, 1, 2, 3, 4]);
    assert!(manifest.generations.iter().all(|g| g.wall_clock_ms.is_none()));
    assert_eq!(manifest.generations[0].operators.seeded, 20);
    assert!(manifest.generations[1..].iter().all(|g| g.operators.elites == 2));

    // the best fitness never drops while elites are carried over
    let trajectory = manifest.trajectory();
    for pair in trajectory.windows(2) {
        assert!(pair[1].1 >= pair[0].1);
    }

    let summary = manifest.summary.unwrap();
    assert_eq!(summary.termination, TerminationReason::MaxGenerations);
    assert_eq!(summary.generations_completed, 5);
    assert_eq!(summary.total_evaluations, 100);
    assert_eq!(summary.oracle_calls as usize, oracle.calls());
    assert_eq!(summary.oracle_calls + summary.cache_hits, summary.total_evaluations as u64);
    assert_eq!(summary.timeouts, 0);
    assert!(summary.total_wall_time_ms.is_none());
    assert!(!summary.hall_of_fame.is_empty());

    let best = summary.best_result.unwrap();
    assert_eq!(best.eval_wall_time_ms, 0.0);
    let decoded = Genome::decode(universe.clone(), &summary.best_genome.unwrap()).unwrap();
    assert_eq!(decoded.fingerprint(), best.fingerprint);
    assert_eq!(Some(decoded.edits()), summary.best_edits);
}

#[test]
fn test_same_seed_gives_identical_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);

    let (first, _) = run_toy(common::config(dir.path()), &bundle);
    let first_bytes = std::fs::read(&first.manifest_path).unwrap();
    let (second, _) = run_toy(common::config(dir.path()), &bundle);
    let second_bytes = std::fs::read(&second.manifest_path).unwrap();

    assert_eq!(first.manifest_path, second.manifest_path);
    assert!(!first_bytes.is_empty());
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn test_cancellation_between_generations() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);
    let (universe, network) = common::universe(&bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network));
    let cancel = CancellationToken::new();
    let mut config = common::config(dir.path());
    config.evolution.max_generations = 10;
    let controller = common::controller(config, &bundle, oracle, cancel.clone());

    let mut callback = RecordingCallback {
        cancel_after: Some((1, cancel)),
        ..Default::default()
    };
    let outcome = controller.run(&mut callback).unwrap();

    assert_eq!(outcome.termination, TerminationReason::Cancelled);
    assert!(!outcome.is_converged());
    assert_eq!(outcome.exit_code(), EXIT_RUN_CANCELLED);
    assert_eq!(outcome.generations_completed, 2);
    assert!(outcome.best.is_some());

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert_eq!(manifest.generations.len(), 2);
    assert_eq!(manifest.termination(), Some(&TerminationReason::Cancelled));
    assert!(!manifest.summary.unwrap().converged);
}

#[test]
fn test_cancelled_before_start_records_no_generation() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);
    let (universe, network) = common::universe(&bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network));
    let cancel = CancellationToken::new();
    let controller = common::controller(common::config(dir.path()), &bundle, oracle.clone(), cancel.clone());
    cancel.cancel();

    let outcome = controller.run(LogProgressCallback).unwrap();
    assert_eq!(outcome.termination, TerminationReason::Cancelled);
    assert_eq!(outcome.generations_completed, 0);
    assert_eq!(oracle.calls(), 0);

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert!(manifest.generations.is_empty());
    assert!(manifest.is_finalized());
}

#[test]
fn test_target_growth_fills_the_gap() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);
    let mut config = common::config(dir.path());
    config.evolution.max_generations = 40;
    config.evolution.target_growth = Some(0.5);

    let (outcome, _) = run_toy(config, &bundle);
    assert_eq!(outcome.termination, TerminationReason::TargetGrowthReached);
    assert!(outcome.is_converged());

    let best = outcome.best.unwrap();
    assert!(best.result.feasible);
    assert_eq!(best.result.growth_rate, BASE_GROWTH);
    let added = best.genome.edits().added;
    let has_short = added.iter().any(|r| r == "D_SHORT");
    let has_chain = added.iter().any(|r| r == "D_ACC") && added.iter().any(|r| r == "D_ACC_LIP");
    assert!(has_short || has_chain, "no lipid source in {:?}", added);
    // repair never leaves unreachable or dead-end additions behind
    assert!(!added.iter().any(|r| r == "D_ORPHAN" || r == "D_WASTE"));

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    let last = manifest.generations.last().unwrap();
    assert!(last.best_feasible);
    assert!(last.best_growth_rate >= 0.5);
}

#[test]
fn test_best_model_export_contains_the_filled_gap() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);
    let mut config = common::config(dir.path());
    config.evolution.max_generations = 40;
    config.evolution.target_growth = Some(0.5);
    config.export.best_model = Some("models/best.json".into());

    let (outcome, _) = run_toy(config, &bundle);
    let path = outcome.best_model_path.clone().unwrap();
    assert_eq!(path, dir.path().join("models/best.json"));

    let text = std::fs::read_to_string(&path).unwrap();
    let model: gapx::model::MetabolicModel = serde_json::from_str(&text).unwrap();
    assert!(model.validate().is_ok());
    assert_eq!(model.id, "toy_gap_gapx");
    assert_eq!(model.objective, "BIOMASS");

    let edits = outcome.best.unwrap().genome.edits();
    for added in &edits.added {
        assert!(model.reaction(added).is_some(), "{} missing from export", added);
    }
    for removed in &edits.removed {
        assert!(model.reaction(removed).is_none(), "{} still in export", removed);
    }
    assert!(model.reaction("R1").is_some());
    assert!(model.reaction("D_ORPHAN").is_none());
}

#[test]
fn test_no_export_unless_configured() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(true);
    let (outcome, _) = run_toy(common::config(dir.path()), &bundle);
    assert_eq!(outcome.best_model_path, None);
}

#[test]
fn test_stagnation_on_an_already_optimal_model() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(true);
    let mut config = common::config(dir.path());
    config.evolution.max_generations = 50;
    config.evolution.stagnation_window = 3;

    let (outcome, _) = run_toy(config, &bundle);
    assert_eq!(outcome.termination, TerminationReason::Stagnation);
    assert!(outcome.is_converged());
    // generation 0 sets the best, three more without improvement
    assert_eq!(outcome.generations_completed, 4);

    let best = outcome.best.unwrap();
    assert!(best.genome.edits().is_empty());
    assert_eq!(best.result.fitness, BASE_GROWTH);
}

#[test]
fn test_zero_epsilon_holding_the_optimum_is_not_stale() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(true);
    let mut config = common::config(dir.path());
    config.evolution.max_generations = 8;
    config.evolution.stagnation_window = 3;
    config.evolution.stagnation_epsilon = 0.0;

    let (outcome, _) = run_toy(config, &bundle);
    assert_eq!(outcome.termination, TerminationReason::MaxGenerations);
    assert_eq!(outcome.generations_completed, 8);
}

#[test]
fn test_base_genome_scores_like_the_unmodified_model() {
    let bundle = common::bundle(true);
    let (universe, network) = common::universe(&bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network));
    let reference = oracle.simulate(&ModelEdits::default()).unwrap();

    let evaluator = FitnessEvaluator::new(
        OracleAdapter::new(oracle.clone()),
        RepairOperator::new(network, RepairConfig::default()),
        &EvaluationConfig::default(),
        universe.toggle_eligible_count(),
    );
    let result = evaluator.score(&Genome::base(universe));

    assert!(result.feasible);
    assert_eq!(result.status, EvaluationStatus::Evaluated);
    assert_eq!(result.growth_rate, reference.growth_rate);
    assert_eq!(result.reaction_penalty, 0.0);
    assert_eq!(result.fitness, BASE_GROWTH);
}

#[test]
fn test_gapped_base_genome_reports_missing_precursor() {
    let bundle = common::bundle(false);
    let (universe, network) = common::universe(&bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network));
    let evaluator = FitnessEvaluator::new(
        OracleAdapter::new(oracle),
        RepairOperator::new(network, RepairConfig::default()),
        &EvaluationConfig::default(),
        universe.toggle_eligible_count(),
    );

    let result = evaluator.score(&Genome::base(universe));
    assert!(!result.feasible);
    assert_eq!(result.violated_constraints, vec!["precursor:lip".to_string()]);
    assert!(result.fitness < 0.0);
    assert!(result.fitness > FITNESS_FLOOR - 10.0);
}

#[test]
fn test_stalled_oracle_is_floored_after_one_retry() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(true);
    let (universe, network) = common::universe(&bundle);
    let oracle = Arc::new(ScriptedOracle::new(&universe, &network).stalling("R3", Duration::from_millis(300)));

    // base genome plus one genome with every eligible gene flipped
    let mut config = common::config(dir.path());
    config.evolution.population_size = 2;
    config.evolution.elitism_count = 0;
    config.evolution.tournament_size = 1;
    config.evolution.max_generations = 1;
    config.evolution.init.random_fraction = 1.0;
    config.evolution.init.random_toggle_probability = 1.0;
    config.evaluation.workers = 2;
    config.evaluation.task_timeout_ms = 40;
    let controller = common::controller(config, &bundle, oracle, CancellationToken::new());

    let outcome = controller.run(LogProgressCallback).unwrap();
    assert_eq!(outcome.termination, TerminationReason::MaxGenerations);
    let best = outcome.best.unwrap();
    assert!(best.result.feasible);
    assert!(best.genome.edits().is_empty());

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    let generation = &manifest.generations[0];
    assert_eq!(generation.evaluation.timeouts, 2);
    assert_eq!(generation.evaluation.retries, 1);
    assert_eq!(generation.incidents.len(), 2);
    assert!(generation.incidents.iter().all(|i| i.index == 1));
    assert_eq!(generation.incidents.iter().filter(|i| i.retried).count(), 1);
    assert_eq!(generation.fitness.worst, FITNESS_FLOOR);

    let summary = manifest.summary.unwrap();
    assert_eq!(summary.timeouts, 2);
    assert_eq!(summary.retries, 1);
}

#[test]
fn test_channel_progress_from_bundle_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = common::bundle(false);
    let bundle_path = dir.path().join("bundle.json");
    std::fs::write(&bundle_path, serde_json::to_string_pretty(&bundle).unwrap()).unwrap();

    let config_path = dir.path().join("run.toml");
    let output = dir.path().join("out");
    std::fs::write(
        &config_path,
        format!(
            r#"
            [run]
            name = "from_disk"
            seed = 11
            output_dir = '{}'
            record_timings = true

            [model]
            bundle = "bundle.json"

            [evolution]
            population_size = 10
            max_generations = 3

            [evaluation]
            workers = 2

            [export]
            best_model = "best_model.json"
            "#,
            output.display()
        ),
    )
    .unwrap();

    let config = RunConfig::load_from_file(&config_path).unwrap();
    assert_eq!(config.model.bundle, bundle_path);
    let loaded = ModelBundle::load_from_file(&config.model.bundle).unwrap();
    let controller = GaController::from_bundle(common::validated(config), &loaded).unwrap();

    let (tx, rx) = mpsc::channel();
    let outcome = controller.run(ChannelProgressCallback::new(tx)).unwrap();
    assert_eq!(outcome.manifest_path, output.join("manifest.jsonl"));

    let messages: Vec<ProgressMessage> = rx.try_iter().collect();
    assert_eq!(messages.len(), 7);
    assert_eq!(messages[0], ProgressMessage::GenerationStart(0));
    match &messages[1] {
        ProgressMessage::GenerationComplete(report) => {
            assert_eq!(report.generation, 0);
            assert_eq!(report.operators.seeded, 10);
            assert_eq!(report.operators.crossovers, 0);
            assert!(report.oracle_calls + report.cache_hits <= 10);
        }
        other => panic!("unexpected message {:?}", other),
    }
    match &messages[3] {
        ProgressMessage::GenerationComplete(report) => {
            assert_eq!(report.generation, 1);
            assert_eq!(report.operators.seeded, 0);
            assert_eq!(report.operators.elites, 2);
        }
        other => panic!("unexpected message {:?}", other),
    }
    assert_eq!(messages[4], ProgressMessage::GenerationStart(2));
    assert_eq!(
        messages[6],
        ProgressMessage::Terminated {
            reason: TerminationReason::MaxGenerations,
            generations: 3
        }
    );

    let manifest = RunManifest::load(&outcome.manifest_path).unwrap();
    assert_eq!(manifest.header.model_id, "toy_gap");
    assert_eq!(manifest.header.run_name, "from_disk");
    assert!(manifest.header.started_at.is_some());
    assert!(manifest.generations.iter().all(|g| g.wall_clock_ms.is_some()));
    assert_eq!(outcome.best_model_path, Some(output.join("best_model.json")));
}
