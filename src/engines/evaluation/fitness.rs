use super::cache::{Claim, FitnessCache};
use super::oracle::OracleAdapter;
use crate::config::{EvaluationConfig, FitnessWeights};
use crate::engines::generation::genome::Genome;
use crate::engines::generation::repair::RepairOperator;
use crate::types::{
    EvaluationStatus, Fingerprint, FitnessResult, OracleResponse, FEASIBLE_FITNESS_MIN, FITNESS_FLOOR,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Scores genomes: repair, oracle call and weighted-sum scalarization,
/// memoized per fingerprint for the lifetime of a run.
pub struct FitnessEvaluator {
    adapter: OracleAdapter,
    repair: RepairOperator,
    cache: FitnessCache,
    weights: FitnessWeights,
    penalty_scale: f64,
    oracle_calls: AtomicU64,
    repair_rejections: AtomicU64,
}

impl FitnessEvaluator {
    pub fn new(
        adapter: OracleAdapter,
        repair: RepairOperator,
        config: &EvaluationConfig,
        toggle_eligible: usize,
    ) -> Self {
        let penalty_scale = if config.normalize_penalty {
            1.0 / toggle_eligible.max(1) as f64
        } else {
            1.0
        };
        Self {
            adapter,
            repair,
            cache: FitnessCache::new(),
            weights: config.weights.clone(),
            penalty_scale,
            oracle_calls: AtomicU64::new(0),
            repair_rejections: AtomicU64::new(0),
        }
    }

    /// Cache key for a genome, with any oracle-side randomness folded in.
    pub fn cache_key(&self, genome: &Genome) -> Fingerprint {
        match self.adapter.cache_salt() {
            Some(salt) => genome.fingerprint().salted(salt),
            None => genome.fingerprint(),
        }
    }

    pub fn score(&self, genome: &Genome) -> FitnessResult {
        match self.cache.claim(self.cache_key(genome)) {
            Claim::Ready(result) => result,
            Claim::Owner(guard) => {
                let result = self.compute(genome);
                guard.complete(result)
            }
        }
    }

    /// Pin a floor result for a genome whose evaluation never produced one.
    /// A result already stored for the genome is kept and returned.
    pub fn settle_floor(&self, genome: &Genome, status: EvaluationStatus) -> FitnessResult {
        let floor = FitnessResult::floor(genome.fingerprint(), status);
        self.cache.settle(self.cache_key(genome), floor)
    }

    pub fn cached(&self, genome: &Genome) -> Option<FitnessResult> {
        self.cache.get(&self.cache_key(genome))
    }

    fn compute(&self, genome: &Genome) -> FitnessResult {
        let start = Instant::now();
        let fingerprint = genome.fingerprint();

        let outcome = self.repair.repair(genome);
        if outcome.is_rejected() {
            self.repair_rejections.fetch_add(1, Ordering::Relaxed);
            let mut result = FitnessResult::floor(fingerprint, EvaluationStatus::RepairRejected);
            result.violated_constraints.push("repair_unconverged".to_string());
            result.eval_wall_time_ms = elapsed_ms(start);
            return result;
        }
        let repaired = outcome.genome;

        self.oracle_calls.fetch_add(1, Ordering::Relaxed);
        let response = self.adapter.evaluate(&repaired);
        let penalty = self.penalty(repaired.additions(), repaired.deletions());
        let fitness = self.scalarize(&response, penalty);

        log::trace!(
            "Scored {:?}: growth={:.4} feasible={} fitness={:.4}",
            repaired,
            response.growth_rate,
            response.feasible,
            fitness
        );

        FitnessResult {
            fingerprint,
            growth_rate: response.growth_rate,
            feasible: response.feasible,
            reaction_penalty: penalty,
            fitness,
            status: if response.feasible {
                EvaluationStatus::Evaluated
            } else {
                EvaluationStatus::Infeasible
            },
            violated_constraints: response.violated_constraints,
            eval_wall_time_ms: elapsed_ms(start),
        }
    }

    /// Edit-count penalty; gap-fills and deletions both cost.
    pub fn penalty(&self, additions: usize, deletions: usize) -> f64 {
        (self.weights.addition * additions as f64 + self.weights.deletion * deletions as f64)
            * self.penalty_scale
    }

    /// Feasible scores never drop to the floor band; infeasible ones sit
    /// below it, ordered by how many constraints they violate.
    pub fn scalarize(&self, response: &OracleResponse, penalty: f64) -> f64 {
        if response.feasible {
            (self.weights.growth * response.growth_rate - penalty).max(FEASIBLE_FITNESS_MIN)
        } else {
            FITNESS_FLOOR - self.weights.violation * response.violated_constraints.len() as f64
        }
    }

    pub fn oracle_calls(&self) -> u64 {
        self.oracle_calls.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache.hits()
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn repair_rejections(&self) -> u64 {
        self.repair_rejections.load(Ordering::Relaxed)
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
