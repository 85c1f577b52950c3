use super::controller::{OperatorStats, ProgressCallback};
use super::population::FitnessSummary;
use crate::manifest::GenerationEntry;
use crate::types::TerminationReason;
use std::sync::mpsc::Sender;

/// Digest of one completed generation, as handed to progress listeners
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    pub fitness: FitnessSummary,
    pub best_growth_rate: f64,
    pub best_feasible: bool,
    pub mutation_rate: f64,
    pub unique_genomes: usize,
    pub operators: OperatorStats,
    pub oracle_calls: u64,
    pub cache_hits: u64,
    /// Timeouts and worker failures seen while evaluating
    pub incidents: usize,
    pub hall_of_fame_size: usize,
}

impl GenerationReport {
    pub fn new(entry: &GenerationEntry, hall_of_fame_size: usize) -> Self {
        Self {
            generation: entry.generation,
            fitness: entry.fitness,
            best_growth_rate: entry.best_growth_rate,
            best_feasible: entry.best_feasible,
            mutation_rate: entry.mutation_rate,
            unique_genomes: entry.diversity.unique_genomes,
            operators: entry.operators.clone(),
            oracle_calls: entry.evaluation.oracle_calls,
            cache_hits: entry.evaluation.cache_hits,
            incidents: entry.incidents.len(),
            hall_of_fame_size,
        }
    }
}

pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        log::debug!("Generation {} starting...", generation);
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        log::info!(
            "Generation {}: best {:.6} (growth {:.6}{}), mean {:.6}, {} feasible, {} unique",
            report.generation,
            report.fitness.best,
            report.best_growth_rate,
            if report.best_feasible { "" } else { ", infeasible" },
            report.fitness.mean,
            report.fitness.feasible,
            report.unique_genomes
        );
        let ops = &report.operators;
        log::debug!(
            "Generation {} operators: {} crossovers, {} clones, {} mutated ({} flips), {} repaired, {} rejected; \
             {} oracle calls, {} cache hits, mutation rate {:.4}",
            report.generation,
            ops.crossovers,
            ops.clones,
            ops.mutated,
            ops.gene_flips,
            ops.repaired,
            ops.repair_rejected,
            report.oracle_calls,
            report.cache_hits,
            report.mutation_rate
        );
        if report.incidents > 0 {
            log::warn!("Generation {} had {} evaluation incidents", report.generation, report.incidents);
        }
    }

    fn on_terminated(&mut self, reason: &TerminationReason, generations: usize) {
        log::info!("Run finished after {} generations: {}", generations, reason);
    }
}

// For handing progress to another thread
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete(GenerationReport),
    Terminated { reason: TerminationReason, generations: usize },
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete(report.clone()));
    }

    fn on_terminated(&mut self, reason: &TerminationReason, generations: usize) {
        let _ = self.sender.send(ProgressMessage::Terminated {
            reason: reason.clone(),
            generations,
        });
    }
}
