use crate::config::CrossoverMode;
use crate::engines::generation::genome::Genome;
use crate::error::{GapxError, Result};
use crate::model::{CandidateUniverse, GeneOrigin};
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

/// What tournament selection needs to know about one individual
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contender {
    pub fitness: f64,
    /// Mutation distance from the base model
    pub distance: usize,
}

/// Total order used wherever individuals are ranked: higher fitness first,
/// then fewer edits from the base model, then lower population index.
pub fn rank_order(a: (usize, &Contender), b: (usize, &Contender)) -> Ordering {
    b.1.fitness
        .partial_cmp(&a.1.fitness)
        .unwrap_or(Ordering::Equal)
        .then(a.1.distance.cmp(&b.1.distance))
        .then(a.0.cmp(&b.0))
}

/// Tournament selection: pick best of K random candidates, returns its index
pub fn tournament_selection<R: Rng>(
    population: &[Contender],
    tournament_size: usize,
    rng: &mut R,
) -> usize {
    let mut best_idx = rng.gen_range(0..population.len());

    for _ in 1..tournament_size {
        let idx = rng.gen_range(0..population.len());
        if rank_order((idx, &population[idx]), (best_idx, &population[best_idx])) == Ordering::Less {
            best_idx = idx;
        }
    }

    best_idx
}

/// Crossover over the fixed gene ordering.
///
/// Child A always starts from parent A: genes it does not receive from
/// parent B stay those of parent A, and a genome too short to cut yields
/// copies of the parents in order.
pub fn crossover<R: Rng>(
    parent1: &Genome,
    parent2: &Genome,
    mode: &CrossoverMode,
    rng: &mut R,
) -> Result<(Genome, Genome)> {
    if !parent1.same_universe(parent2) || parent1.len() != parent2.len() {
        return Err(GapxError::InvalidGenome(format!(
            "Cannot cross {:?} with {:?}: gene universes differ",
            parent1, parent2
        )));
    }

    let len = parent1.len();
    let mut child1 = parent1.states().to_vec();
    let mut child2 = parent2.states().to_vec();

    match mode {
        CrossoverMode::Uniform { swap_probability } => {
            for i in 0..len {
                if rng.gen::<f64>() < *swap_probability {
                    std::mem::swap(&mut child1[i], &mut child2[i]);
                }
            }
        }
        CrossoverMode::Regional {
            base_swap_probability,
            database_swap_probability,
        } => {
            for (i, entry) in parent1.universe().entries().iter().enumerate() {
                let p = match entry.origin {
                    GeneOrigin::Base => *base_swap_probability,
                    GeneOrigin::Database => *database_swap_probability,
                };
                if rng.gen::<f64>() < p {
                    std::mem::swap(&mut child1[i], &mut child2[i]);
                }
            }
        }
        CrossoverMode::SinglePoint => {
            if len <= 1 {
                return Ok((parent1.clone(), parent2.clone()));
            }
            let point = rng.gen_range(1..len);
            child1[point..].copy_from_slice(&parent2.states()[point..]);
            child2[point..].copy_from_slice(&parent1.states()[point..]);
        }
    }

    let universe = parent1.universe().clone();
    Ok((
        Genome::from_states(universe.clone(), child1)?,
        Genome::from_states(universe, child2)?,
    ))
}

/// Mutation: flip each toggle-eligible gene with probability `mutation_rate`.
/// Returns the new genome and the number of flipped genes.
pub fn mutate<R: Rng>(genome: &Genome, mutation_rate: f64, rng: &mut R) -> Result<(Genome, usize)> {
    let universe = genome.universe().clone();
    let mut toggles = genome.toggles();
    let mut flips = 0;

    for (idx, entry) in universe.entries().iter().enumerate() {
        if !entry.is_toggle_eligible() {
            continue;
        }
        if rng.gen::<f64>() < mutation_rate {
            toggles[idx] = !toggles[idx];
            flips += 1;
        }
    }

    if flips == 0 {
        return Ok((genome.clone(), 0));
    }
    Ok((Genome::from_toggles(universe, &toggles)?, flips))
}

/// Generate random genome: each toggle-eligible gene is toggled with
/// probability `toggle_probability`
pub fn random_genome<R: Rng>(
    universe: &Arc<CandidateUniverse>,
    toggle_probability: f64,
    rng: &mut R,
) -> Result<Genome> {
    let base = Genome::base(universe.clone());
    Ok(mutate(&base, toggle_probability, rng)?.0)
}

/// Light perturbation of an existing genome, used for conservative
/// individuals of the initial population
pub fn perturb<R: Rng>(genome: &Genome, flip_rate: f64, rng: &mut R) -> Result<Genome> {
    Ok(mutate(genome, flip_rate, rng)?.0)
}
