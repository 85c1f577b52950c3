use crate::engines::generation::genome::Genome;
use crate::engines::generation::operators::{rank_order, tournament_selection, Contender};
use crate::error::{GapxError, Result};
use crate::types::{FitnessResult, FITNESS_FLOOR};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How an individual came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Base,
    Random,
    Conservative,
    Elite,
    Crossover,
    Clone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub origin: Origin,
    /// Indices into the previous generation
    pub parents: Vec<usize>,
}

impl Lineage {
    pub fn seed(origin: Origin) -> Self {
        Self {
            origin,
            parents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Individual {
    pub genome: Genome,
    pub lineage: Lineage,
    /// None until the generation has been evaluated
    pub fitness: Option<FitnessResult>,
}

impl Individual {
    pub fn new(genome: Genome, lineage: Lineage) -> Self {
        Self {
            genome,
            lineage,
            fitness: None,
        }
    }

    pub fn fitness_value(&self) -> f64 {
        self.fitness.as_ref().map_or(FITNESS_FLOOR, |r| r.fitness)
    }

    fn contender(&self) -> Contender {
        Contender {
            fitness: self.fitness_value(),
            distance: self.genome.distance_from_base(),
        }
    }
}

/// Best / mean / worst fitness of one evaluated generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessSummary {
    pub best: f64,
    pub mean: f64,
    pub worst: f64,
    pub feasible: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiversityStats {
    pub unique_genomes: usize,
    pub mean_distance_from_base: f64,
    pub mean_pairwise_distance: f64,
}

/// One generation: a fixed-size ordered sequence of individuals
#[derive(Debug, Clone)]
pub struct Population {
    generation: usize,
    individuals: Vec<Individual>,
}

impl Population {
    pub fn new(generation: usize, individuals: Vec<Individual>) -> Self {
        Self {
            generation,
            individuals,
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn individual(&self, index: usize) -> &Individual {
        &self.individuals[index]
    }

    pub fn genomes(&self) -> Vec<Genome> {
        self.individuals.iter().map(|i| i.genome.clone()).collect()
    }

    pub fn is_evaluated(&self) -> bool {
        self.individuals.iter().all(|i| i.fitness.is_some())
    }

    /// Same individuals with their fitness attached, index for index.
    pub fn with_results(&self, results: Vec<FitnessResult>) -> Result<Population> {
        if results.len() != self.individuals.len() {
            return Err(GapxError::InvalidGenome(format!(
                "Generation {} has {} individuals but {} fitness results",
                self.generation,
                self.individuals.len(),
                results.len()
            )));
        }
        let individuals = self
            .individuals
            .iter()
            .zip(results)
            .map(|(ind, result)| {
                if result.fingerprint != ind.genome.fingerprint() {
                    return Err(GapxError::InvalidGenome(format!(
                        "Fitness result {} does not belong to {:?}",
                        result.fingerprint.short(),
                        ind.genome
                    )));
                }
                Ok(Individual {
                    fitness: Some(result),
                    ..ind.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Population::new(self.generation, individuals))
    }

    pub fn contenders(&self) -> Vec<Contender> {
        self.individuals.iter().map(Individual::contender).collect()
    }

    /// Indices sorted best first: fitness, then distance from base, then index
    pub fn ranking(&self) -> Vec<usize> {
        let contenders = self.contenders();
        let mut order: Vec<usize> = (0..contenders.len()).collect();
        order.sort_by(|&a, &b| rank_order((a, &contenders[a]), (b, &contenders[b])));
        order
    }

    pub fn best(&self) -> Option<&Individual> {
        self.ranking().first().map(|&i| &self.individuals[i])
    }

    pub fn summary(&self) -> FitnessSummary {
        let values: Vec<f64> = self.individuals.iter().map(Individual::fitness_value).collect();
        if values.is_empty() {
            return FitnessSummary {
                best: FITNESS_FLOOR,
                mean: FITNESS_FLOOR,
                worst: FITNESS_FLOOR,
                feasible: 0,
            };
        }
        FitnessSummary {
            best: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            worst: values.iter().copied().fold(f64::INFINITY, f64::min),
            feasible: self
                .individuals
                .iter()
                .filter(|i| i.fitness.as_ref().map_or(false, |r| r.feasible))
                .count(),
        }
    }

    pub fn diversity(&self) -> DiversityStats {
        let n = self.individuals.len();
        if n == 0 {
            return DiversityStats {
                unique_genomes: 0,
                mean_distance_from_base: 0.0,
                mean_pairwise_distance: 0.0,
            };
        }
        let unique: HashSet<_> = self.individuals.iter().map(|i| i.genome.fingerprint()).collect();
        let from_base: usize = self.individuals.iter().map(|i| i.genome.distance_from_base()).sum();

        let mut pairwise = 0usize;
        for a in 0..n {
            for b in (a + 1)..n {
                pairwise += self.individuals[a].genome.distance(&self.individuals[b].genome);
            }
        }
        let pairs = n * (n - 1) / 2;

        DiversityStats {
            unique_genomes: unique.len(),
            mean_distance_from_base: from_base as f64 / n as f64,
            mean_pairwise_distance: if pairs == 0 { 0.0 } else { pairwise as f64 / pairs as f64 },
        }
    }
}

/// Owns the current generation and answers selection queries on it.
pub struct PopulationManager {
    current: Population,
    population_size: usize,
    tournament_size: usize,
    elitism_count: usize,
}

impl PopulationManager {
    pub fn new(
        initial: Population,
        tournament_size: usize,
        elitism_count: usize,
    ) -> Result<Self> {
        if initial.is_empty() {
            return Err(GapxError::InvalidGenome("Initial population is empty".to_string()));
        }
        Ok(Self {
            population_size: initial.len(),
            current: initial,
            tournament_size,
            elitism_count,
        })
    }

    pub fn current(&self) -> &Population {
        &self.current
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn elitism_count(&self) -> usize {
        self.elitism_count
    }

    /// Attach evaluation results to the held generation.
    pub fn record_results(&mut self, results: Vec<FitnessResult>) -> Result<()> {
        let evaluated = self.current.with_results(results)?;
        self.current = evaluated;
        Ok(())
    }

    /// `k` parents by tournament selection, in draw order.
    pub fn select_parents<R: Rng>(&self, k: usize, rng: &mut R) -> Vec<(usize, Genome)> {
        let contenders = self.current.contenders();
        (0..k)
            .map(|_| {
                let idx = tournament_selection(&contenders, self.tournament_size, rng);
                (idx, self.current.individual(idx).genome.clone())
            })
            .collect()
    }

    /// Top-`e` genomes of the held generation, best first.
    pub fn elites(&self) -> Vec<(usize, Genome)> {
        self.current
            .ranking()
            .into_iter()
            .take(self.elitism_count)
            .map(|idx| (idx, self.current.individual(idx).genome.clone()))
            .collect()
    }

    /// Replace the held generation with its successor.
    pub fn advance(&mut self, next: Population) -> Result<()> {
        if next.len() != self.population_size {
            return Err(GapxError::InvalidGenome(format!(
                "Generation {} has {} individuals, expected {}",
                next.generation(),
                next.len(),
                self.population_size
            )));
        }
        if next.generation() != self.current.generation() + 1 {
            return Err(GapxError::InvalidGenome(format!(
                "Cannot advance from generation {} to {}",
                self.current.generation(),
                next.generation()
            )));
        }
        self.current = next;
        Ok(())
    }
}
