use super::traits::{check_probability, invalid, ConfigSection};
use crate::error::GapxError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub elitism_count: usize,
    pub tournament_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub crossover: CrossoverMode,
    pub max_generations: usize,
    pub stagnation_window: usize,
    pub stagnation_epsilon: f64,
    pub target_growth: Option<f64>,
    pub hall_of_fame_size: usize,
    pub init: InitPopulationConfig,
    pub adaptive_mutation: AdaptiveMutationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CrossoverMode {
    Uniform { swap_probability: f64 },
    SinglePoint,
    /// Uniform swaps with a separate probability for base-model genes and
    /// database genes
    Regional {
        base_swap_probability: f64,
        database_swap_probability: f64,
    },
}

/// Composition of generation zero
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitPopulationConfig {
    /// Seed the unmodified base genome as one individual
    pub include_base_genome: bool,
    /// Share of the remaining individuals drawn fully at random; the rest are
    /// light perturbations of the base genome
    pub random_fraction: f64,
    /// Per-gene toggle probability for random individuals
    pub random_toggle_probability: f64,
    /// Per-gene flip probability for conservative individuals
    pub conservative_flip_rate: f64,
}

/// Raises the mutation rate while the best fitness stagnates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveMutationConfig {
    pub enabled: bool,
    pub window: usize,
    pub scale_up: f64,
    pub max_rate: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            elitism_count: 2,
            tournament_size: 3,
            mutation_rate: 0.01,
            crossover_rate: 0.9,
            crossover: CrossoverMode::Uniform { swap_probability: 0.5 },
            max_generations: 100,
            stagnation_window: 20,
            stagnation_epsilon: 1e-6,
            target_growth: None,
            hall_of_fame_size: 5,
            init: InitPopulationConfig::default(),
            adaptive_mutation: AdaptiveMutationConfig::default(),
        }
    }
}

impl Default for InitPopulationConfig {
    fn default() -> Self {
        Self {
            include_base_genome: true,
            random_fraction: 0.5,
            random_toggle_probability: 0.5,
            conservative_flip_rate: 0.02,
        }
    }
}

impl Default for AdaptiveMutationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 10,
            scale_up: 1.5,
            max_rate: 0.05,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), GapxError> {
        if self.population_size < 2 {
            return Err(invalid::<Self>("population_size must be at least 2"));
        }
        if self.elitism_count >= self.population_size {
            return Err(invalid::<Self>(format!(
                "elitism_count ({}) must be smaller than population_size ({})",
                self.elitism_count, self.population_size
            )));
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return Err(invalid::<Self>(format!(
                "tournament_size must be between 1 and population_size, got {}",
                self.tournament_size
            )));
        }
        check_probability::<Self>("mutation_rate", self.mutation_rate)?;
        check_probability::<Self>("crossover_rate", self.crossover_rate)?;
        match self.crossover {
            CrossoverMode::Uniform { swap_probability } => {
                check_probability::<Self>("crossover.swap_probability", swap_probability)?;
            }
            CrossoverMode::Regional {
                base_swap_probability,
                database_swap_probability,
            } => {
                check_probability::<Self>("crossover.base_swap_probability", base_swap_probability)?;
                check_probability::<Self>("crossover.database_swap_probability", database_swap_probability)?;
            }
            CrossoverMode::SinglePoint => {}
        }
        if self.max_generations == 0 {
            return Err(invalid::<Self>("max_generations must be at least 1"));
        }
        if self.stagnation_window == 0 {
            return Err(invalid::<Self>("stagnation_window must be at least 1"));
        }
        if !self.stagnation_epsilon.is_finite() || self.stagnation_epsilon < 0.0 {
            return Err(invalid::<Self>("stagnation_epsilon must be a non-negative number"));
        }
        if let Some(target) = self.target_growth {
            if !target.is_finite() || target < 0.0 {
                return Err(invalid::<Self>("target_growth must be a non-negative number"));
            }
        }
        if self.hall_of_fame_size == 0 {
            return Err(invalid::<Self>("hall_of_fame_size must be at least 1"));
        }
        check_probability::<Self>("init.random_fraction", self.init.random_fraction)?;
        check_probability::<Self>("init.random_toggle_probability", self.init.random_toggle_probability)?;
        check_probability::<Self>("init.conservative_flip_rate", self.init.conservative_flip_rate)?;
        if self.adaptive_mutation.enabled {
            if self.adaptive_mutation.window == 0 {
                return Err(invalid::<Self>("adaptive_mutation.window must be at least 1"));
            }
            if !self.adaptive_mutation.scale_up.is_finite() || self.adaptive_mutation.scale_up < 1.0 {
                return Err(invalid::<Self>("adaptive_mutation.scale_up must be at least 1"));
            }
            check_probability::<Self>("adaptive_mutation.max_rate", self.adaptive_mutation.max_rate)?;
            if self.adaptive_mutation.max_rate < self.mutation_rate {
                return Err(invalid::<Self>("adaptive_mutation.max_rate must not be below mutation_rate"));
            }
        }
        Ok(())
    }
}
