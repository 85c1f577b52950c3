use super::traits::{invalid, ConfigSection};
use crate::error::GapxError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub workers: usize,
    pub task_timeout_ms: u64,
    pub weights: FitnessWeights,
    /// Divide the edit penalty by the number of toggle-eligible genes
    pub normalize_penalty: bool,
}

/// Weights of the scalarized fitness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub growth: f64,
    pub addition: f64,
    pub deletion: f64,
    pub violation: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            task_timeout_ms: 30_000,
            weights: FitnessWeights::default(),
            normalize_penalty: false,
        }
    }
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            growth: 1.0,
            addition: 0.01,
            deletion: 0.01,
            violation: 1.0,
        }
    }
}

impl EvaluationConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<(), GapxError> {
        if self.workers == 0 {
            return Err(invalid::<Self>("workers must be at least 1"));
        }
        if self.task_timeout_ms == 0 {
            return Err(invalid::<Self>("task_timeout_ms must be positive"));
        }
        let weights = [
            ("weights.growth", self.weights.growth),
            ("weights.addition", self.weights.addition),
            ("weights.deletion", self.weights.deletion),
            ("weights.violation", self.weights.violation),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid::<Self>(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
