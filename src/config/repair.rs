use super::traits::{invalid, ConfigSection};
use crate::error::GapxError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Upper bound on repair passes before a genome is rejected
    pub max_passes: usize,
    /// Also drop additions whose products nothing consumes
    pub prune_dead_ends: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_passes: 16,
            prune_dead_ends: true,
        }
    }
}

impl ConfigSection for RepairConfig {
    fn section_name() -> &'static str {
        "repair"
    }

    fn validate(&self) -> Result<(), GapxError> {
        if self.max_passes == 0 {
            return Err(invalid::<Self>("max_passes must be at least 1"));
        }
        Ok(())
    }
}
