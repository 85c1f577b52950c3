use super::{
    evaluation::EvaluationConfig,
    evolution::EvolutionConfig,
    repair::RepairConfig,
    run::{ExportSection, ModelSection, RunSection},
    traits::ConfigSection,
};
use crate::error::GapxError;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

/// Prefix of environment overrides, e.g. `GAPX__EVOLUTION__POPULATION_SIZE=50`
pub const ENV_PREFIX: &str = "GAPX";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub run: RunSection,
    pub model: ModelSection,
    pub evolution: EvolutionConfig,
    pub evaluation: EvaluationConfig,
    pub repair: RepairConfig,
    pub export: ExportSection,
}

impl RunConfig {
    /// Load a TOML (or JSON) run configuration layered with environment
    /// overrides. Relative model paths resolve against the file's directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GapxError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GapxError::Configuration(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut run_config: RunConfig = settings
            .try_deserialize()
            .map_err(|e| GapxError::Configuration(format!("Failed to parse config: {}", e)))?;

        if let Some(base_dir) = path.parent() {
            if run_config.model.bundle.is_relative() && !run_config.model.bundle.as_os_str().is_empty() {
                run_config.model.bundle = base_dir.join(&run_config.model.bundle);
            }
        }

        log::debug!("Loaded run configuration '{}' from {}", run_config.run.name, path.display());
        Ok(run_config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GapxError> {
        let toml_str = self.to_toml()?;
        std::fs::write(path, toml_str)
            .map_err(|e| GapxError::Configuration(format!("Failed to write config: {}", e)))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, GapxError> {
        toml::to_string_pretty(self)
            .map_err(|e| GapxError::Configuration(format!("Failed to serialize: {}", e)))
    }

    /// Check every section and freeze the configuration for a run.
    pub fn validate(self) -> Result<ValidatedConfig, GapxError> {
        self.run.validate()?;
        self.model.validate()?;
        self.evolution.validate()?;
        self.evaluation.validate()?;
        self.repair.validate()?;
        self.export.validate()?;
        Ok(ValidatedConfig(Arc::new(self)))
    }
}

/// A configuration that passed validation. Read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct ValidatedConfig(Arc<RunConfig>);

impl Deref for ValidatedConfig {
    type Target = RunConfig;

    fn deref(&self) -> &RunConfig {
        &self.0
    }
}
