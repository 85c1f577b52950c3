use super::traits::{invalid, ConfigSection};
use crate::error::GapxError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub name: String,
    pub seed: u64,
    pub output_dir: PathBuf,
    pub manifest_file: String,
    /// Write timestamps and wall-clock durations into the manifest. Off by
    /// default so repeated runs with one seed produce identical manifests.
    pub record_timings: bool,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: "gapx".to_string(),
            seed: 42,
            output_dir: PathBuf::from("gapx-output"),
            manifest_file: "manifest.jsonl".to_string(),
            record_timings: false,
        }
    }
}

impl RunSection {
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_file)
    }
}

impl ConfigSection for RunSection {
    fn section_name() -> &'static str {
        "run"
    }

    fn validate(&self) -> Result<(), GapxError> {
        if self.name.trim().is_empty() {
            return Err(invalid::<Self>("name must not be empty"));
        }
        if self.manifest_file.trim().is_empty() {
            return Err(invalid::<Self>("manifest_file must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// JSON bundle holding the base model and the gap-filling database
    pub bundle: PathBuf,
}

impl ConfigSection for ModelSection {
    fn section_name() -> &'static str {
        "model"
    }

    fn validate(&self) -> Result<(), GapxError> {
        if self.bundle.as_os_str().is_empty() {
            return Err(invalid::<Self>("bundle path is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    /// JSON file receiving the best edited model when a run ends. Relative
    /// paths resolve against `run.output_dir`.
    pub best_model: Option<PathBuf>,
}

impl ExportSection {
    pub fn best_model_path(&self, run: &RunSection) -> Option<PathBuf> {
        self.best_model.as_ref().map(|path| run.output_dir.join(path))
    }
}

impl ConfigSection for ExportSection {
    fn section_name() -> &'static str {
        "export"
    }

    fn validate(&self) -> Result<(), GapxError> {
        if let Some(path) = &self.best_model {
            if path.file_name().is_none() {
                return Err(invalid::<Self>(format!(
                    "best_model must name a file, got '{}'",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
