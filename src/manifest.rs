use crate::config::RunConfig;
use crate::engines::evaluation::{EvaluationStats, Incident};
use crate::engines::generation::controller::OperatorStats;
use crate::engines::generation::population::{DiversityStats, FitnessSummary};
use crate::error::{GapxError, Result};
use crate::types::{Fingerprint, FitnessResult, ModelEdits, TerminationReason};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ManifestRecord {
    Header(ManifestHeader),
    Generation(GenerationEntry),
    Summary(RunSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub run_name: String,
    pub seed: u64,
    pub model_id: String,
    pub universe_id: Fingerprint,
    pub universe_size: usize,
    pub toggle_eligible: usize,
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

impl ManifestHeader {
    pub fn config(&self) -> Result<RunConfig> {
        Ok(serde_json::from_value(self.config.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEntry {
    pub generation: usize,
    pub fitness: FitnessSummary,
    pub best_fingerprint: Fingerprint,
    pub best_growth_rate: f64,
    pub best_feasible: bool,
    pub mutation_rate: f64,
    pub diversity: DiversityStats,
    pub operators: OperatorStats,
    pub evaluation: EvaluationStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incidents: Vec<Incident>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_clock_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallOfFameRecord {
    pub fingerprint: Fingerprint,
    pub genome: String,
    pub fitness: f64,
    pub growth_rate: f64,
    pub feasible: bool,
    pub additions: usize,
    pub deletions: usize,
    pub generation: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub seed: u64,
    pub termination: TerminationReason,
    pub converged: bool,
    pub generations_completed: usize,
    pub best_genome: Option<String>,
    pub best_edits: Option<ModelEdits>,
    pub best_result: Option<FitnessResult>,
    pub total_evaluations: usize,
    pub oracle_calls: u64,
    pub cache_hits: u64,
    pub retries: usize,
    pub timeouts: usize,
    pub worker_failures: usize,
    pub hall_of_fame: Vec<HallOfFameRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_wall_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

/// Writes manifest records line by line. With `record_timings` off every
/// clock-derived field is dropped so repeated runs produce identical bytes.
pub struct ManifestWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    record_timings: bool,
    header_written: bool,
    generations: usize,
    finalized: bool,
}

impl ManifestWriter {
    pub fn create<P: AsRef<Path>>(path: P, record_timings: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        log::info!("Writing run manifest to {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            record_timings,
            header_written: false,
            generations: 0,
            finalized: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn generations_written(&self) -> usize {
        self.generations
    }

    pub fn write_header(&mut self, mut header: ManifestHeader) -> Result<()> {
        if self.header_written {
            return Err(GapxError::Manifest("Header already written".to_string()));
        }
        if !self.record_timings {
            header.started_at = None;
        }
        self.write_record(&ManifestRecord::Header(header))?;
        self.header_written = true;
        Ok(())
    }

    pub fn append_generation(&mut self, mut entry: GenerationEntry) -> Result<()> {
        self.check_open()?;
        if !self.record_timings {
            entry.wall_clock_ms = None;
        }
        self.write_record(&ManifestRecord::Generation(entry))?;
        self.generations += 1;
        Ok(())
    }

    pub fn finalize(&mut self, mut summary: RunSummary) -> Result<()> {
        self.check_open()?;
        if !self.record_timings {
            summary.total_wall_time_ms = None;
            summary.finished_at = None;
            if let Some(result) = summary.best_result.as_mut() {
                result.eval_wall_time_ms = 0.0;
            }
        }
        self.write_record(&ManifestRecord::Summary(summary))?;
        self.finalized = true;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if !self.header_written {
            return Err(GapxError::Manifest("Header must be written first".to_string()));
        }
        if self.finalized {
            return Err(GapxError::Manifest(format!(
                "Manifest {} is already finalized",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn write_record(&mut self, record: &ManifestRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A manifest read back from disk
#[derive(Debug, Clone)]
pub struct RunManifest {
    pub header: ManifestHeader,
    pub generations: Vec<GenerationEntry>,
    pub summary: Option<RunSummary>,
}

impl RunManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| GapxError::Manifest(format!("Cannot open {}: {}", path.display(), e)))?;

        let mut header = None;
        let mut generations = Vec::new();
        let mut summary = None;

        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ManifestRecord = serde_json::from_str(&line).map_err(|e| {
                GapxError::Manifest(format!("{}:{}: {}", path.display(), number + 1, e))
            })?;
            if summary.is_some() {
                return Err(GapxError::Manifest(format!(
                    "{}:{}: record after summary",
                    path.display(),
                    number + 1
                )));
            }
            match record {
                ManifestRecord::Header(h) if header.is_none() => header = Some(h),
                ManifestRecord::Header(_) => {
                    return Err(GapxError::Manifest(format!(
                        "{}:{}: duplicate header",
                        path.display(),
                        number + 1
                    )))
                }
                _ if header.is_none() => {
                    return Err(GapxError::Manifest(format!(
                        "{}: first record is not a header",
                        path.display()
                    )))
                }
                ManifestRecord::Generation(entry) => generations.push(entry),
                ManifestRecord::Summary(s) => summary = Some(s),
            }
        }

        let header = header
            .ok_or_else(|| GapxError::Manifest(format!("{} contains no header", path.display())))?;
        Ok(Self {
            header,
            generations,
            summary,
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        self.summary.as_ref().map(|s| &s.termination)
    }

    /// (generation, best, mean, worst) per recorded generation
    pub fn trajectory(&self) -> Vec<(usize, f64, f64, f64)> {
        self.generations
            .iter()
            .map(|g| (g.generation, g.fitness.best, g.fitness.mean, g.fitness.worst))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EvaluationStatus;
    use tempfile::tempdir;

    fn header() -> ManifestHeader {
        ManifestHeader {
            run_name: "unit".to_string(),
            seed: 7,
            model_id: "toy".to_string(),
            universe_id: Fingerprint::from_hash(blake3::hash(b"universe")),
            universe_size: 4,
            toggle_eligible: 3,
            config: serde_json::to_value(RunConfig::default()).unwrap(),
            started_at: Some("2024-01-01T00:00:00Z".to_string()),
        }
    }

    fn entry(generation: usize, best: f64) -> GenerationEntry {
        GenerationEntry {
            generation,
            fitness: FitnessSummary {
                best,
                mean: best / 2.0,
                worst: 0.0,
                feasible: 3,
            },
            best_fingerprint: Fingerprint::from_hash(blake3::hash(&[generation as u8])),
            best_growth_rate: best,
            best_feasible: true,
            mutation_rate: 0.01,
            diversity: DiversityStats {
                unique_genomes: 3,
                mean_distance_from_base: 1.0,
                mean_pairwise_distance: 1.5,
            },
            operators: OperatorStats::default(),
            evaluation: EvaluationStats::default(),
            incidents: Vec::new(),
            wall_clock_ms: Some(12.5),
        }
    }

    fn summary() -> RunSummary {
        let fp = Fingerprint::from_hash(blake3::hash(b"best"));
        RunSummary {
            seed: 7,
            termination: TerminationReason::MaxGenerations,
            converged: false,
            generations_completed: 2,
            best_genome: Some("04".to_string()),
            best_edits: Some(ModelEdits::default()),
            best_result: Some(FitnessResult {
                eval_wall_time_ms: 3.0,
                ..FitnessResult::floor(fp, EvaluationStatus::Evaluated)
            }),
            total_evaluations: 8,
            oracle_calls: 5,
            cache_hits: 3,
            retries: 0,
            timeouts: 0,
            worker_failures: 0,
            hall_of_fame: Vec::new(),
            total_wall_time_ms: Some(40.0),
            finished_at: Some("2024-01-01T00:00:01Z".to_string()),
        }
    }

    #[test]
    fn test_write_and_load_trajectory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("manifest.jsonl");
        let mut writer = ManifestWriter::create(&path, true).unwrap();
        writer.write_header(header()).unwrap();
        writer.append_generation(entry(0, 1.0)).unwrap();
        writer.append_generation(entry(1, 2.0)).unwrap();
        writer.finalize(summary()).unwrap();
        assert!(writer.append_generation(entry(2, 3.0)).is_err());

        let manifest = RunManifest::load(&path).unwrap();
        assert!(manifest.is_finalized());
        assert_eq!(manifest.trajectory(), vec![(0, 1.0, 0.5, 0.0), (1, 2.0, 1.0, 0.0)]);
        assert_eq!(manifest.termination(), Some(&TerminationReason::MaxGenerations));
        assert_eq!(manifest.generations[0].wall_clock_ms, Some(12.5));
        assert_eq!(manifest.header.config().unwrap().run.seed, 42);
    }

    #[test]
    fn test_timings_stripped_when_disabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let mut writer = ManifestWriter::create(&path, false).unwrap();
        writer.write_header(header()).unwrap();
        writer.append_generation(entry(0, 1.0)).unwrap();
        writer.finalize(summary()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("wall_clock_ms"));
        assert!(!text.contains("started_at"));
        assert!(!text.contains("finished_at"));
        let manifest = RunManifest::load(&path).unwrap();
        let best = manifest.summary.unwrap().best_result.unwrap();
        assert_eq!(best.eval_wall_time_ms, 0.0);
    }

    #[test]
    fn test_unfinalized_manifest_still_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let mut writer = ManifestWriter::create(&path, true).unwrap();
        writer.write_header(header()).unwrap();
        writer.append_generation(entry(0, 1.0)).unwrap();
        drop(writer);

        let manifest = RunManifest::load(&path).unwrap();
        assert!(!manifest.is_finalized());
        assert_eq!(manifest.generations.len(), 1);
    }

    #[test]
    fn test_missing_header_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let line = serde_json::to_string(&ManifestRecord::Generation(entry(0, 1.0))).unwrap();
        std::fs::write(&path, format!("{}\n", line)).unwrap();
        assert!(matches!(RunManifest::load(&path), Err(GapxError::Manifest(_))));
    }
}
