use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Score assigned to candidates that produced no usable evaluation.
/// Every feasible score is strictly greater than this value.
pub const FITNESS_FLOOR: f64 = -1.0e12;

/// Lowest score a feasible genome can receive.
pub const FEASIBLE_FITNESS_MIN: f64 = FITNESS_FLOOR + 1.0;

/// Edit state of one reaction in a candidate genome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
    Present,         // Base reaction kept
    Absent,          // Base reaction pruned, or database reaction not added
    CandidateAdded,  // Database reaction gap-filled into the model
}

impl EditState {
    pub fn is_active(self) -> bool {
        !matches!(self, EditState::Absent)
    }

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            EditState::Present => 0,
            EditState::Absent => 1,
            EditState::CandidateAdded => 2,
        }
    }
}

/// Stable blake3 digest identifying a genome (or a universe)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_hash(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }

    /// Combine with an oracle-supplied salt so that non-deterministic
    /// oracles do not share cache entries across salts.
    pub fn salted(&self, salt: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.0);
        hasher.update(&salt.to_le_bytes());
        Self::from_hash(hasher.finalize())
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        blake3::Hash::from_hex(hex.as_str())
            .map(Fingerprint::from_hash)
            .map_err(serde::de::Error::custom)
    }
}

/// Reaction-level edits a genome applies to the base model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEdits {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ModelEdits {
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// What the oracle adapter hands back to the fitness layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    pub growth_rate: f64,
    pub feasible: bool,
    pub violated_constraints: Vec<String>,
}

impl OracleResponse {
    pub fn infeasible(violated_constraints: Vec<String>) -> Self {
        Self {
            growth_rate: 0.0,
            feasible: false,
            violated_constraints,
        }
    }
}

/// How a fitness result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Evaluated,
    Infeasible,
    RepairRejected,
    TimedOut,
    WorkerFailed,
    Skipped,
}

/// Complete fitness evaluation of one genome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessResult {
    pub fingerprint: Fingerprint,
    pub growth_rate: f64,
    pub feasible: bool,
    pub reaction_penalty: f64,
    pub fitness: f64,
    pub violated_constraints: Vec<String>,
    pub status: EvaluationStatus,
    pub eval_wall_time_ms: f64,
}

impl FitnessResult {
    /// Floor-scored result for a genome that could not be evaluated.
    pub fn floor(fingerprint: Fingerprint, status: EvaluationStatus) -> Self {
        Self {
            fingerprint,
            growth_rate: 0.0,
            feasible: false,
            reaction_penalty: 0.0,
            fitness: FITNESS_FLOOR,
            violated_constraints: Vec::new(),
            status,
            eval_wall_time_ms: 0.0,
        }
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum TerminationReason {
    MaxGenerations,
    Stagnation,
    TargetGrowthReached,
    Cancelled,
    Failed(String),
}

impl TerminationReason {
    /// Stagnation and reaching the growth target count as convergence.
    pub fn is_converged(&self) -> bool {
        matches!(self, TerminationReason::Stagnation | TerminationReason::TargetGrowthReached)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::MaxGenerations => "max_generations",
            TerminationReason::Stagnation => "stagnation",
            TerminationReason::TargetGrowthReached => "target_growth_reached",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Failed(message) => write!(f, "failed: {}", message),
            other => f.write_str(other.as_str()),
        }
    }
}
