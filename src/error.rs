use thiserror::Error;

/// Exit status for a configuration or model input that failed validation.
pub const EXIT_CONFIGURATION_INVALID: i32 = 2;
/// Exit status for a run that aborted on an engine or I/O error.
pub const EXIT_RUN_FAILED: i32 = 3;
/// Exit status for a run stopped through its cancellation token.
pub const EXIT_RUN_CANCELLED: i32 = 4;

#[derive(Error, Debug)]
pub enum GapxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid genome: {0}")]
    InvalidGenome(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
}

impl GapxError {
    /// Process exit status the command line surface reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GapxError::Configuration(_) | GapxError::ConfigSource(_) | GapxError::Model(_) => {
                EXIT_CONFIGURATION_INVALID
            }
            _ => EXIT_RUN_FAILED,
        }
    }
}

pub type Result<T> = std::result::Result<T, GapxError>;
