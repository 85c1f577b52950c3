use crate::error::GapxError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), GapxError>;
}

/// Build a configuration error prefixed with the section it came from.
pub(crate) fn invalid<S: ConfigSection>(message: impl AsRef<str>) -> GapxError {
    GapxError::Configuration(format!("[{}] {}", S::section_name(), message.as_ref()))
}

pub(crate) fn check_probability<S: ConfigSection>(name: &str, value: f64) -> Result<(), GapxError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid::<S>(format!("{} must be between 0 and 1, got {}", name, value)));
    }
    Ok(())
}
