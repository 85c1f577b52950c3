pub mod config;
pub mod engines;
pub mod error;
pub mod manifest;
pub mod model;
pub mod types;

pub use error::{GapxError, Result};
