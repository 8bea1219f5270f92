//! Error taxonomy for the crate
//!
//! Data-validation problems name the offending replicate; integration
//! problems distinguish a single rejected draw from a failure that makes the
//! whole run unusable.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("replicate '{replicate}': expected {expected} values, found {found}")]
    ShapeMismatch {
        replicate: String,
        expected: usize,
        found: usize,
    },

    #[error("replicate '{replicate}': time grid is not strictly increasing at t = {time}")]
    NonMonotonicTime { replicate: String, time: f64 },

    #[error("replicate '{replicate}': {nobs} observation(s) is not enough to fit an ODE")]
    InsufficientData { replicate: String, nobs: usize },

    #[error("{0}")]
    Validation(String),

    /// A single parameter draw could not be integrated; the draw is rejected
    /// and the run continues
    #[error("draw {draw} could not be integrated: {reason}")]
    Integration { draw: usize, reason: String },

    /// Integration failure that invalidates the whole run
    #[error("integration failed during {stage}: {reason}")]
    FatalIntegration {
        stage: &'static str,
        reason: String,
    },

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
