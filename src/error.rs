//
// Errors
//
// Everything that can go wrong before or during a reconstruction run.
// Cancellation is not here: a canceled run is an outcome, not a
// failure (see driver::RunOutcome).
//

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconError {
    /// A caller-supplied parameter is out of range: slice index, ray
    /// count, output size, or an angle array of the wrong length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The input is not a usable tilt series (bad extent, missing
    /// or mismatched tilt angles, scalar count not matching extent).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The output volume could not be allocated.
    #[error("could not allocate {bytes} bytes for the reconstruction")]
    AllocationFailure { bytes: usize },
}

pub type Result<T> = std::result::Result<T, ReconError>;
