//! Error kinds shared by every diffusion component
//!
//! All failures are local precondition violations: there is no I/O in the
//! diffusion core, so nothing here is transient or worth retrying.

use thiserror::Error;

/// Precondition failure raised by the schedule, the network or the process
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffusionError {
    /// A constructor received parameters that cannot describe a valid model
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Tensor dimensions do not line up (spatial divisibility, batch size, channels)
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A timestep index outside `[0, n_steps)`
    #[error("Timestep {timestep} out of range for a schedule with {n_steps} steps")]
    OutOfRange {
        /// Requested timestep
        timestep: usize,
        /// Schedule length
        n_steps: usize,
    },
}

impl DiffusionError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }
}
