//! Error types for the reactor library
//!
//! Out-of-range rod positions and telemetry fields are clamped, never
//! rejected. Errors are reserved for configuration values that have no
//! sensible clamp target.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactorError {
    /// Simulation time step must be finite and strictly positive
    #[error("invalid time step {0} s: must be finite and > 0")]
    InvalidTimeStep(f64),

    #[error("invalid reactor configuration: {0}")]
    InvalidConfig(String),
}
