//! TRIGA Reactor Simulator Library
//!
//! Point-kinetics simulation of a TRIGA research reactor with a thermal
//! model of the fuel and pool, control rods, automatic power regulation and
//! SCRAM protection, plus the plumbing to drive it from a real-time loop.

pub mod commands;
pub mod config;
pub mod control_rod;
pub mod error;
pub mod intercore;
pub mod kinetics;
pub mod packets;
pub mod physics;
pub mod reactor;
pub mod runtime;
pub mod trace;

pub use config::ReactorConfig;
pub use control_rod::{ControlRod, RodPosition};
pub use error::ReactorError;
pub use reactor::{ReactorEngine, ReactorState, RodKind};
pub use runtime::{run_simulation, run_simulation_with_operator, RunOptions, RunReport};
