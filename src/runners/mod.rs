//! # Runners.
//!
//! - [`ProgramRunner`], [`RunnerRef`] the runner seam
//! - [`RunnerRegistry`] runner resolution by executor
//! - [`CommandRunner`] built-in runner for records with a command line

mod command;
mod runner;

pub use command::{CommandRunner, COMMAND_RUNNER};
pub use runner::{ProgramRunner, RunnerRef, RunnerRegistry};
