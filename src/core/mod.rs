//! Runtime core: launch coordination and lifecycle.
//!
//! The public entry point is [`ExecutionCoordinator`], built with
//! [`CoordinatorBuilder`]. It admits launches, restarts conflicting
//! configurations and tracks every launch until its process terminates.
//!
//! Internal modules:
//! - [`coordinator`]: admission, launch path, process callbacks;
//! - [`restart`]: pending restarts and their poll loop;
//! - [`relay`]: per-process listener that feeds lifecycle callbacks back;
//! - [`foreground`]: serialized execution context for start steps and prompts;
//! - [`markers`]: scheduled-but-not-started bookkeeping;
//! - [`indexing`]: the "indexing finished" gate;
//! - [`reporter`]: user-facing error reporting.

mod builder;
mod config;
mod coordinator;
mod foreground;
mod indexing;
mod markers;
mod relay;
mod reporter;
mod restart;
mod state;

pub use builder::CoordinatorBuilder;
pub use config::CoordinatorConfig;
pub use coordinator::{ExecutionCoordinator, LaunchOutcome};
pub use indexing::IndexingGate;
pub use markers::InProgressMarker;
pub use reporter::{ChannelReporter, ErrorReporter, FailureReport};
pub use state::LaunchState;
