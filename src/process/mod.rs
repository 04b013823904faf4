//! Process layer: handles, content descriptors and OS child processes.
//!
//! ## Contents
//! - [`ProcessHandle`] / [`ProcessListener`] / [`ProcessSignals`] lifecycle contract
//! - [`TerminationReason`] marker set before a stop is issued
//! - [`request_stop`] non-blocking stop (detach/destroy, kill when stuck)
//! - [`ContentDescriptor`] launched-process handle with disposal hooks
//! - [`ChildProcess`] tokio-backed OS process

mod child;
mod descriptor;
mod handle;

pub use child::ChildProcess;
pub use descriptor::ContentDescriptor;
pub use handle::{request_stop, ProcessHandle, ProcessListener, ProcessSignals, TerminationReason};
