//! # Logging subscriber.
//!
//! [`LogWriter`] turns events into `tracing` records under the
//! `launchvisor::events` target. Launch failures log at `warn`, process
//! start and termination at `info`, everything else at `debug`.
//!
//! ## Output (fmt subscriber)
//! ```text
//! INFO launchvisor::events: process started record=Application.server execution=3 descriptor=1
//! WARN launchvisor::events: launch not started record=Application.server execution=4 reason=launch_start_failed
//! ```

use async_trait::async_trait;

use super::Subscribe;
use crate::events::{Event, EventKind};

/// Logging subscriber (enabled via the `logging` feature).
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates the writer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let record = e.record.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ProcessStarted => {
                tracing::info!(target: "launchvisor::events", record, execution = ?e.execution, descriptor = ?e.descriptor, "process started");
            }
            EventKind::ProcessTerminated => {
                tracing::info!(
                    target: "launchvisor::events",
                    record,
                    execution = ?e.execution,
                    exit_code = ?e.exit_code,
                    termination = e.termination.map(|t| t.as_str()),
                    "process terminated"
                );
            }
            EventKind::LaunchNotStarted => {
                tracing::warn!(target: "launchvisor::events", record, execution = ?e.execution, reason = e.reason.as_deref(), "launch not started");
            }
            EventKind::RecordChanged if e.previous.is_some() => {
                tracing::debug!(target: "launchvisor::events", record, previous = e.previous.as_deref(), "record renamed");
            }
            kind => {
                tracing::debug!(
                    target: "launchvisor::events",
                    record,
                    execution = ?e.execution,
                    state = e.state.map(|s| s.as_str()),
                    "{kind:?}"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
