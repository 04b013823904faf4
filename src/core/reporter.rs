//! # Launch failure reporting.
//!
//! Failures that are not cancellations go to an [`ErrorReporter`] (the
//! user-facing error surface). Reports are delivered on the foreground
//! context, after the failure has been logged.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LaunchError;
use crate::model::ExecutionEnvironment;

/// User-facing error surface.
#[async_trait]
pub trait ErrorReporter: Send + Sync + 'static {
    /// Reports a failed launch.
    async fn report(&self, env: &ExecutionEnvironment, error: &LaunchError);
}

/// One reported failure.
#[derive(Clone, Debug)]
pub struct FailureReport {
    /// Unique id of the record.
    pub record: String,
    /// Execution id.
    pub execution: u64,
    /// The failure.
    pub error: LaunchError,
}

/// Forwards reports into a channel.
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<FailureReport>,
}

impl ChannelReporter {
    /// Creates the reporter and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FailureReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ErrorReporter for ChannelReporter {
    async fn report(&self, env: &ExecutionEnvironment, error: &LaunchError) {
        let report = FailureReport {
            record: env.record().unique_id(),
            execution: env.execution_id(),
            error: error.clone(),
        };
        if self.tx.send(report).is_err() {
            tracing::debug!(execution = env.execution_id(), "failure report dropped: receiver closed");
        }
    }
}
