//! # Built-in command runner.
//!
//! [`CommandRunner`] launches records carrying a [`CommandLine`](crate::model::CommandLine)
//! as OS processes ([`ChildProcess`]) for the `Run` executor.

use std::sync::Arc;

use async_trait::async_trait;

use super::runner::ProgramRunner;
use crate::error::LaunchError;
use crate::model::{ConfigurationRecord, ExecutionEnvironment, Executor};
use crate::process::{ChildProcess, ContentDescriptor};

/// Runner id of [`CommandRunner`].
pub const COMMAND_RUNNER: &str = "command";

/// Spawns the record's command line.
#[derive(Debug, Default)]
pub struct CommandRunner;

impl CommandRunner {
    /// Creates the runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProgramRunner for CommandRunner {
    fn id(&self) -> &str {
        COMMAND_RUNNER
    }

    fn can_run(&self, executor_id: &str, record: &ConfigurationRecord) -> bool {
        executor_id == Executor::RUN && record.command.is_some()
    }

    async fn execute(
        &self,
        env: &ExecutionEnvironment,
    ) -> Result<Option<Arc<ContentDescriptor>>, LaunchError> {
        let record = env.record();
        let Some(command) = &record.command else {
            return Ok(None);
        };
        let process = ChildProcess::spawn(command).map_err(|e| LaunchError::StartFailed {
            message: format!("{}: {e}", command.program),
        })?;
        let descriptor = ContentDescriptor::new(record.name.clone(), process);
        // A previous instance that is still alive keeps its descriptor.
        if let Some(previous) = env
            .content_to_reuse()
            .filter(|d| d.is_reusable() && d.process().is_terminated())
        {
            previous.dispose();
        }
        Ok(Some(descriptor))
    }
}
