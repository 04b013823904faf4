//! # Built-in provider: run another configuration first.
//!
//! Tasks created with [`BeforeRunTask::run_configuration`] name a stored
//! configuration in `target`. The provider launches it in a nested
//! environment (same session, no content reuse) and waits for the process to
//! end; a non-zero or missing exit code vetoes the outer launch. A target that
//! is already part of the nesting chain fails the task.

use std::sync::Arc;

use async_trait::async_trait;

use super::provider::{BeforeRunContext, BeforeRunProvider};
use crate::error::BeforeRunError;
use crate::model::BeforeRunTask;
use crate::store::ConfigurationStore;

/// Provider id of [`RunConfigurationTask`].
pub const RUN_CONFIGURATION_PROVIDER: &str = "RunConfigurationTask";

/// Launches the task's target configuration and waits for it.
pub struct RunConfigurationTask {
    store: Arc<ConfigurationStore>,
}

impl RunConfigurationTask {
    /// Creates the provider over `store`.
    pub fn new(store: Arc<ConfigurationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BeforeRunProvider for RunConfigurationTask {
    fn id(&self) -> &str {
        RUN_CONFIGURATION_PROVIDER
    }

    async fn execute(
        &self,
        ctx: &BeforeRunContext,
        task: &BeforeRunTask,
    ) -> Result<bool, BeforeRunError> {
        let Some(target) = task.target.as_deref() else {
            return Err(BeforeRunError::failed("no configuration to run"));
        };
        if ctx.environment().is_within(target) {
            return Err(BeforeRunError::failed(format!(
                "cyclic before-run dependency on '{target}'"
            )));
        }
        let Some(record) = self.store.get(target) else {
            return Err(BeforeRunError::failed(format!(
                "unknown configuration '{target}'"
            )));
        };
        let Some(launcher) = ctx.launcher() else {
            return Err(BeforeRunError::failed("nested launches are not available"));
        };

        let env = ctx.environment().nested(record.as_ref().clone());
        tracing::debug!(
            record = %target,
            session = env.session_id(),
            execution = env.execution_id(),
            "running configuration before launch"
        );
        match launcher.launch_and_wait(env).await {
            Ok(code) => Ok(code == Some(0)),
            Err(e) if e.is_cancellation() => Err(BeforeRunError::Canceled),
            Err(e) => Err(BeforeRunError::failed(e.to_string())),
        }
    }
}
