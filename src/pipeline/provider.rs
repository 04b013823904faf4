//! # Before-run providers.
//!
//! A [`BeforeRunProvider`] executes the tasks whose `provider_id` matches its
//! [`id`](BeforeRunProvider::id). Providers run off the coordinator's
//! foreground loop and receive a [`BeforeRunContext`]: the outer environment,
//! the coordinator's cancellation token, and (when running under a
//! coordinator) a [`NestedLauncher`] for launching other configurations.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use launchvisor::{BeforeRunContext, BeforeRunError, BeforeRunProvider, BeforeRunTask};
//!
//! struct Lint;
//!
//! #[async_trait]
//! impl BeforeRunProvider for Lint {
//!     fn id(&self) -> &str { "lint" }
//!
//!     async fn execute(
//!         &self,
//!         ctx: &BeforeRunContext,
//!         _task: &BeforeRunTask,
//!     ) -> Result<bool, BeforeRunError> {
//!         if ctx.token().is_cancelled() {
//!             return Err(BeforeRunError::Canceled);
//!         }
//!         Ok(true)
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{BeforeRunError, LaunchError};
use crate::model::{BeforeRunTask, ExecutionEnvironment};

/// Shared provider handle.
pub type ProviderRef = Arc<dyn BeforeRunProvider>;

/// A pre-launch step implementation.
#[async_trait]
pub trait BeforeRunProvider: Send + Sync + 'static {
    /// Provider id, matched against [`BeforeRunTask::provider_id`].
    fn id(&self) -> &str;

    /// Runs one task.
    ///
    /// `Ok(true)` continues the pipeline, `Ok(false)` vetoes the launch
    /// silently. [`BeforeRunError::Canceled`] is silent as well; any other
    /// error fails the launch and is reported.
    async fn execute(
        &self,
        ctx: &BeforeRunContext,
        task: &BeforeRunTask,
    ) -> Result<bool, BeforeRunError>;
}

/// Launches another configuration and waits for it to end.
#[async_trait]
pub trait NestedLauncher: Send + Sync + 'static {
    /// Runs the full launch pipeline for `env`. Resolves with the exit code
    /// once the process terminates.
    async fn launch_and_wait(&self, env: ExecutionEnvironment) -> Result<Option<i32>, LaunchError>;
}

/// What a provider sees of the launch it runs for.
#[derive(Clone)]
pub struct BeforeRunContext {
    environment: ExecutionEnvironment,
    token: CancellationToken,
    launcher: Option<Arc<dyn NestedLauncher>>,
}

impl BeforeRunContext {
    /// Creates a context without nested launch support.
    pub fn new(environment: ExecutionEnvironment, token: CancellationToken) -> Self {
        Self {
            environment,
            token,
            launcher: None,
        }
    }

    /// Builder: enables nested launches.
    pub fn with_launcher(mut self, launcher: Arc<dyn NestedLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Environment of the launch being prepared.
    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    /// Cancelled when the coordinator is disposed.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Nested launcher, if available.
    pub fn launcher(&self) -> Option<&Arc<dyn NestedLauncher>> {
        self.launcher.as_ref()
    }
}
