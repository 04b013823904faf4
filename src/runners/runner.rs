//! # Program runners.
//!
//! A [`ProgramRunner`] turns an [`ExecutionEnvironment`] into a started
//! process wrapped in a [`ContentDescriptor`]. The coordinator picks the first
//! registered runner accepting the `(executor, record)` pair, unless the
//! environment pins a runner id.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use launchvisor::{
//!     ConfigurationRecord, ContentDescriptor, ExecutionEnvironment, LaunchError, ProgramRunner,
//! };
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl ProgramRunner for Noop {
//!     fn id(&self) -> &str { "noop" }
//!     fn can_run(&self, _executor: &str, _record: &ConfigurationRecord) -> bool { true }
//!     async fn execute(
//!         &self,
//!         _env: &ExecutionEnvironment,
//!     ) -> Result<Option<Arc<ContentDescriptor>>, LaunchError> {
//!         Ok(None)
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::LaunchError;
use crate::model::{ConfigurationRecord, ExecutionEnvironment, ExecutionTarget};
use crate::process::ContentDescriptor;

/// Shared runner handle.
pub type RunnerRef = Arc<dyn ProgramRunner>;

/// Starts processes for configurations.
#[async_trait]
pub trait ProgramRunner: Send + Sync + 'static {
    /// Stable runner id.
    fn id(&self) -> &str;

    /// True if this runner handles `record` for `executor_id`.
    fn can_run(&self, executor_id: &str, record: &ConfigurationRecord) -> bool;

    /// True if `target` is reachable for `record`.
    fn can_run_on_target(&self, _target: &ExecutionTarget, _record: &ConfigurationRecord) -> bool {
        true
    }

    /// Starts the process. `Ok(None)` means nothing was started.
    ///
    /// The returned process must not be started yet: the coordinator attaches
    /// its listener first and then calls `start_notify`.
    async fn execute(
        &self,
        env: &ExecutionEnvironment,
    ) -> Result<Option<Arc<ContentDescriptor>>, LaunchError>;
}

/// Registered runners in registration order.
#[derive(Default)]
pub struct RunnerRegistry {
    runners: RwLock<Vec<RunnerRef>>,
}

impl RunnerRegistry {
    /// Creates a registry with the given runners.
    pub fn new(runners: impl IntoIterator<Item = RunnerRef>) -> Self {
        let registry = Self::default();
        for r in runners {
            registry.register(r);
        }
        registry
    }

    /// Registers a runner, replacing one with the same id in place.
    pub fn register(&self, runner: RunnerRef) {
        let mut runners = self.runners.write();
        match runners.iter_mut().find(|r| r.id() == runner.id()) {
            Some(slot) => *slot = runner,
            None => runners.push(runner),
        }
    }

    /// First runner accepting `(executor_id, record)`.
    pub fn find(&self, executor_id: &str, record: &ConfigurationRecord) -> Option<RunnerRef> {
        self.runners
            .read()
            .iter()
            .find(|r| r.can_run(executor_id, record))
            .cloned()
    }

    /// Runner registered under `id`.
    pub fn by_id(&self, id: &str) -> Option<RunnerRef> {
        self.runners.read().iter().find(|r| r.id() == id).cloned()
    }

    /// Number of registered runners.
    pub fn len(&self) -> usize {
        self.runners.read().len()
    }

    /// True if no runner is registered.
    pub fn is_empty(&self) -> bool {
        self.runners.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Executor;
    use crate::testkit::FakeRunner;

    #[test]
    fn find_returns_the_first_accepting_runner() {
        let debug_only = FakeRunner::new("debugger").with_executor(Executor::DEBUG).arc();
        let any = FakeRunner::new("any").arc();
        let registry = RunnerRegistry::new([debug_only as RunnerRef, any]);
        let rec = ConfigurationRecord::new("app", "App");

        assert_eq!(registry.find(Executor::DEBUG, &rec).map(|r| r.id().to_string()).as_deref(), Some("debugger"));
        assert_eq!(registry.find(Executor::RUN, &rec).map(|r| r.id().to_string()).as_deref(), Some("any"));
        assert!(registry.by_id("debugger").is_some());
    }

    #[test]
    fn register_replaces_by_id() {
        let registry = RunnerRegistry::new([FakeRunner::new("a").arc() as RunnerRef]);
        registry.register(FakeRunner::new("a").with_executor(Executor::DEBUG).arc());
        assert_eq!(registry.len(), 1);
        assert!(registry.find(Executor::RUN, &ConfigurationRecord::new("x", "T")).is_none());
    }
}
