//! # Execution environments.
//!
//! An [`ExecutionEnvironment`] is one unit of launch work: a snapshot of the
//! configuration, the chosen [`Executor`], an [`ExecutionTarget`], and a unique
//! execution id. The coordinator treats it as opaque except for the metadata
//! tags it owns (rerun marker, session id).
//!
//! ## Identity
//! ```text
//! execution_id  unique per environment (new for every launch and nested copy)
//! session_id    shared by an environment and every nested copy made from it
//! ancestors     unique ids of the outer launches a nested copy was made under
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::model::record::{ConfigurationRecord, RecordHandle};
use crate::process::ContentDescriptor;

static NEXT_EXECUTION: AtomicU64 = AtomicU64::new(1);
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Strategy selecting *how* a configuration launches (run, debug, profile...).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Executor {
    id: Arc<str>,
    action: Arc<str>,
}

impl Executor {
    /// Id of the default "Run" executor.
    pub const RUN: &'static str = "Run";
    /// Id of the "Debug" executor.
    pub const DEBUG: &'static str = "Debug";

    /// Creates an executor with the given id and action name.
    pub fn new(id: impl Into<Arc<str>>, action: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
        }
    }

    /// The default "Run" executor.
    pub fn run() -> Self {
        Self::new(Self::RUN, "Run")
    }

    /// The "Debug" executor.
    pub fn debug() -> Self {
        Self::new(Self::DEBUG, "Debug")
    }

    /// Executor id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Action name (for messages).
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Where the process runs. Only the id is meaningful to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecutionTarget {
    id: Arc<str>,
}

impl ExecutionTarget {
    /// Creates a target.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    /// The default local target.
    pub fn local() -> Self {
        Self::new("local")
    }

    /// Target id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for ExecutionTarget {
    fn default() -> Self {
        Self::local()
    }
}

/// One launch request.
#[derive(Clone)]
pub struct ExecutionEnvironment {
    execution_id: u64,
    session_id: u64,
    record: Arc<ConfigurationRecord>,
    executor: Executor,
    target: ExecutionTarget,
    runner_id: Option<Arc<str>>,
    content_to_reuse: Option<Arc<ContentDescriptor>>,
    ancestors: Arc<[String]>,
    rerun: bool,
}

impl fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("execution_id", &self.execution_id)
            .field("session_id", &self.session_id)
            .field("record", &self.record.unique_id())
            .field("executor", &self.executor.id())
            .field("target", &self.target.id())
            .field("runner_id", &self.runner_id)
            .field("reuse", &self.content_to_reuse.as_ref().map(|d| d.id()))
            .field("ancestors", &self.ancestors)
            .field("rerun", &self.rerun)
            .finish()
    }
}

impl ExecutionEnvironment {
    /// Creates an environment for `record` on the local target with a new session.
    pub fn new(record: ConfigurationRecord, executor: Executor) -> Self {
        Self {
            execution_id: NEXT_EXECUTION.fetch_add(1, AtomicOrdering::Relaxed),
            session_id: NEXT_SESSION.fetch_add(1, AtomicOrdering::Relaxed),
            record: Arc::new(record),
            executor,
            target: ExecutionTarget::local(),
            runner_id: None,
            content_to_reuse: None,
            ancestors: Vec::new().into(),
            rerun: false,
        }
    }

    /// Builds the environment for a nested launch (a before-run task running
    /// another configuration): a copy with `content_to_reuse` cleared, a new
    /// execution id, and the outer session id.
    pub fn nested(&self, record: ConfigurationRecord) -> Self {
        let ancestors = self
            .ancestors
            .iter()
            .cloned()
            .chain(std::iter::once(self.record.unique_id()))
            .collect();
        Self {
            execution_id: NEXT_EXECUTION.fetch_add(1, AtomicOrdering::Relaxed),
            session_id: self.session_id,
            record: Arc::new(record),
            executor: self.executor.clone(),
            target: self.target.clone(),
            runner_id: None,
            content_to_reuse: None,
            ancestors,
            rerun: false,
        }
    }

    /// Builder: sets the target.
    pub fn with_target(mut self, target: ExecutionTarget) -> Self {
        self.target = target;
        self
    }

    /// Builder: pins a runner id instead of resolving one by executor.
    pub fn with_runner(mut self, runner_id: impl Into<Arc<str>>) -> Self {
        self.runner_id = Some(runner_id.into());
        self
    }

    /// Builder: asks the runner to reuse an existing content descriptor.
    pub fn with_content_to_reuse(mut self, descriptor: Arc<ContentDescriptor>) -> Self {
        self.content_to_reuse = Some(descriptor);
        self
    }

    /// Unique execution id.
    pub fn execution_id(&self) -> u64 {
        self.execution_id
    }

    /// Session id shared with nested environments.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Configuration snapshot.
    pub fn record(&self) -> &ConfigurationRecord {
        &self.record
    }

    /// Shared configuration snapshot.
    pub fn record_arc(&self) -> Arc<ConfigurationRecord> {
        Arc::clone(&self.record)
    }

    /// Identity of the run profile (used to key pending restarts).
    pub fn profile(&self) -> RecordHandle {
        self.record.handle()
    }

    /// Executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Target.
    pub fn target(&self) -> &ExecutionTarget {
        &self.target
    }

    /// Runner id, once resolved (or pinned).
    pub fn runner_id(&self) -> Option<&str> {
        self.runner_id.as_deref()
    }

    /// Descriptor the runner should reuse, if any.
    pub fn content_to_reuse(&self) -> Option<&Arc<ContentDescriptor>> {
        self.content_to_reuse.as_ref()
    }

    /// Unique ids of the launches this one is nested in, outermost first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// True if `unique_id` is this launch's configuration or one it is nested in.
    pub fn is_within(&self, unique_id: &str) -> bool {
        self.record.unique_id() == unique_id || self.ancestors.iter().any(|a| a == unique_id)
    }

    /// True if this launch replaces running instances.
    pub fn is_rerun(&self) -> bool {
        self.rerun
    }

    pub(crate) fn set_runner_id(&mut self, runner_id: Arc<str>) {
        self.runner_id = Some(runner_id);
    }

    pub(crate) fn mark_rerun(&mut self) {
        self.rerun = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeProcess;

    #[test]
    fn nested_copy_clears_reuse_and_keeps_session() {
        let outer_rec = ConfigurationRecord::new("app", "T");
        let desc = ContentDescriptor::new("app", FakeProcess::arc());
        let outer = ExecutionEnvironment::new(outer_rec, Executor::run())
            .with_content_to_reuse(desc)
            .with_target(ExecutionTarget::new("docker"));

        let nested = outer.nested(ConfigurationRecord::new("build", "T"));
        assert!(nested.content_to_reuse().is_none());
        assert_eq!(nested.session_id(), outer.session_id());
        assert_ne!(nested.execution_id(), outer.execution_id());
        assert_eq!(nested.target().id(), "docker");
        assert_eq!(nested.record().name, "build");

        let deeper = nested.nested(ConfigurationRecord::new("lint", "T"));
        assert_eq!(deeper.ancestors(), &["T.app".to_string(), "T.build".to_string()][..]);
        assert!(deeper.is_within("T.app"));
        assert!(!deeper.is_within("T.other"));
        assert!(outer.ancestors().is_empty());
    }
}
