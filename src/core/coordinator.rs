//! # ExecutionCoordinator: drives launches from request to termination.
//!
//! The [`ExecutionCoordinator`] owns the running registry, the in-progress
//! markers and the pending-restart map. It resolves runners, applies the
//! conflict policy, runs the before-run pipeline and starts processes on the
//! foreground loop.
//!
//! ## Launch path
//! ```text
//! execute(env)
//!   ├─ resolve runner, can_run checks ── fail ──► LaunchNotStarted (+ report)
//!   ├─ admission (short lock):
//!   │    no conflicts, nothing starting, no pending restart?
//!   │      └─ yes ──► marker + Scheduled ──► spawn launch
//!   └─ otherwise ──► conflict policy ──► stop conflicts ──► pending restart (poll loop)
//!
//! launch (background task)
//!   Scheduled ──► BeforeRun (pipeline, if any tasks) ──► indexing gate
//!             ──► foreground: Starting ──► runner.execute
//!                   ├─ descriptor ──► running registry, marker released,
//!                   │                 ProcessStarted, relay attached, start_notify
//!                   └─ error/none ──► Failed: marker released, LaunchNotStarted
//!
//! relay (process callbacks)
//!   terminating ──► ProcessTerminating
//!   terminated  ──► entry removed, ProcessTerminated(reason), RefreshScheduled
//! ```
//!
//! ## Rules
//! - Every exit path releases the marker it holds and completes waiters.
//! - A pending restart is identified by its `Arc`; a newer request for the
//!   same profile replaces it and the older poll loop abandons itself.
//! - Failures are logged and reported; cancellations are neither.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::config::CoordinatorConfig;
use super::foreground::Foreground;
use super::indexing::IndexingGate;
use super::markers::{InProgress, InProgressMarker};
use super::relay::ProcessRelay;
use super::reporter::ErrorReporter;
use super::restart::{self, PendingRestart};
use super::state::LaunchState;
use crate::error::LaunchError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{ExecutionEnvironment, RecordHandle};
use crate::pipeline::{BeforeRunContext, BeforeRunPipeline, NestedLauncher};
use crate::policies::{ConfirmRerun, ConflictContext, ConflictDecision, ConflictPolicy};
use crate::process::{request_stop, ContentDescriptor, TerminationReason};
use crate::registry::ConfigurationRegistry;
use crate::runners::{RunnerRef, RunnerRegistry};
use crate::running::{RunningEntry, RunningRegistry};
use crate::store::ConfigurationStore;

/// What [`ExecutionCoordinator::execute`] did with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The launch was admitted and is on its way.
    Scheduled,
    /// The launch waits for conflicting or starting instances.
    Awaiting,
    /// Nothing was launched (policy or user declined).
    Declined,
}

pub(crate) type Completion = oneshot::Sender<Result<Option<i32>, LaunchError>>;

/// Running instances a launch conflicts with.
#[derive(Default)]
pub(crate) struct Conflicts {
    pub(crate) same: Vec<Arc<ContentDescriptor>>,
    pub(crate) incompatible: Vec<Arc<ContentDescriptor>>,
}

impl Conflicts {
    pub(crate) fn is_empty(&self) -> bool {
        self.same.is_empty() && self.incompatible.is_empty()
    }

    pub(crate) fn all(&self) -> Vec<Arc<ContentDescriptor>> {
        self.same.iter().chain(&self.incompatible).cloned().collect()
    }
}

pub(crate) struct Inner {
    pub(crate) cfg: CoordinatorConfig,
    pub(crate) bus: Bus,
    pub(crate) store: Arc<ConfigurationStore>,
    pub(crate) registry: Arc<ConfigurationRegistry>,
    pub(crate) runners: Arc<RunnerRegistry>,
    pub(crate) pipeline: Arc<BeforeRunPipeline>,
    pub(crate) running: Arc<RunningRegistry>,
    pub(crate) policy: Arc<dyn ConflictPolicy>,
    pub(crate) confirm: Arc<dyn ConfirmRerun>,
    pub(crate) reporter: Option<Arc<dyn ErrorReporter>>,
    pub(crate) indexing: IndexingGate,
    pub(crate) foreground: Foreground,
    pub(crate) token: CancellationToken,

    pub(crate) in_progress: InProgress,
    pub(crate) awaiting: DashMap<RecordHandle, Arc<PendingRestart>>,
    pub(crate) states: DashMap<u64, LaunchState>,
    pub(crate) completions: DashMap<u64, Completion>,
    pub(crate) admission: Mutex<()>,
}

/// Drives run configurations from launch request to termination.
///
/// Cheap to clone (shared internals). Build with
/// [`CoordinatorBuilder`](crate::CoordinatorBuilder).
#[derive(Clone)]
pub struct ExecutionCoordinator {
    inner: Arc<Inner>,
}

impl ExecutionCoordinator {
    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Requests a launch of `env`.
    ///
    /// Conflicting running instances are handled by the conflict policy; if
    /// any must stop first (or a launch of the same configuration is still
    /// starting) the launch waits and `Awaiting` is returned.
    pub async fn execute(&self, env: ExecutionEnvironment) -> Result<LaunchOutcome, LaunchError> {
        self.inner.execute(env).await
    }

    /// Launches `env` and resolves with the exit code once the process ends.
    pub async fn launch_and_wait(&self, env: ExecutionEnvironment) -> Result<Option<i32>, LaunchError> {
        self.inner.launch_and_wait(env).await
    }

    /// Launches the configuration of a running (or finished) entry again,
    /// reusing its content descriptor.
    pub async fn restart(&self, entry: &RunningEntry) -> Result<LaunchOutcome, LaunchError> {
        let snapshot = entry.record();
        let record = self
            .inner
            .store
            .get(&snapshot.unique_id())
            .filter(|r| r.handle() == snapshot.handle())
            .map_or_else(|| snapshot.clone(), |r| r.as_ref().clone());
        let previous = entry.environment();
        let mut env = ExecutionEnvironment::new(record, previous.executor().clone())
            .with_target(previous.target().clone())
            .with_content_to_reuse(Arc::clone(entry.descriptor()));
        if let Some(runner) = previous.runner_id() {
            env = env.with_runner(runner);
        }
        self.inner.execute(env).await
    }

    /// Stops a running process (user stop). Does not wait for termination.
    pub fn stop(&self, descriptor: &ContentDescriptor) {
        let process = descriptor.process();
        process.mark_termination(TerminationReason::UserStop);
        request_stop(process.as_ref());
    }

    /// Live entries whose record matches `pred`.
    pub fn running(&self, pred: impl Fn(&crate::model::ConfigurationRecord) -> bool) -> Vec<RunningEntry> {
        self.inner.running.find(pred)
    }

    /// Live entries of the record with `unique_id`.
    pub fn running_for(&self, unique_id: &str) -> Vec<RunningEntry> {
        self.inner.running.for_record(unique_id)
    }

    /// Live entries started with `executor_id`.
    pub fn running_by_executor(&self, executor_id: &str) -> Vec<RunningEntry> {
        self.inner.running.by_executor(executor_id)
    }

    /// True while a launch of `(record, executor, runner)` is scheduled but not started.
    pub fn is_starting(&self, record: &str, executor: &str, runner: &str) -> bool {
        self.inner
            .in_progress
            .contains(&InProgressMarker::new(record, executor, runner))
    }

    /// True while a restart of `profile` waits for conflicts to clear.
    pub fn is_awaiting(&self, profile: RecordHandle) -> bool {
        self.inner.awaiting.contains_key(&profile)
    }

    /// Current state of a launch; `None` once it reached a terminal state.
    pub fn state_of(&self, execution_id: u64) -> Option<LaunchState> {
        self.inner.states.get(&execution_id).map(|s| *s)
    }

    /// Configuration store.
    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.inner.store
    }

    /// Type registry.
    pub fn registry(&self) -> &Arc<ConfigurationRegistry> {
        &self.inner.registry
    }

    /// Runner registry.
    pub fn runners(&self) -> &Arc<RunnerRegistry> {
        &self.inner.runners
    }

    /// Before-run pipeline (provider map).
    pub fn pipeline(&self) -> &Arc<BeforeRunPipeline> {
        &self.inner.pipeline
    }

    /// Running registry.
    pub fn running_registry(&self) -> &Arc<RunningRegistry> {
        &self.inner.running
    }

    /// Indexing gate.
    pub fn indexing(&self) -> &IndexingGate {
        &self.inner.indexing
    }

    /// Event bus.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Configuration in use.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.cfg
    }

    /// Tears down (project close): cancels background work, drops markers
    /// and pending restarts, fails outstanding waits with `Closed`.
    ///
    /// Running processes are left alone. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Inner {
    // ---- admission -------------------------------------------------------

    pub(crate) async fn execute(self: &Arc<Self>, mut env: ExecutionEnvironment) -> Result<LaunchOutcome, LaunchError> {
        if self.token.is_cancelled() {
            return Err(LaunchError::Closed);
        }
        let runner = match self.resolve_runner(&mut env) {
            Ok(runner) => runner,
            Err(e) => {
                self.not_started(&env, None, e.clone());
                return Err(e);
            }
        };
        let marker = InProgressMarker::of(&env);

        let conflicts = {
            let _admission = self.admission.lock();
            let conflicts = self.conflicts(&env);
            let free = conflicts.is_empty()
                && !self.awaiting.contains_key(&env.profile())
                && !self.is_blocked(&env, &marker);
            if free {
                self.schedule(&env, &marker);
                None
            } else {
                Some(conflicts)
            }
        };
        let Some(conflicts) = conflicts else {
            self.scheduled(&env);
            self.spawn_launch(env, runner, marker);
            return Ok(LaunchOutcome::Scheduled);
        };

        if !conflicts.is_empty() {
            if !self.resolve_conflicts(&env, &conflicts).await? {
                tracing::debug!(record = %env.record().unique_id(), "rerun declined");
                return Ok(LaunchOutcome::Declined);
            }
            env.mark_rerun();
        }

        let pending = Arc::new(PendingRestart::new(env, runner, conflicts.all()));
        let profile = pending.env.profile();
        if let Some(previous) = self.awaiting.insert(profile, Arc::clone(&pending)) {
            tracing::debug!(
                record = %pending.env.record().unique_id(),
                superseded = previous.env.execution_id(),
                "pending restart replaced"
            );
        }
        self.bus.publish(
            Event::new(EventKind::RestartAwaiting)
                .with_record(pending.env.record().unique_id())
                .with_execution(pending.env.execution_id()),
        );
        tokio::spawn(restart::await_restart(Arc::clone(self), pending));
        Ok(LaunchOutcome::Awaiting)
    }

    pub(crate) async fn launch_and_wait(self: &Arc<Self>, env: ExecutionEnvironment) -> Result<Option<i32>, LaunchError> {
        let id = env.execution_id();
        let (tx, rx) = oneshot::channel();
        self.completions.insert(id, tx);
        match self.execute(env).await {
            Ok(LaunchOutcome::Declined) => {
                self.completions.remove(&id);
                return Err(LaunchError::Canceled);
            }
            Err(e) => {
                self.completions.remove(&id);
                return Err(e);
            }
            Ok(_) => {}
        }
        rx.await.unwrap_or(Err(LaunchError::Closed))
    }

    fn resolve_runner(&self, env: &mut ExecutionEnvironment) -> Result<RunnerRef, LaunchError> {
        let record = env.record();
        let executor = env.executor().id();
        let runner = match env.runner_id() {
            Some(id) => self.runners.by_id(id),
            None => self.runners.find(executor, record),
        };
        let Some(runner) = runner else {
            tracing::error!(
                record = %record.unique_id(),
                executor,
                "no runner registered for executor"
            );
            return Err(LaunchError::RunnerNotFound {
                record: record.unique_id(),
                executor: executor.to_string(),
            });
        };
        if !runner.can_run(executor, record) || !runner.can_run_on_target(env.target(), record) {
            return Err(LaunchError::CannotRun {
                record: record.unique_id(),
                executor: executor.to_string(),
            });
        }
        self.registry.can_run(record, env.executor())?;
        env.set_runner_id(Arc::from(runner.id()));
        Ok(runner)
    }

    /// Running instances `env` conflicts with.
    pub(crate) fn conflicts(&self, env: &ExecutionEnvironment) -> Conflicts {
        let record = env.record();
        let id = record.unique_id();
        let same = if record.allows_parallel() {
            Vec::new()
        } else {
            self.running
                .for_record(&id)
                .into_iter()
                .map(|e| Arc::clone(e.descriptor()))
                .collect()
        };
        let incompatible = self
            .running
            .find(|r| r.unique_id() != id && record.is_incompatible_with(&r.unique_id()))
            .into_iter()
            .map(|e| Arc::clone(e.descriptor()))
            .collect();
        Conflicts { same, incompatible }
    }

    /// True if a launch holding `marker` may not be admitted yet.
    pub(crate) fn is_blocked(&self, env: &ExecutionEnvironment, marker: &InProgressMarker) -> bool {
        self.in_progress.contains(marker)
            || (!env.record().allows_parallel() && self.in_progress.any_for_record(&marker.record))
    }

    /// Applies the conflict policy. On `Ok(true)` the conflicts were asked to stop.
    pub(crate) async fn resolve_conflicts(
        &self,
        env: &ExecutionEnvironment,
        conflicts: &Conflicts,
    ) -> Result<bool, LaunchError> {
        let decision = self.policy.decide(&ConflictContext {
            record: env.record(),
            same: &conflicts.same,
            incompatible: &conflicts.incompatible,
            reuse: env.content_to_reuse(),
        });
        let proceed = match decision {
            ConflictDecision::NoAction => false,
            ConflictDecision::Proceed => true,
            ConflictDecision::Ask => {
                let confirm = Arc::clone(&self.confirm);
                let record = env.record_arc();
                let all = conflicts.all();
                self.foreground
                    .call(async move { confirm.confirm(&record, &all).await })
                    .await
                    .ok_or(LaunchError::Closed)?
            }
        };
        if proceed {
            for desc in conflicts.all() {
                tracing::debug!(
                    record = %env.record().unique_id(),
                    descriptor = desc.id(),
                    "stopping conflicting instance"
                );
                desc.process().mark_termination(TerminationReason::Rerun);
                request_stop(desc.process().as_ref());
            }
        }
        Ok(proceed)
    }

    /// Registers the marker and the `Scheduled` state. Called under admission.
    pub(crate) fn schedule(&self, env: &ExecutionEnvironment, marker: &InProgressMarker) {
        self.in_progress.insert(marker.clone());
        self.advance(env, LaunchState::Scheduled);
    }

    /// Side effects of scheduling, run after admission is released.
    pub(crate) fn scheduled(&self, env: &ExecutionEnvironment) {
        let id = env.record().unique_id();
        self.store.set_recent_executor(&id, env.executor().id());
        self.store.refresh_usage(&id);
        tracing::debug!(record = %id, execution = env.execution_id(), "launch scheduled");
        self.bus.publish(
            Event::new(EventKind::LaunchScheduled)
                .with_record(id)
                .with_execution(env.execution_id())
                .with_executor(env.executor().id())
                .with_state(LaunchState::Scheduled),
        );
    }

    pub(crate) fn lock_admission(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.admission.lock()
    }

    // ---- launch ----------------------------------------------------------

    pub(crate) fn spawn_launch(self: &Arc<Self>, env: ExecutionEnvironment, runner: RunnerRef, marker: InProgressMarker) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.launch(env, runner, marker).await });
    }

    async fn launch(self: Arc<Self>, env: ExecutionEnvironment, runner: RunnerRef, marker: InProgressMarker) {
        let tasks = self.registry.effective_before_run(env.record());
        if !tasks.is_empty() {
            self.advance(&env, LaunchState::BeforeRun);
            self.bus.publish(
                Event::new(EventKind::BeforeRunStarted)
                    .with_record(env.record().unique_id())
                    .with_execution(env.execution_id())
                    .with_state(LaunchState::BeforeRun),
            );
            let launcher: Arc<dyn NestedLauncher> = Arc::new(CoordinatorLauncher(Arc::downgrade(&self)));
            let ctx = BeforeRunContext::new(env.clone(), self.token.child_token()).with_launcher(launcher);
            let execution = env.execution_id();
            let res = self
                .pipeline
                .run(&ctx, &tasks, || {
                    tracing::debug!(execution, "before-run pipeline canceled the launch");
                })
                .await;
            if let Err(e) = res {
                self.not_started(&env, Some(&marker), e);
                return;
            }
        }

        if !self.wait_for_indexing(&env).await {
            self.not_started(&env, Some(&marker), LaunchError::Closed);
            return;
        }

        let inner = Arc::clone(&self);
        let (env_fg, marker_fg) = (env.clone(), marker.clone());
        let done = self
            .foreground
            .call(async move { inner.start(env_fg, runner, marker_fg).await })
            .await;
        if done.is_none() {
            self.not_started(&env, Some(&marker), LaunchError::Closed);
        }
    }

    /// Waits while indexing runs, for types that are not indexing-aware.
    /// Returns false if the coordinator was disposed meanwhile.
    async fn wait_for_indexing(&self, env: &ExecutionEnvironment) -> bool {
        if self.registry.type_of(&env.record().type_id).is_indexing_aware() {
            return true;
        }
        let mut waits = 0u32;
        while !self.indexing.is_ready() {
            if waits > self.cfg.indexing_retry_limit {
                tracing::warn!(
                    record = %env.record().unique_id(),
                    "indexing still busy, starting anyway"
                );
                break;
            }
            tracing::debug!(record = %env.record().unique_id(), "launch deferred until indexing finishes");
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = self.indexing.wait_ready() => {}
            }
            waits += 1;
        }
        true
    }

    /// Final start step; runs on the foreground loop.
    async fn start(self: Arc<Self>, env: ExecutionEnvironment, runner: RunnerRef, marker: InProgressMarker) {
        if self.token.is_cancelled() {
            self.not_started(&env, Some(&marker), LaunchError::Closed);
            return;
        }
        self.advance(&env, LaunchState::Starting);
        self.bus.publish(
            Event::new(EventKind::LaunchStarting)
                .with_record(env.record().unique_id())
                .with_execution(env.execution_id())
                .with_state(LaunchState::Starting),
        );

        let res = AssertUnwindSafe(runner.execute(&env))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(LaunchError::StartFailed {
                    message: format!("runner '{}' panicked", runner.id()),
                })
            });
        match res {
            Ok(Some(desc)) => self.started(env, marker, desc),
            Ok(None) => self.not_started(&env, Some(&marker), LaunchError::NoDescriptor),
            Err(e) => self.not_started(&env, Some(&marker), e),
        }
    }

    fn started(self: &Arc<Self>, env: ExecutionEnvironment, marker: InProgressMarker, desc: Arc<ContentDescriptor>) {
        self.running.add(RunningEntry::new(Arc::clone(&desc), env.clone()));
        let running = Arc::downgrade(&self.running);
        let id = desc.id();
        desc.on_dispose(move || {
            if let Some(running) = running.upgrade() {
                running.remove(id);
            }
        });
        self.in_progress.remove(&marker);
        self.advance(&env, LaunchState::Running);

        tracing::info!(
            record = %env.record().unique_id(),
            execution = env.execution_id(),
            descriptor = id,
            "process started"
        );
        self.bus.publish(
            Event::new(EventKind::ProcessStarted)
                .with_record(env.record().unique_id())
                .with_execution(env.execution_id())
                .with_executor(env.executor().id())
                .with_descriptor(id)
                .with_state(LaunchState::Running),
        );

        let process = Arc::clone(desc.process());
        let relay = Arc::new(ProcessRelay::new(Arc::downgrade(self), env, desc));
        process.add_listener(relay.clone());
        relay.sync(process.as_ref());
        process.start_notify();
    }

    /// Failed terminal path: releases the marker, notifies, reports.
    pub(crate) fn not_started(&self, env: &ExecutionEnvironment, marker: Option<&InProgressMarker>, error: LaunchError) {
        if let Some(marker) = marker {
            self.in_progress.remove(marker);
        }
        self.advance(env, LaunchState::Failed);
        let record = env.record().unique_id();
        self.bus.publish(
            Event::new(EventKind::LaunchNotStarted)
                .with_record(record.as_str())
                .with_execution(env.execution_id())
                .with_state(LaunchState::Failed)
                .with_reason(error.as_label()),
        );

        if error.is_cancellation() {
            tracing::debug!(record = %record, execution = env.execution_id(), "launch canceled");
        } else {
            tracing::error!(
                record = %record,
                execution = env.execution_id(),
                label = error.as_label(),
                "launch failed: {error}"
            );
            if let Some(reporter) = &self.reporter {
                let reporter = Arc::clone(reporter);
                let (env, error) = (env.clone(), error.clone());
                self.foreground.post(async move { reporter.report(&env, &error).await });
            }
        }
        self.complete(env.execution_id(), Err(error));
    }

    // ---- process callbacks -------------------------------------------------

    pub(crate) fn process_terminating(&self, env: &ExecutionEnvironment, desc: &ContentDescriptor) {
        self.advance(env, LaunchState::Terminating);
        self.bus.publish(
            Event::new(EventKind::ProcessTerminating)
                .with_record(env.record().unique_id())
                .with_execution(env.execution_id())
                .with_descriptor(desc.id())
                .with_state(LaunchState::Terminating),
        );
    }

    pub(crate) fn process_terminated(&self, env: &ExecutionEnvironment, desc: &ContentDescriptor, exit_code: Option<i32>) {
        self.running.remove(desc.id());
        let reason = desc
            .process()
            .termination_reason()
            .unwrap_or(TerminationReason::Unknown);
        self.advance(env, LaunchState::Terminated);

        let record = env.record().unique_id();
        tracing::info!(
            record = %record,
            execution = env.execution_id(),
            exit_code = ?exit_code,
            reason = reason.as_str(),
            "process terminated"
        );
        self.bus.publish(
            Event::new(EventKind::ProcessTerminated)
                .with_record(record.as_str())
                .with_execution(env.execution_id())
                .with_descriptor(desc.id())
                .with_state(LaunchState::Terminated)
                .with_termination(reason)
                .with_exit_code(exit_code),
        );
        if self.cfg.refresh_on_termination {
            self.bus.publish(
                Event::new(EventKind::RefreshScheduled)
                    .with_record(record)
                    .with_execution(env.execution_id()),
            );
        }
        self.complete(env.execution_id(), Ok(exit_code));
    }

    // ---- bookkeeping -------------------------------------------------------

    fn advance(&self, env: &ExecutionEnvironment, next: LaunchState) {
        let id = env.execution_id();
        match self.states.entry(id) {
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                if !current.can_transition_to(next) {
                    tracing::warn!(
                        execution = id,
                        from = current.as_str(),
                        to = next.as_str(),
                        "unexpected launch transition"
                    );
                }
                if next.is_terminal() {
                    slot.remove();
                } else {
                    slot.insert(next);
                }
            }
            Entry::Vacant(slot) => {
                if !next.is_terminal() {
                    slot.insert(next);
                }
            }
        }
    }

    pub(crate) fn complete(&self, execution: u64, result: Result<Option<i32>, LaunchError>) {
        if let Some((_, tx)) = self.completions.remove(&execution) {
            let _ = tx.send(result);
        }
    }

    fn dispose(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.in_progress.clear();
        self.awaiting.clear();
        self.states.clear();
        let pending: Vec<u64> = self.completions.iter().map(|e| *e.key()).collect();
        for id in pending {
            self.complete(id, Err(LaunchError::Closed));
        }
        tracing::debug!("coordinator disposed");
    }
}

/// Nested launches for the before-run pipeline.
struct CoordinatorLauncher(Weak<Inner>);

#[async_trait]
impl NestedLauncher for CoordinatorLauncher {
    async fn launch_and_wait(&self, env: ExecutionEnvironment) -> Result<Option<i32>, LaunchError> {
        match self.0.upgrade() {
            Some(inner) => inner.launch_and_wait(env).await,
            None => Err(LaunchError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChannelReporter, CoordinatorBuilder};
    use crate::error::BeforeRunError;
    use crate::model::{BeforeRunTask, ConfigurationRecord, Executor, SimpleType};
    use crate::pipeline::ProviderFn;
    use crate::policies::{DefaultConflictPolicy, PollBackoff, SingletonPolicy};
    use crate::process::ProcessHandle;
    use crate::testkit::{FakeRunner, Recorder};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn builder(runner: &Arc<FakeRunner>) -> CoordinatorBuilder {
        let cfg = CoordinatorConfig {
            restart_poll: PollBackoff::immediate(),
            ..CoordinatorConfig::default()
        };
        ExecutionCoordinator::builder(cfg)
            .with_types([
                SimpleType::new("App").into_ref(),
                SimpleType::new("Aware").indexing_aware(true).into_ref(),
            ])
            .with_runner(runner.clone())
    }

    fn start(builder: CoordinatorBuilder) -> (ExecutionCoordinator, Arc<Recorder>) {
        let coord = builder.build();
        let recorder = Recorder::attach(coord.bus());
        (coord, recorder)
    }

    fn app(name: &str) -> ConfigurationRecord {
        ConfigurationRecord::new(name, "App")
    }

    fn run(record: &ConfigurationRecord) -> ExecutionEnvironment {
        ExecutionEnvironment::new(record.clone(), Executor::run())
    }

    fn position(recorder: &Recorder, kind: EventKind, nth: usize) -> usize {
        recorder
            .events()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == kind)
            .nth(nth)
            .map(|(i, _)| i)
            .expect("event present")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    struct Confirm {
        answer: AtomicBool,
        asked: AtomicUsize,
    }

    impl Confirm {
        fn arc(answer: bool) -> Arc<Self> {
            Arc::new(Self {
                answer: AtomicBool::new(answer),
                asked: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ConfirmRerun for Confirm {
        async fn confirm(&self, _: &ConfigurationRecord, _: &[Arc<ContentDescriptor>]) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn launch_runs_through_the_lifecycle() {
        let runner = FakeRunner::new("fake").arc();
        let (coord, recorder) = start(builder(&runner));
        let server = coord.store().add(app("server"));
        let env = run(&server);
        let exec = env.execution_id();

        assert_eq!(coord.execute(env).await.unwrap(), LaunchOutcome::Scheduled);
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        assert_eq!(coord.state_of(exec), Some(LaunchState::Running));
        assert_eq!(coord.running_for("App.server").len(), 1);
        assert_eq!(coord.running_by_executor(Executor::RUN).len(), 1);
        assert!(!coord.is_starting("App.server", Executor::RUN, "fake"));
        assert_eq!(runner.process(0).start_calls(), 1);
        assert_eq!(runner.env(0).runner_id(), Some("fake"));
        assert_eq!(coord.store().recent_executor("App.server").as_deref(), Some(Executor::RUN));

        runner.process(0).finish(Some(0));
        recorder.wait_for(EventKind::ProcessTerminated, 1).await;

        let launch: Vec<_> = recorder
            .kinds()
            .into_iter()
            .filter(|k| *k != EventKind::RecordAdded && *k != EventKind::SelectionChanged)
            .collect();
        assert_eq!(
            launch,
            vec![
                EventKind::LaunchScheduled,
                EventKind::LaunchStarting,
                EventKind::ProcessStarted,
                EventKind::ProcessTerminated,
                EventKind::RefreshScheduled,
            ]
        );
        let ended = recorder.last(EventKind::ProcessTerminated).unwrap();
        assert_eq!(ended.exit_code, Some(0));
        assert_eq!(ended.termination, Some(TerminationReason::Unknown));
        assert!(coord.running_for("App.server").is_empty());
        assert_eq!(coord.state_of(exec), None);
    }

    #[tokio::test]
    async fn rerun_stops_the_old_instance_before_starting_the_new_one() {
        let runner = FakeRunner::new("fake").arc();
        let confirm = Confirm::arc(true);
        let (coord, recorder) = start(builder(&runner).with_confirm(confirm.clone()));
        let server = app("server");

        coord.execute(run(&server)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        assert_eq!(coord.execute(run(&server)).await.unwrap(), LaunchOutcome::Awaiting);
        recorder.wait_for(EventKind::ProcessStarted, 2).await;

        assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
        assert_eq!(runner.process(0).destroy_calls(), 1);
        assert!(position(&recorder, EventKind::ProcessTerminated, 0) < position(&recorder, EventKind::ProcessStarted, 1));
        assert_eq!(
            recorder.events().iter().find(|e| e.kind == EventKind::ProcessTerminated).and_then(|e| e.termination),
            Some(TerminationReason::Rerun)
        );
        assert!(runner.env(1).is_rerun());
        assert_eq!(coord.running_for("App.server").len(), 1);
        assert!(!coord.is_awaiting(server.handle()));
    }

    #[tokio::test]
    async fn declined_rerun_leaves_the_running_instance_alone() {
        let runner = FakeRunner::new("fake").arc();
        let (coord, recorder) = start(builder(&runner).with_confirm(Confirm::arc(false)));
        let server = app("server");

        coord.execute(run(&server)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        assert_eq!(coord.execute(run(&server)).await.unwrap(), LaunchOutcome::Declined);
        settle().await;
        assert_eq!(runner.launches(), 1);
        assert_eq!(runner.process(0).destroy_calls(), 0);
        assert_eq!(recorder.count(EventKind::RestartAwaiting), 0);
    }

    #[tokio::test]
    async fn pending_restart_waits_for_a_stubborn_process() {
        let runner = FakeRunner::new("fake").stubborn().arc();
        let (coord, recorder) = start(builder(&runner));
        let server = app("server").with_singleton(SingletonPolicy::SingleInstanceOnly);

        coord.execute(run(&server)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        assert_eq!(coord.execute(run(&server)).await.unwrap(), LaunchOutcome::Awaiting);
        recorder.wait_for(EventKind::ProcessTerminating, 1).await;
        settle().await;
        assert_eq!(runner.launches(), 1);
        assert!(coord.is_awaiting(server.handle()));

        coord.stop(&runner.descriptor(0));
        recorder.wait_for(EventKind::ProcessStarted, 2).await;
        assert_eq!(runner.process(0).kill_calls(), 1);
        assert_eq!(recorder.count(EventKind::ProcessTerminated), 1);
        assert!(!coord.is_awaiting(server.handle()));
    }

    #[tokio::test]
    async fn process_that_exits_before_start_notify_reports_once() {
        let runner = FakeRunner::new("fake").pre_terminated(Some(7)).arc();
        let (coord, recorder) = start(builder(&runner));

        assert_eq!(coord.launch_and_wait(run(&app("tool"))).await, Ok(Some(7)));
        settle().await;

        assert_eq!(recorder.count(EventKind::ProcessStarted), 1);
        assert_eq!(recorder.count(EventKind::ProcessTerminated), 1);
        assert_eq!(recorder.count(EventKind::ProcessTerminating), 0);
        assert!(position(&recorder, EventKind::ProcessStarted, 0) < position(&recorder, EventKind::ProcessTerminated, 0));
        assert!(coord.running_for("App.tool").is_empty());
    }

    #[tokio::test]
    async fn newer_restart_supersedes_the_pending_one() {
        let runner = FakeRunner::new("fake").stubborn().arc();
        let (coord, recorder) = start(
            builder(&runner).with_policy(Arc::new(DefaultConflictPolicy { confirm: false })),
        );
        let server = app("server");

        coord.execute(run(&server)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        let first = run(&server);
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.launch_and_wait(first).await })
        };
        recorder.wait_for(EventKind::RestartAwaiting, 1).await;

        let second = run(&server);
        let second_id = second.execution_id();
        assert_eq!(coord.execute(second).await.unwrap(), LaunchOutcome::Awaiting);

        assert_eq!(waiter.await.unwrap(), Err(LaunchError::Canceled));
        recorder.wait_for(EventKind::ProcessStarted, 2).await;
        settle().await;

        assert_eq!(recorder.count(EventKind::RestartSuperseded), 1);
        assert_eq!(runner.launches(), 2);
        assert_eq!(runner.env(1).execution_id(), second_id);
    }

    #[tokio::test]
    async fn incompatible_configurations_are_stopped_one_way() {
        let runner = FakeRunner::new("fake").arc();
        let confirm = Confirm::arc(false);
        let (coord, recorder) = start(builder(&runner).with_confirm(confirm.clone()));
        let a = app("a");
        let b = app("b").with_incompatible("App.a");

        coord.execute(run(&a)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        assert_eq!(coord.execute(run(&b)).await.unwrap(), LaunchOutcome::Declined);
        assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
        assert_eq!(coord.running_for("App.a").len(), 1);

        confirm.answer.store(true, Ordering::SeqCst);
        assert_eq!(coord.execute(run(&b)).await.unwrap(), LaunchOutcome::Awaiting);
        recorder.wait_for(EventKind::ProcessStarted, 2).await;
        assert!(coord.running_for("App.a").is_empty());
        assert_eq!(runner.process(0).signals().reason(), Some(TerminationReason::Rerun));

        // b does not conflict with a relaunch of a.
        assert_eq!(coord.execute(run(&a)).await.unwrap(), LaunchOutcome::Scheduled);
        recorder.wait_for(EventKind::ProcessStarted, 3).await;
        assert_eq!(coord.running_for("App.b").len(), 1);
    }

    #[tokio::test]
    async fn parallel_configurations_start_side_by_side() {
        let runner = FakeRunner::new("fake").arc();
        let (coord, recorder) = start(builder(&runner));
        let worker = app("worker").with_singleton(SingletonPolicy::MultipleInstances);

        assert_eq!(coord.execute(run(&worker)).await.unwrap(), LaunchOutcome::Scheduled);
        // The first launch still holds its marker.
        assert_eq!(coord.execute(run(&worker)).await.unwrap(), LaunchOutcome::Awaiting);
        recorder.wait_for(EventKind::ProcessStarted, 2).await;
        assert_eq!(coord.execute(run(&worker)).await.unwrap(), LaunchOutcome::Scheduled);
        recorder.wait_for(EventKind::ProcessStarted, 3).await;

        assert_eq!(coord.running_for("App.worker").len(), 3);
        assert_eq!(runner.process(0).destroy_calls(), 0);
        assert_eq!(recorder.count(EventKind::ProcessTerminated), 0);
    }

    #[tokio::test]
    async fn parallel_configuration_still_stops_what_it_is_incompatible_with() {
        let runner = FakeRunner::new("fake").arc();
        let (coord, recorder) = start(builder(&runner));
        let a = app("a")
            .with_singleton(SingletonPolicy::MultipleInstances)
            .with_incompatible("App.b");
        let b = app("b");

        coord.execute(run(&a)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;
        coord.execute(run(&b)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 2).await;

        assert_eq!(coord.execute(run(&a)).await.unwrap(), LaunchOutcome::Awaiting);
        recorder.wait_for(EventKind::ProcessStarted, 3).await;

        assert!(coord.running_for("App.b").is_empty());
        assert_eq!(coord.running_for("App.a").len(), 2);
        assert_eq!(runner.process(1).signals().reason(), Some(TerminationReason::Rerun));
        assert!(position(&recorder, EventKind::ProcessTerminated, 0) < position(&recorder, EventKind::ProcessStarted, 2));
    }

    #[tokio::test]
    async fn restart_reuses_the_descriptor_without_asking() {
        let runner = FakeRunner::new("fake").arc();
        let confirm = Confirm::arc(false);
        let (coord, recorder) = start(builder(&runner).with_confirm(confirm.clone()));

        coord.execute(run(&app("server"))).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        let entry = coord.running_for("App.server").remove(0);
        assert_eq!(coord.restart(&entry).await.unwrap(), LaunchOutcome::Awaiting);
        recorder.wait_for(EventKind::ProcessStarted, 2).await;

        assert_eq!(confirm.asked.load(Ordering::SeqCst), 0);
        let reused = runner.env(1).content_to_reuse().map(|d| d.id());
        assert_eq!(reused, Some(runner.descriptor(0).id()));
        assert_eq!(runner.env(1).runner_id(), Some("fake"));
    }

    #[tokio::test]
    async fn launch_waits_while_the_same_configuration_is_starting() {
        let runner = FakeRunner::new("fake").arc();
        let permits = Arc::new(Semaphore::new(0));
        let hold = {
            let permits = permits.clone();
            ProviderFn::arc("hold", move |_, _| {
                let permits = permits.clone();
                async move {
                    permits.acquire().await.map(|p| p.forget()).ok();
                    Ok(true)
                }
            })
        };
        let (coord, recorder) = start(builder(&runner).with_provider(hold));
        let server = app("server").with_before_run(vec![BeforeRunTask::new("hold")]);

        assert_eq!(coord.execute(run(&server)).await.unwrap(), LaunchOutcome::Scheduled);
        recorder.wait_for(EventKind::BeforeRunStarted, 1).await;
        assert!(coord.is_starting("App.server", Executor::RUN, "fake"));

        assert_eq!(coord.execute(run(&server)).await.unwrap(), LaunchOutcome::Awaiting);
        settle().await;
        assert_eq!(recorder.count(EventKind::LaunchScheduled), 1);

        permits.add_permits(2);
        recorder.wait_for(EventKind::ProcessStarted, 2).await;
        assert_eq!(runner.process(0).destroy_calls(), 1);
        assert!(!coord.is_starting("App.server", Executor::RUN, "fake"));
    }

    #[tokio::test]
    async fn before_run_veto_cancels_without_reporting() {
        let runner = FakeRunner::new("fake").arc();
        let (reporter, mut reports) = ChannelReporter::new();
        let veto = ProviderFn::arc("veto", |_, _| async { Ok::<_, BeforeRunError>(false) });
        let (coord, recorder) = start(
            builder(&runner)
                .with_provider(veto)
                .with_reporter(Arc::new(reporter)),
        );
        let server = app("server").with_before_run(vec![BeforeRunTask::new("veto")]);

        let env = run(&server);
        let exec = env.execution_id();
        coord.execute(env).await.unwrap();
        recorder.wait_for(EventKind::LaunchNotStarted, 1).await;
        settle().await;

        assert_eq!(runner.attempts(), 0);
        assert_eq!(recorder.count(EventKind::BeforeRunStarted), 1);
        let failed = recorder.last(EventKind::LaunchNotStarted).unwrap();
        assert_eq!(failed.reason.as_deref(), Some("launch_canceled"));
        assert!(reports.try_recv().is_err());
        assert!(!coord.is_starting("App.server", Executor::RUN, "fake"));
        assert_eq!(coord.state_of(exec), None);
    }

    #[tokio::test]
    async fn start_failures_are_reported() {
        for (runner, label) in [
            (FakeRunner::new("fake").failing("boom"), "launch_start_failed"),
            (FakeRunner::new("fake").returning_nothing(), "launch_no_descriptor"),
            (FakeRunner::new("fake").panicking(), "launch_start_failed"),
        ] {
            let runner = runner.arc();
            let (reporter, mut reports) = ChannelReporter::new();
            let (coord, recorder) = start(builder(&runner).with_reporter(Arc::new(reporter)));

            assert_eq!(
                coord.launch_and_wait(run(&app("server"))).await.map_err(|e| e.as_label()),
                Err(label)
            );
            let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(report.record, "App.server");
            assert_eq!(report.error.as_label(), label);
            assert_eq!(recorder.count(EventKind::LaunchNotStarted), 1);
            assert!(!coord.is_starting("App.server", Executor::RUN, "fake"));
        }
    }

    #[tokio::test]
    async fn precheck_failures_do_not_schedule() {
        let runner = FakeRunner::new("fake").with_executor(Executor::DEBUG).arc();
        let (reporter, mut reports) = ChannelReporter::new();
        let (coord, recorder) = start(builder(&runner).with_reporter(Arc::new(reporter)));

        let err = coord.execute(run(&app("server"))).await.unwrap_err();
        assert!(matches!(err, LaunchError::RunnerNotFound { .. }));

        let ghost = ConfigurationRecord::new("ghost", "Gone");
        let err = coord
            .execute(ExecutionEnvironment::new(ghost, Executor::debug()))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Validation { .. }));

        let pinned = ExecutionEnvironment::new(app("server"), Executor::debug()).with_runner("missing");
        let err = coord.execute(pinned).await.unwrap_err();
        assert!(matches!(err, LaunchError::RunnerNotFound { .. }));

        let mismatched = ExecutionEnvironment::new(app("server"), Executor::run()).with_runner("fake");
        let err = coord.execute(mismatched).await.unwrap_err();
        assert!(matches!(err, LaunchError::CannotRun { .. }));

        assert_eq!(recorder.count(EventKind::LaunchScheduled), 0);
        assert_eq!(recorder.count(EventKind::LaunchNotStarted), 4);
        for _ in 0..4 {
            let report = tokio::time::timeout(Duration::from_secs(5), reports.recv()).await.unwrap();
            assert!(report.is_some());
        }
    }

    #[tokio::test]
    async fn run_configuration_task_launches_its_target_first() {
        let runner = FakeRunner::new("fake").pre_terminated(Some(0)).arc();
        let (coord, recorder) = start(builder(&runner));
        coord.store().add(app("build"));
        let main = app("main").with_before_run(vec![BeforeRunTask::run_configuration("App.build")]);

        coord.execute(run(&main)).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 2).await;

        assert_eq!(runner.env(0).record().name, "build");
        assert_eq!(runner.env(1).record().name, "main");
        assert_eq!(runner.env(0).session_id(), runner.env(1).session_id());
        assert_ne!(runner.env(0).execution_id(), runner.env(1).execution_id());
    }

    #[tokio::test]
    async fn failing_run_configuration_target_vetoes_the_launch() {
        let runner = FakeRunner::new("fake").pre_terminated(Some(1)).arc();
        let (coord, recorder) = start(builder(&runner));
        coord.store().add(app("build"));
        let main = app("main").with_before_run(vec![BeforeRunTask::run_configuration("App.build")]);

        assert_eq!(coord.launch_and_wait(run(&main)).await, Err(LaunchError::Canceled));
        assert_eq!(runner.attempts(), 1);
        assert_eq!(recorder.count(EventKind::ProcessStarted), 1);
    }

    #[tokio::test]
    async fn cyclic_run_configuration_tasks_fail_instead_of_hanging() {
        let runner = FakeRunner::new("fake").pre_terminated(Some(0)).arc();
        let (coord, recorder) = start(builder(&runner));
        let a = coord
            .store()
            .add(app("a").with_before_run(vec![BeforeRunTask::run_configuration("App.b")]));
        coord
            .store()
            .add(app("b").with_before_run(vec![BeforeRunTask::run_configuration("App.a")]));

        let res = tokio::time::timeout(Duration::from_secs(3), coord.launch_and_wait(run(&a)))
            .await
            .expect("cycle resolves");
        assert!(matches!(res, Err(LaunchError::BeforeRun { .. })));
        assert_eq!(runner.attempts(), 0);
        assert!(!coord.is_starting("App.a", Executor::RUN, "fake"));
        assert!(!coord.is_starting("App.b", Executor::RUN, "fake"));
        assert!(!coord.is_awaiting(a.handle()));
        assert_eq!(recorder.count(EventKind::LaunchNotStarted), 2);
    }

    #[tokio::test]
    async fn disposing_the_descriptor_drops_the_running_entry() {
        let runner = FakeRunner::new("fake").arc();
        let (coord, recorder) = start(builder(&runner));

        coord.execute(run(&app("server"))).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;
        assert_eq!(coord.running_for("App.server").len(), 1);
        assert_eq!(coord.running_by_executor(Executor::RUN).len(), 1);

        runner.descriptor(0).dispose();
        assert!(!runner.process(0).is_terminated());
        assert!(coord.running_for("App.server").is_empty());
        assert!(coord.running_by_executor(Executor::RUN).is_empty());
        assert!(coord.running(|_| true).is_empty());
    }

    #[tokio::test]
    async fn indexing_defers_the_start_of_unaware_types() {
        let runner = FakeRunner::new("fake").arc();
        let gate = IndexingGate::new();
        gate.set_ready(false);
        let (coord, recorder) = start(builder(&runner).with_indexing_gate(gate.clone()));

        let env = run(&app("server"));
        let exec = env.execution_id();
        assert_eq!(coord.execute(env).await.unwrap(), LaunchOutcome::Scheduled);

        coord
            .execute(run(&ConfigurationRecord::new("aware", "Aware")))
            .await
            .unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;
        settle().await;
        assert_eq!(runner.launches(), 1);
        assert_eq!(coord.state_of(exec), Some(LaunchState::Scheduled));

        gate.set_ready(true);
        recorder.wait_for(EventKind::ProcessStarted, 2).await;
        assert_eq!(runner.env(1).record().name, "server");
    }

    #[tokio::test]
    async fn dispose_fails_outstanding_waits() {
        let runner = FakeRunner::new("fake").arc();
        let block = ProviderFn::arc("block", |ctx: BeforeRunContext, _| async move {
            ctx.token().cancelled().await;
            Err(BeforeRunError::Canceled)
        });
        let (coord, recorder) = start(builder(&runner).with_provider(block));

        coord.execute(run(&app("server"))).await.unwrap();
        recorder.wait_for(EventKind::ProcessStarted, 1).await;

        let blocked = app("blocked").with_before_run(vec![BeforeRunTask::new("block")]);
        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.launch_and_wait(run(&blocked)).await })
        };
        recorder.wait_for(EventKind::BeforeRunStarted, 1).await;

        coord.dispose();
        coord.dispose();
        assert_eq!(waiter.await.unwrap(), Err(LaunchError::Closed));
        assert_eq!(coord.execute(run(&app("late"))).await, Err(LaunchError::Closed));

        assert_eq!(runner.process(0).destroy_calls(), 0);
        assert_eq!(coord.running_for("App.server").len(), 1);
    }
}
