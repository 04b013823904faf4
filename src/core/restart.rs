//! # Pending restarts.
//!
//! A launch that cannot be admitted right away becomes a [`PendingRestart`]
//! keyed by its profile. One poll loop per pending restart re-checks the
//! gates under the admission lock until the launch can be scheduled:
//!
//! ```text
//! loop:
//!   superseded (map holds another Arc)? ──► RestartSuperseded, waiter canceled, exit
//!   indexing busy (type not indexing-aware)? ──► wait
//!   same launch still starting? ──► wait
//!   stopped conflicts not yet terminated? ──► wait
//!   new conflicts appeared? ──► policy (+ confirm) ──► stop them, wait
//!                                   └─ declined ──► LaunchNotStarted(canceled), exit
//!   otherwise ──► leave map, marker + Scheduled ──► launch, exit
//!   sleep(poll.next(retry)) or yield
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::coordinator::{Conflicts, Inner};
use super::markers::InProgressMarker;
use crate::error::LaunchError;
use crate::events::{Event, EventKind};
use crate::model::ExecutionEnvironment;
use crate::process::ContentDescriptor;
use crate::runners::RunnerRef;

/// A launch waiting for its gates to clear.
pub(crate) struct PendingRestart {
    pub(crate) env: ExecutionEnvironment,
    pub(crate) runner: RunnerRef,
    stopped: Mutex<Vec<Arc<ContentDescriptor>>>,
    rerun: AtomicBool,
}

impl PendingRestart {
    pub(crate) fn new(env: ExecutionEnvironment, runner: RunnerRef, stopped: Vec<Arc<ContentDescriptor>>) -> Self {
        let rerun = env.is_rerun();
        Self {
            env,
            runner,
            stopped: Mutex::new(stopped),
            rerun: AtomicBool::new(rerun),
        }
    }

    fn all_stopped(&self) -> bool {
        self.stopped
            .lock()
            .iter()
            .all(|d| d.process().is_terminated())
    }

    /// Running conflicts that were not asked to stop yet.
    fn fresh(&self, conflicts: Conflicts) -> Conflicts {
        let known: HashSet<u64> = self.stopped.lock().iter().map(|d| d.id()).collect();
        Conflicts {
            same: conflicts.same.into_iter().filter(|d| !known.contains(&d.id())).collect(),
            incompatible: conflicts
                .incompatible
                .into_iter()
                .filter(|d| !known.contains(&d.id()))
                .collect(),
        }
    }

    fn environment(&self) -> ExecutionEnvironment {
        let mut env = self.env.clone();
        if self.rerun.load(Ordering::Acquire) {
            env.mark_rerun();
        }
        env
    }
}

enum Gate {
    Superseded,
    Wait,
    Conflicts(Conflicts),
    Ready(InProgressMarker),
}

/// Poll loop of one pending restart.
pub(crate) async fn await_restart(inner: Arc<Inner>, pending: Arc<PendingRestart>) {
    let record = pending.env.record().unique_id();
    let mut retry = 0u32;
    loop {
        if inner.token.is_cancelled() {
            return;
        }
        match check(&inner, &pending) {
            Gate::Wait => {}
            Gate::Superseded => {
                tracing::debug!(record = %record, execution = pending.env.execution_id(), "pending restart superseded");
                inner.bus.publish(
                    Event::new(EventKind::RestartSuperseded)
                        .with_record(record.as_str())
                        .with_execution(pending.env.execution_id()),
                );
                inner.complete(pending.env.execution_id(), Err(LaunchError::Canceled));
                return;
            }
            Gate::Ready(marker) => {
                let env = pending.environment();
                inner.scheduled(&env);
                inner.spawn_launch(env, Arc::clone(&pending.runner), marker);
                return;
            }
            Gate::Conflicts(conflicts) => match inner.resolve_conflicts(&pending.env, &conflicts).await {
                Ok(true) => {
                    pending.stopped.lock().extend(conflicts.all());
                    pending.rerun.store(true, Ordering::Release);
                }
                declined => {
                    let profile = pending.env.profile();
                    inner
                        .awaiting
                        .remove_if(&profile, |_, current| Arc::ptr_eq(current, &pending));
                    let error = declined.err().unwrap_or(LaunchError::Canceled);
                    inner.not_started(&pending.env, None, error);
                    return;
                }
            },
        }

        let poll = inner.cfg.restart_poll;
        if poll.is_immediate() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = inner.token.cancelled() => return,
                _ = tokio::time::sleep(poll.next(retry)) => {}
            }
        }
        retry = retry.saturating_add(1);
    }
}

fn check(inner: &Inner, pending: &Arc<PendingRestart>) -> Gate {
    let env = &pending.env;
    let profile = env.profile();
    let _admission = inner.lock_admission();

    let current = inner.awaiting.get(&profile).map(|e| Arc::clone(e.value()));
    if !current.is_some_and(|c| Arc::ptr_eq(&c, pending)) {
        return Gate::Superseded;
    }
    if !inner.indexing.is_ready() && !inner.registry.type_of(&env.record().type_id).is_indexing_aware() {
        return Gate::Wait;
    }
    let marker = InProgressMarker::of(env);
    if inner.is_blocked(env, &marker) || !pending.all_stopped() {
        return Gate::Wait;
    }
    let fresh = pending.fresh(inner.conflicts(env));
    if !fresh.is_empty() {
        return Gate::Conflicts(fresh);
    }

    if inner
        .awaiting
        .remove_if(&profile, |_, current| Arc::ptr_eq(current, pending))
        .is_none()
    {
        return Gate::Superseded;
    }
    inner.schedule(env, &marker);
    Gate::Ready(marker)
}
