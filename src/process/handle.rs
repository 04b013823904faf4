//! # Process handles.
//!
//! [`ProcessHandle`] is the contract the coordinator needs from a launched
//! process: lifecycle control (start/destroy/detach/kill), state queries and a
//! termination-reason marker that is set *before* a stop is issued.
//!
//! [`ProcessSignals`] is the shared bookkeeping every implementation embeds:
//! listener list, terminating/terminated flags, exit code and marker. It makes
//! sure each listener callback fires at most once per process.
//!
//! ## Lifecycle
//! ```text
//! start_notify() ──► running ──► terminating ──► terminated(exit_code)
//!                        │                            ▲
//!                        └─────────── (exit) ─────────┘
//! ```
//! A process may report `terminated` without a preceding `terminating`
//! (natural exit). Listeners attached after an event was fired do not see it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Why a process terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// Stopped by an explicit user request.
    UserStop,
    /// Stopped to make room for a rerun.
    Rerun,
    /// Exited on its own (or the reason was never recorded).
    Unknown,
}

impl TerminationReason {
    /// Stable label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::UserStop => "user_stop",
            TerminationReason::Rerun => "rerun",
            TerminationReason::Unknown => "unknown",
        }
    }
}

/// Callbacks from a process handle.
#[allow(unused_variables)]
pub trait ProcessListener: Send + Sync + 'static {
    /// The process is about to terminate.
    fn on_terminating(&self) {}

    /// The process has terminated.
    fn on_terminated(&self, exit_code: Option<i32>) {}
}

/// Contract of a launched process.
pub trait ProcessHandle: Send + Sync + 'static {
    /// Starts delivering output and lifecycle notifications.
    fn start_notify(&self);

    /// Graceful stop.
    fn destroy(&self);

    /// Lets the process keep running without tracking it.
    fn detach(&self);

    /// Forceful stop.
    fn kill(&self);

    /// True if stopping should detach instead of destroy.
    fn detach_is_default(&self) -> bool {
        false
    }

    /// Shared lifecycle bookkeeping.
    fn signals(&self) -> &ProcessSignals;

    /// True once the process started terminating (or terminated).
    fn is_terminating(&self) -> bool {
        self.signals().is_terminating()
    }

    /// True once the process terminated.
    fn is_terminated(&self) -> bool {
        self.signals().is_terminated()
    }

    /// Exit code, if terminated with one.
    fn exit_code(&self) -> Option<i32> {
        self.signals().exit_code()
    }

    /// Registers a lifecycle listener.
    fn add_listener(&self, listener: Arc<dyn ProcessListener>) {
        self.signals().add_listener(listener);
    }

    /// Records why the process is about to be stopped.
    fn mark_termination(&self, reason: TerminationReason) {
        self.signals().mark(reason);
    }

    /// Reason recorded by [`ProcessHandle::mark_termination`], if any.
    fn termination_reason(&self) -> Option<TerminationReason> {
        self.signals().reason()
    }
}

/// Issues a non-blocking stop request.
///
/// Detaches or destroys the process; a process that already reports
/// terminating but is still alive is killed instead.
pub fn request_stop(process: &dyn ProcessHandle) {
    if process.is_terminated() {
        return;
    }
    if process.is_terminating() {
        process.kill();
    } else if process.detach_is_default() {
        process.detach();
    } else {
        process.destroy();
    }
}

/// Lifecycle bookkeeping shared by process implementations.
#[derive(Default)]
pub struct ProcessSignals {
    listeners: Mutex<Vec<Arc<dyn ProcessListener>>>,
    terminating: AtomicBool,
    terminated: AtomicBool,
    exit_code: Mutex<Option<i32>>,
    reason: Mutex<Option<TerminationReason>>,
}

impl ProcessSignals {
    /// Creates empty bookkeeping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn ProcessListener>) {
        self.listeners.lock().push(listener);
    }

    /// Moves to `terminating` and notifies listeners.
    ///
    /// Returns false if the process was already terminating or terminated.
    pub fn notify_terminating(&self) -> bool {
        if self.terminated.load(Ordering::Acquire) || self.terminating.swap(true, Ordering::AcqRel) {
            return false;
        }
        for listener in self.snapshot() {
            listener.on_terminating();
        }
        true
    }

    /// Moves to `terminated` and notifies listeners.
    ///
    /// Returns false if the process had already terminated.
    pub fn notify_terminated(&self, exit_code: Option<i32>) -> bool {
        {
            let mut code = self.exit_code.lock();
            if self.terminated.load(Ordering::Acquire) {
                return false;
            }
            *code = exit_code;
            self.terminating.store(true, Ordering::Release);
            self.terminated.store(true, Ordering::Release);
        }
        for listener in self.snapshot() {
            listener.on_terminated(exit_code);
        }
        true
    }

    /// True once terminating (or terminated).
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    /// True once terminated.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Exit code, if any.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    /// Records the termination reason. The first recorded reason wins.
    pub fn mark(&self, reason: TerminationReason) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    /// Recorded termination reason.
    pub fn reason(&self) -> Option<TerminationReason> {
        *self.reason.lock()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ProcessListener>> {
        self.listeners.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeProcess;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        terminating: AtomicUsize,
        terminated: AtomicUsize,
    }

    impl ProcessListener for Counter {
        fn on_terminating(&self) {
            self.terminating.fetch_add(1, Ordering::SeqCst);
        }
        fn on_terminated(&self, _: Option<i32>) {
            self.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn lifecycle_callbacks_fire_once() {
        let signals = ProcessSignals::new();
        let counter = Arc::new(Counter::default());
        signals.add_listener(counter.clone());

        assert!(signals.notify_terminating());
        assert!(!signals.notify_terminating());
        assert!(signals.notify_terminated(Some(3)));
        assert!(!signals.notify_terminated(Some(4)));
        assert!(!signals.notify_terminating());

        assert_eq!(counter.terminating.load(Ordering::SeqCst), 1);
        assert_eq!(counter.terminated.load(Ordering::SeqCst), 1);
        assert_eq!(signals.exit_code(), Some(3));
    }

    #[test]
    fn first_marked_reason_wins() {
        let signals = ProcessSignals::new();
        signals.mark(TerminationReason::Rerun);
        signals.mark(TerminationReason::UserStop);
        assert_eq!(signals.reason(), Some(TerminationReason::Rerun));
    }

    #[test]
    fn stop_kills_a_process_stuck_in_terminating() {
        let process = FakeProcess::stubborn();
        request_stop(process.as_ref());
        assert_eq!(process.destroy_calls(), 1);
        assert!(process.is_terminating());
        assert!(!process.is_terminated());

        request_stop(process.as_ref());
        assert_eq!(process.kill_calls(), 1);
        assert!(process.is_terminated());
    }
}
