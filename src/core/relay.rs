//! # Process lifecycle relay.
//!
//! [`ProcessRelay`] is the coordinator's listener on a started process. It is
//! attached before `start_notify`, but the process may already be terminating
//! or terminated by then. [`ProcessRelay::sync`] replays what was missed; the
//! per-event guards make the listener path and the replay path mutually
//! exclusive, so each lifecycle event reaches the coordinator exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::coordinator::Inner;
use crate::model::ExecutionEnvironment;
use crate::process::{ContentDescriptor, ProcessHandle, ProcessListener};

pub(crate) struct ProcessRelay {
    coordinator: Weak<Inner>,
    env: ExecutionEnvironment,
    descriptor: Arc<ContentDescriptor>,
    terminating: AtomicBool,
    terminated: AtomicBool,
}

impl ProcessRelay {
    pub(crate) fn new(
        coordinator: Weak<Inner>,
        env: ExecutionEnvironment,
        descriptor: Arc<ContentDescriptor>,
    ) -> Self {
        Self {
            coordinator,
            env,
            descriptor,
            terminating: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    /// Replays lifecycle events the process fired before the relay was attached.
    pub(crate) fn sync(&self, process: &dyn ProcessHandle) {
        if process.is_terminated() {
            self.on_terminated(process.exit_code());
        } else if process.is_terminating() {
            self.on_terminating();
        }
    }

    fn claim(flag: &AtomicBool) -> bool {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl ProcessListener for ProcessRelay {
    fn on_terminating(&self) {
        if self.terminated.load(Ordering::Acquire) || !Self::claim(&self.terminating) {
            return;
        }
        if let Some(inner) = self.coordinator.upgrade() {
            inner.process_terminating(&self.env, &self.descriptor);
        }
    }

    fn on_terminated(&self, exit_code: Option<i32>) {
        if !Self::claim(&self.terminated) {
            return;
        }
        if let Some(inner) = self.coordinator.upgrade() {
            inner.process_terminated(&self.env, &self.descriptor, exit_code);
        }
    }
}
