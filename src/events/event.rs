//! # Events emitted by the configuration store and the launch coordinator.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Store events**: records added/changed/removed, selection, before-run tasks, state load
//! - **Launch events**: the per-launch state machine and restart bookkeeping
//!
//! The [`Event`] struct carries metadata such as the record id, execution id,
//! launch state and termination reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Synchronous listeners observe events in publish order.
//!
//! ## Example
//! ```rust
//! use launchvisor::{Event, EventKind, LaunchState};
//!
//! let ev = Event::new(EventKind::LaunchScheduled)
//!     .with_record("Application.server")
//!     .with_execution(7)
//!     .with_state(LaunchState::Scheduled);
//!
//! assert_eq!(ev.kind, EventKind::LaunchScheduled);
//! assert_eq!(ev.record.as_deref(), Some("Application.server"));
//! assert_eq!(ev.execution, Some(7));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::core::LaunchState;
use crate::process::TerminationReason;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Store events ===
    /// A record was inserted.
    ///
    /// Sets: `record`
    RecordAdded,

    /// A record was updated in place (or edited through the store).
    ///
    /// Sets: `record`, `previous` (old unique id when it migrated)
    RecordChanged,

    /// A record was removed (explicitly, by eviction or by reload).
    ///
    /// Sets: `record`
    RecordRemoved,

    /// The selected record changed.
    ///
    /// Sets: `record` (absent when the selection was cleared)
    SelectionChanged,

    /// Before-run task lists were updated.
    BeforeRunTasksChanged,

    /// Persisted state was (re)loaded.
    ///
    /// Sets: `reason` ("first" or "reload")
    StateLoaded,

    // === Launch events ===
    /// Launch scheduled; an in-progress marker is registered.
    ///
    /// Sets: `record`, `execution`, `executor`, `state`
    LaunchScheduled,

    /// Before-run tasks started.
    ///
    /// Sets: `record`, `execution`, `state`
    BeforeRunStarted,

    /// The runner is being invoked.
    ///
    /// Sets: `record`, `execution`, `state`
    LaunchStarting,

    /// The process started and is tracked as running.
    ///
    /// Sets: `record`, `execution`, `executor`, `descriptor`, `state`
    ProcessStarted,

    /// The process is terminating.
    ///
    /// Sets: `record`, `execution`, `descriptor`, `state`
    ProcessTerminating,

    /// The process terminated.
    ///
    /// Sets: `record`, `execution`, `descriptor`, `state`, `termination`, `exit_code`
    ProcessTerminated,

    /// The launch ended before a process started.
    ///
    /// Sets: `record`, `execution`, `state` (`Failed`), `reason` (error label, if any)
    LaunchNotStarted,

    /// A restart is waiting for conflicting instances to terminate.
    ///
    /// Sets: `record`, `execution`
    RestartAwaiting,

    /// A pending restart was abandoned because a newer one replaced it.
    ///
    /// Sets: `record`, `execution`
    RestartSuperseded,

    /// A filesystem refresh was scheduled after termination.
    ///
    /// Sets: `record`, `execution`
    RefreshScheduled,
}

/// Event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Unique id of the record concerned.
    pub record: Option<Arc<str>>,
    /// Previous unique id (id migration).
    pub previous: Option<Arc<str>>,
    /// Execution id.
    pub execution: Option<u64>,
    /// Executor id.
    pub executor: Option<Arc<str>>,
    /// Content descriptor id.
    pub descriptor: Option<u64>,
    /// Launch state after the transition.
    pub state: Option<LaunchState>,
    /// Why a process terminated.
    pub termination: Option<TerminationReason>,
    /// Process exit code.
    pub exit_code: Option<i32>,
    /// Human-readable reason or error label.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            record: None,
            previous: None,
            execution: None,
            executor: None,
            descriptor: None,
            state: None,
            termination: None,
            exit_code: None,
            reason: None,
        }
    }

    /// Attaches a record id.
    #[inline]
    pub fn with_record(mut self, id: impl Into<Arc<str>>) -> Self {
        self.record = Some(id.into());
        self
    }

    /// Attaches the previous record id.
    #[inline]
    pub fn with_previous(mut self, id: impl Into<Arc<str>>) -> Self {
        self.previous = Some(id.into());
        self
    }

    /// Attaches an execution id.
    #[inline]
    pub fn with_execution(mut self, id: u64) -> Self {
        self.execution = Some(id);
        self
    }

    /// Attaches an executor id.
    #[inline]
    pub fn with_executor(mut self, id: impl Into<Arc<str>>) -> Self {
        self.executor = Some(id.into());
        self
    }

    /// Attaches a content descriptor id.
    #[inline]
    pub fn with_descriptor(mut self, id: u64) -> Self {
        self.descriptor = Some(id);
        self
    }

    /// Attaches the launch state.
    #[inline]
    pub fn with_state(mut self, state: LaunchState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches the termination reason.
    #[inline]
    pub fn with_termination(mut self, reason: TerminationReason) -> Self {
        self.termination = Some(reason);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// True for events that end a launch (`ProcessTerminated` / `LaunchNotStarted`).
    #[inline]
    pub fn is_launch_end(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ProcessTerminated | EventKind::LaunchNotStarted
        )
    }
}
