//! # Coordinator configuration.
//!
//! Provides [`CoordinatorConfig`], the settings shared by the store and the
//! execution coordinator.
//!
//! ## Sentinel values
//! - `restart_poll.first = 0s` → immediate dispatch (poll loop only yields)
//! - `indexing_retry_limit = 0` → start as soon as indexing first reports ready

use crate::policies::PollBackoff;

/// Settings for the store and the execution coordinator.
///
/// ## Field semantics
/// - `recents_limit`: temporary records kept before eviction
/// - `restart_poll`: delay between pending-restart re-checks
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `confirm_rerun`: ask before stopping conflicting instances
/// - `refresh_on_termination`: publish `RefreshScheduled` after each termination
/// - `indexing_retry_limit`: extra indexing waits before starting anyway
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Maximum number of temporary records kept in the store.
    pub recents_limit: usize,

    /// Poll delays of pending restarts.
    ///
    /// A zero `first` delay selects immediate dispatch, used by tests.
    pub restart_poll: PollBackoff,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// skip older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Ask for confirmation before stopping conflicting instances.
    ///
    /// Only consulted by the default conflict policy.
    pub confirm_rerun: bool,

    /// Publish `RefreshScheduled` after a process terminates.
    pub refresh_on_termination: bool,

    /// How many times a launch re-waits when indexing turns busy again
    /// right after it became ready.
    pub indexing_retry_limit: u32,
}

impl CoordinatorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// True if pending restarts re-check without sleeping.
    #[inline]
    pub fn immediate_dispatch(&self) -> bool {
        self.restart_poll.is_immediate()
    }
}

impl Default for CoordinatorConfig {
    /// Default configuration:
    ///
    /// - `recents_limit = 5`
    /// - `restart_poll = PollBackoff::default()` (50ms growing to 100ms)
    /// - `bus_capacity = 1024`
    /// - `confirm_rerun = true`
    /// - `refresh_on_termination = true`
    /// - `indexing_retry_limit = 1`
    fn default() -> Self {
        Self {
            recents_limit: 5,
            restart_poll: PollBackoff::default(),
            bus_capacity: 1024,
            confirm_rerun: true,
            refresh_on_termination: true,
            indexing_retry_limit: 1,
        }
    }
}
