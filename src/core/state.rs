//! # Launch states.
//!
//! ```text
//! Scheduled ──► BeforeRun ──► Starting ──► Running ──► Terminating ──► Terminated
//!     │             │            │            └───────────────────────────▲
//!     └─────────────┴────────────┴──► Failed
//! ```
//! `BeforeRun` is skipped when a launch has no before-run tasks.

/// State of one launch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaunchState {
    /// Admitted; an in-progress marker is held.
    Scheduled,
    /// Before-run tasks are running.
    BeforeRun,
    /// The runner is being invoked.
    Starting,
    /// The process started.
    Running,
    /// The process is stopping.
    Terminating,
    /// The process ended.
    Terminated,
    /// The launch ended before a process started.
    Failed,
}

impl LaunchState {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchState::Scheduled => "scheduled",
            LaunchState::BeforeRun => "before_run",
            LaunchState::Starting => "starting",
            LaunchState::Running => "running",
            LaunchState::Terminating => "terminating",
            LaunchState::Terminated => "terminated",
            LaunchState::Failed => "failed",
        }
    }

    /// True for `Terminated` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, LaunchState::Terminated | LaunchState::Failed)
    }

    /// True if `self → next` is a legal transition.
    pub fn can_transition_to(self, next: LaunchState) -> bool {
        use LaunchState::*;
        matches!(
            (self, next),
            (Scheduled, BeforeRun)
                | (Scheduled, Starting)
                | (BeforeRun, Starting)
                | (Starting, Running)
                | (Running, Terminating)
                | (Running, Terminated)
                | (Terminating, Terminated)
                | (Scheduled | BeforeRun | Starting, Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::LaunchState::*;

    #[test]
    fn failed_is_reachable_only_before_running() {
        for s in [Scheduled, BeforeRun, Starting] {
            assert!(s.can_transition_to(Failed), "{}", s.as_str());
        }
        for s in [Running, Terminating, Terminated, Failed] {
            assert!(!s.can_transition_to(Failed), "{}", s.as_str());
        }
    }

    #[test]
    fn before_run_is_optional() {
        assert!(Scheduled.can_transition_to(Starting));
        assert!(Running.can_transition_to(Terminated));
        assert!(!Starting.can_transition_to(BeforeRun));
        assert!(!Terminated.can_transition_to(Running));
    }
}
