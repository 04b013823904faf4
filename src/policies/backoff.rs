//! # Poll backoff for pending restarts.
//!
//! [`PollBackoff`] controls how often a pending restart re-checks its gating
//! conditions (superseded? indexing? previous launch still starting? conflicting
//! processes terminated?). It is parameterized by:
//! - [`PollBackoff::first`] the initial delay;
//! - [`PollBackoff::factor`] the multiplicative growth factor;
//! - [`PollBackoff::max`] the maximum delay cap.
//!
//! The delay for retry `n` is `first × factor^n`, clamped to `max`. A zero
//! `first` selects immediate dispatch (the poll loop only yields), which is
//! what tests use.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use launchvisor::PollBackoff;
//!
//! let poll = PollBackoff {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_millis(100),
//!     factor: 1.5,
//! };
//!
//! assert_eq!(poll.next(0), Duration::from_millis(50));
//! assert_eq!(poll.next(1), Duration::from_millis(75));
//! assert_eq!(poll.next(2), Duration::from_millis(100));
//! ```

use std::time::Duration;

/// Restart poll delay policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollBackoff {
    /// Delay before the first re-check.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl Default for PollBackoff {
    /// Returns a policy with:
    /// - `first = 50ms`;
    /// - `factor = 1.5`;
    /// - `max = 100ms`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(50),
            max: Duration::from_millis(100),
            factor: 1.5,
        }
    }
}

impl PollBackoff {
    /// Immediate dispatch: every re-check only yields to the scheduler.
    pub fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// True if this policy never sleeps.
    pub fn is_immediate(&self) -> bool {
        self.first.is_zero()
    }

    /// Computes the delay for the given retry number (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to [`PollBackoff::max`].
    pub fn next(&self, retry: u32) -> Duration {
        if self.is_immediate() {
            return Duration::ZERO;
        }
        let max_secs = self.max.as_secs_f64();
        let clamped_exp = retry.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(clamped_exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }
}
