//! # Singleton policies for configurations.
//!
//! [`SingletonPolicy`] decides whether several instances of the same
//! configuration may run at once, and whether a rerun may stop the running
//! instance without asking.
//!
//! ```text
//! SingleInstance          one instance; rerun asks before stopping the old one (default)
//! SingleInstanceOnly      one instance; rerun stops the old one silently
//! MultipleInstances       parallel instances allowed (user may switch to single)
//! MultipleInstancesOnly   parallel instances allowed, not user-switchable
//! ```

use serde::{Deserialize, Serialize};

/// Parallel-run policy of a configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonPolicy {
    /// One instance at a time; confirm before stopping the running one.
    #[default]
    SingleInstance,
    /// One instance at a time; restart without confirmation.
    SingleInstanceOnly,
    /// Parallel instances allowed.
    MultipleInstances,
    /// Parallel instances allowed and the choice is fixed.
    MultipleInstancesOnly,
}

impl SingletonPolicy {
    /// True if parallel instances may run.
    pub fn allows_parallel(self) -> bool {
        matches!(
            self,
            SingletonPolicy::MultipleInstances | SingletonPolicy::MultipleInstancesOnly
        )
    }

    /// True if a rerun may stop the running instance without asking.
    pub fn restarts_silently(self) -> bool {
        matches!(self, SingletonPolicy::SingleInstanceOnly)
    }

    /// True if the user may toggle parallel runs.
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            SingletonPolicy::SingleInstance | SingletonPolicy::MultipleInstances
        )
    }
}
