//! # In-progress markers.
//!
//! An [`InProgressMarker`] is held from scheduling until the process starts
//! or the launch fails. [`InProgress`] counts markers so that two launches
//! with equal markers (parallel-run configurations) release independently.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::ExecutionEnvironment;

/// A scheduled-but-not-started launch: (record, executor, runner).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InProgressMarker {
    /// Unique id of the record.
    pub record: String,
    /// Executor id.
    pub executor: Arc<str>,
    /// Runner id.
    pub runner: Arc<str>,
}

impl InProgressMarker {
    /// Creates a marker.
    pub fn new(record: impl Into<String>, executor: impl Into<Arc<str>>, runner: impl Into<Arc<str>>) -> Self {
        Self {
            record: record.into(),
            executor: executor.into(),
            runner: runner.into(),
        }
    }

    /// Marker of a launch whose runner is already resolved.
    pub(crate) fn of(env: &ExecutionEnvironment) -> Self {
        Self::new(
            env.record().unique_id(),
            env.executor().id(),
            env.runner_id().unwrap_or_default(),
        )
    }
}

/// Concurrent multiset of markers.
#[derive(Default)]
pub(crate) struct InProgress {
    markers: DashMap<InProgressMarker, usize>,
}

impl InProgress {
    pub(crate) fn insert(&self, marker: InProgressMarker) {
        *self.markers.entry(marker).or_insert(0) += 1;
    }

    /// Releases one occurrence of `marker`.
    pub(crate) fn remove(&self, marker: &InProgressMarker) {
        self.markers.remove_if_mut(marker, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    pub(crate) fn contains(&self, marker: &InProgressMarker) -> bool {
        self.markers.contains_key(marker)
    }

    pub(crate) fn any_for_record(&self, record: &str) -> bool {
        self.markers.iter().any(|e| e.key().record == record)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.markers.iter().map(|e| *e.value()).sum()
    }

    pub(crate) fn clear(&self) {
        self.markers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_markers_release_independently() {
        let set = InProgress::default();
        let m = InProgressMarker::new("App.a", "Run", "fake");
        set.insert(m.clone());
        set.insert(m.clone());
        assert_eq!(set.len(), 2);

        set.remove(&m);
        assert!(set.contains(&m));
        set.remove(&m);
        assert!(!set.contains(&m));
        set.remove(&m);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn record_lookup_ignores_executor_and_runner() {
        let set = InProgress::default();
        set.insert(InProgressMarker::new("App.a", "Debug", "other"));
        assert!(set.any_for_record("App.a"));
        assert!(!set.any_for_record("App.b"));
        assert!(!set.contains(&InProgressMarker::new("App.a", "Run", "other")));
    }
}
