//! # Registry of running launches.
//!
//! [`RunningRegistry`] tracks every started launch as a [`RunningEntry`]
//! (descriptor, environment, executor). Entries are added when a process
//! starts and removed when it terminates or its descriptor is disposed,
//! whichever happens first.
//!
//! ## Rules
//! - A descriptor appears in at most one entry (keyed by descriptor id).
//! - Queries skip entries whose process already terminated. Terminating
//!   processes are still reported (they still count as conflicts).
//! - Insertion order is preserved in query results.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{ConfigurationRecord, ExecutionEnvironment, Executor};
use crate::process::ContentDescriptor;

/// One running launch.
#[derive(Clone, Debug)]
pub struct RunningEntry {
    descriptor: Arc<ContentDescriptor>,
    environment: ExecutionEnvironment,
}

impl RunningEntry {
    /// Creates an entry.
    pub fn new(descriptor: Arc<ContentDescriptor>, environment: ExecutionEnvironment) -> Self {
        Self {
            descriptor,
            environment,
        }
    }

    /// Content descriptor.
    pub fn descriptor(&self) -> &Arc<ContentDescriptor> {
        &self.descriptor
    }

    /// Environment the launch was started with.
    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    /// Executor the launch was started with.
    pub fn executor(&self) -> &Executor {
        self.environment.executor()
    }

    /// Configuration snapshot.
    pub fn record(&self) -> &ConfigurationRecord {
        self.environment.record()
    }

    fn is_live(&self) -> bool {
        !self.descriptor.process().is_terminated()
    }
}

/// Running launches, safe for concurrent use.
#[derive(Default)]
pub struct RunningRegistry {
    entries: RwLock<Vec<RunningEntry>>,
}

impl RunningRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the entry for `entry.descriptor()`.
    pub fn add(&self, entry: RunningEntry) {
        let mut entries = self.entries.write();
        let id = entry.descriptor.id();
        match entries.iter_mut().find(|e| e.descriptor.id() == id) {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }
    }

    /// Removes the entry of a descriptor. Idempotent.
    pub fn remove(&self, descriptor_id: u64) -> Option<RunningEntry> {
        let mut entries = self.entries.write();
        let pos = entries.iter().position(|e| e.descriptor.id() == descriptor_id)?;
        Some(entries.remove(pos))
    }

    /// Live entries whose record matches `pred`.
    pub fn find(&self, pred: impl Fn(&ConfigurationRecord) -> bool) -> Vec<RunningEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_live() && pred(e.record()))
            .cloned()
            .collect()
    }

    /// Live entries of the record with `unique_id`.
    pub fn for_record(&self, unique_id: &str) -> Vec<RunningEntry> {
        self.find(|r| r.unique_id() == unique_id)
    }

    /// Live entry of a descriptor.
    pub fn by_descriptor(&self, descriptor_id: u64) -> Option<RunningEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.descriptor.id() == descriptor_id && e.is_live())
            .cloned()
    }

    /// Live entries started with `executor_id`.
    pub fn by_executor(&self, executor_id: &str) -> Vec<RunningEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_live() && e.executor().id() == executor_id)
            .cloned()
            .collect()
    }

    /// Descriptors of every live entry.
    pub fn descriptors(&self) -> Vec<Arc<ContentDescriptor>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_live())
            .map(|e| Arc::clone(&e.descriptor))
            .collect()
    }

    /// Number of tracked entries, terminated ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
