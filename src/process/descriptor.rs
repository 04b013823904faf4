//! # Run content descriptors.
//!
//! A [`ContentDescriptor`] is the handle a runner returns for a started launch:
//! it owns the [`ProcessHandle`] and exposes disposal hooks. Disposal is the
//! guaranteed cleanup point; the coordinator wires running-registry removal to
//! it so entries go away on every exit path.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::ProcessHandle;

static NEXT_DESCRIPTOR: AtomicU64 = AtomicU64::new(1);

type DisposeHook = Box<dyn FnOnce() + Send>;

/// Content descriptor of one launched process.
pub struct ContentDescriptor {
    id: u64,
    name: String,
    process: Arc<dyn ProcessHandle>,
    reusable: AtomicBool,
    disposed: AtomicBool,
    hooks: Mutex<Vec<DisposeHook>>,
}

impl ContentDescriptor {
    /// Creates a descriptor for `process`.
    pub fn new(name: impl Into<String>, process: Arc<dyn ProcessHandle>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_DESCRIPTOR.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            process,
            reusable: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        })
    }

    /// Unique descriptor id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The process.
    pub fn process(&self) -> &Arc<dyn ProcessHandle> {
        &self.process
    }

    /// Tags whether a later launch may reuse this descriptor.
    pub fn set_reusable(&self, reusable: bool) {
        self.reusable.store(reusable, Ordering::Release);
    }

    /// True if a later launch may reuse this descriptor.
    pub fn is_reusable(&self) -> bool {
        self.reusable.load(Ordering::Acquire)
    }

    /// Registers a hook run on disposal. Runs immediately if already disposed.
    pub fn on_dispose(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self.hooks.lock();
            if !self.disposed.load(Ordering::Acquire) {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Disposes the descriptor and runs its hooks (once).
    pub fn dispose(&self) {
        let hooks = {
            let mut hooks = self.hooks.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    /// True once disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ContentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("terminated", &self.process.is_terminated())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
