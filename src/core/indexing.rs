//! # Indexing gate.
//!
//! [`IndexingGate`] reports whether background indexing is finished. Launches
//! of configuration types that are not indexing-aware wait for it before
//! starting; a pending restart treats a busy gate as "not yet".

use std::sync::Arc;

use tokio::sync::watch;

/// Shared "indexing finished" flag.
///
/// Cheap to clone; clones observe the same flag.
#[derive(Clone, Debug)]
pub struct IndexingGate {
    ready: Arc<watch::Sender<bool>>,
}

impl Default for IndexingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexingGate {
    /// Creates a gate in the ready state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { ready: Arc::new(tx) }
    }

    /// Marks indexing as finished (`true`) or running (`false`).
    pub fn set_ready(&self, ready: bool) {
        let changed = self.ready.send_replace(ready) != ready;
        if changed {
            tracing::debug!(ready, "indexing state changed");
        }
    }

    /// True if indexing is finished.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once indexing is finished.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_resume_when_ready() {
        let gate = IndexingGate::new();
        gate.set_ready(false);
        assert!(!gate.is_ready());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_ready().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.set_ready(true);
        waiter.await.unwrap();
    }
}
