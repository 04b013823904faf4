//! # Sequential before-run execution.
//!
//! [`BeforeRunPipeline`] holds the provider map (`provider id -> provider`)
//! and runs a launch's tasks one after another:
//!
//! ```text
//! for task in tasks (enabled only):
//!   provider? ── none ──► warn, skip
//!   execute (panic-isolated, raced against the token)
//!     Ok(true)            ──► next task
//!     Ok(false) | Canceled ──► on_cancel(), Err(Canceled)
//!     Failed(e)           ──► Err(BeforeRun { provider, e })
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use parking_lot::RwLock;

use super::provider::{BeforeRunContext, ProviderRef};
use crate::error::{BeforeRunError, LaunchError};
use crate::model::BeforeRunTask;

/// Registered providers plus the sequential runner.
#[derive(Default)]
pub struct BeforeRunPipeline {
    providers: RwLock<HashMap<String, ProviderRef>>,
}

impl BeforeRunPipeline {
    /// Creates a pipeline with the given providers.
    pub fn new(providers: impl IntoIterator<Item = ProviderRef>) -> Self {
        let pipeline = Self::default();
        for p in providers {
            pipeline.register(p);
        }
        pipeline
    }

    /// Registers a provider, replacing one with the same id.
    pub fn register(&self, provider: ProviderRef) {
        self.providers
            .write()
            .insert(provider.id().to_string(), provider);
    }

    /// Provider registered under `id`.
    pub fn provider(&self, id: &str) -> Option<ProviderRef> {
        self.providers.read().get(id).cloned()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// True if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Runs `tasks` in order.
    ///
    /// `on_cancel` is called once if a task vetoes or cancels; it is not
    /// called on failure.
    pub async fn run(
        &self,
        ctx: &BeforeRunContext,
        tasks: &[BeforeRunTask],
        on_cancel: impl FnOnce() + Send,
    ) -> Result<(), LaunchError> {
        let record = ctx.environment().record().unique_id();
        for task in tasks.iter().filter(|t| t.enabled) {
            let Some(provider) = self.provider(&task.provider_id) else {
                tracing::warn!(
                    record = %record,
                    provider = %task.provider_id,
                    "unknown before-run provider, task skipped"
                );
                continue;
            };

            let outcome = tokio::select! {
                biased;
                _ = ctx.token().cancelled() => Err(BeforeRunError::Canceled),
                res = AssertUnwindSafe(provider.execute(ctx, task)).catch_unwind() => {
                    res.unwrap_or_else(|_| Err(BeforeRunError::failed("provider panicked")))
                }
            };

            match outcome {
                Ok(true) => {
                    tracing::debug!(record = %record, provider = %task.provider_id, "before-run task done");
                }
                Ok(false) | Err(BeforeRunError::Canceled) => {
                    tracing::debug!(record = %record, provider = %task.provider_id, "before-run canceled");
                    on_cancel();
                    return Err(LaunchError::Canceled);
                }
                Err(BeforeRunError::Failed { error }) => {
                    return Err(LaunchError::BeforeRun {
                        provider: task.provider_id.clone(),
                        message: error,
                    });
                }
            }
        }
        Ok(())
    }
}
