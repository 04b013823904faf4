//! # Function-backed provider (`ProviderFn`)
//!
//! [`ProviderFn`] wraps a closure `F: Fn(BeforeRunContext, BeforeRunTask) -> Fut`
//! and creates a fresh future per task, so no state is shared between runs
//! unless the closure captures an `Arc` explicitly.
//!
//! ## Example
//! ```rust
//! use launchvisor::{BeforeRunError, ProviderFn, ProviderRef};
//!
//! let p: ProviderRef = ProviderFn::arc("build", |_ctx, task| async move {
//!     Ok::<_, BeforeRunError>(task.options.get("skip").is_none())
//! });
//! assert_eq!(p.id(), "build");
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::provider::{BeforeRunContext, BeforeRunProvider};
use crate::error::BeforeRunError;
use crate::model::BeforeRunTask;

/// Function-backed provider implementation.
#[derive(Debug)]
pub struct ProviderFn<F> {
    id: String,
    f: F,
}

impl<F> ProviderFn<F> {
    /// Creates a new function-backed provider.
    pub fn new<Fut>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(BeforeRunContext, BeforeRunTask) -> Fut,
        Fut: Future<Output = Result<bool, BeforeRunError>>,
    {
        Self { id: id.into(), f }
    }

    /// Creates the provider as a shared handle.
    pub fn arc<Fut>(id: impl Into<String>, f: F) -> Arc<Self>
    where
        F: Fn(BeforeRunContext, BeforeRunTask) -> Fut,
        Fut: Future<Output = Result<bool, BeforeRunError>>,
    {
        Arc::new(Self::new(id, f))
    }
}

#[async_trait]
impl<F, Fut> BeforeRunProvider for ProviderFn<F>
where
    F: Fn(BeforeRunContext, BeforeRunTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, BeforeRunError>> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        ctx: &BeforeRunContext,
        task: &BeforeRunTask,
    ) -> Result<bool, BeforeRunError> {
        (self.f)(ctx.clone(), task.clone()).await
    }
}
