//! Launch policies.
//!
//! This module groups the knobs that control **whether** a configuration may
//! run alongside others, **what** to do about conflicting running instances,
//! and **how often** a pending restart re-checks its gates.
//!
//! ## Contents
//! - [`SingletonPolicy`] parallel-run policy of a configuration
//! - [`ConflictPolicy`] / [`ConflictDecision`] / [`DefaultConflictPolicy`] restart conflict handling
//! - [`ConfirmRerun`] / [`AlwaysConfirm`] user confirmation hook
//! - [`PollBackoff`] restart poll delays
//!
//! ## Defaults
//! - `SingletonPolicy::SingleInstance` (rerun asks before stopping).
//! - `DefaultConflictPolicy { confirm: true }`.
//! - `PollBackoff::default()` → first=50ms, factor=1.5, max=100ms.

mod backoff;
mod conflict;
mod singleton;

pub use backoff::PollBackoff;
pub use conflict::{
    AlwaysConfirm, ConfirmRerun, ConflictContext, ConflictDecision, ConflictPolicy,
    DefaultConflictPolicy,
};
pub use singleton::SingletonPolicy;
