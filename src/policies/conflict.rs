//! # Conflict resolution for restarts.
//!
//! When a launch finds running instances it conflicts with, a
//! [`ConflictPolicy`] decides what happens:
//!
//! - [`ConflictDecision::NoAction`]: leave the running instances alone and launch nothing;
//! - [`ConflictDecision::Ask`]: ask [`ConfirmRerun`]; stop and relaunch only if confirmed;
//! - [`ConflictDecision::Proceed`]: stop the conflicting instances and relaunch.
//!
//! ## Conflict sets
//! ```text
//! same          running instances of the same configuration (only when it
//!               disallows parallel runs)
//! incompatible  running instances whose unique id the NEW configuration lists
//!               in `incompatible_with` (asymmetric)
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::ConfigurationRecord;
use crate::process::ContentDescriptor;

/// Outcome of a conflict policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Launch nothing; the running instance stands.
    NoAction,
    /// Ask for confirmation, then proceed or abort.
    Ask,
    /// Stop the conflicting instances and launch.
    Proceed,
}

/// Input to a [`ConflictPolicy`].
pub struct ConflictContext<'a> {
    /// Record being launched.
    pub record: &'a ConfigurationRecord,
    /// Running instances of the same configuration.
    pub same: &'a [Arc<ContentDescriptor>],
    /// Running instances the new configuration is incompatible with.
    pub incompatible: &'a [Arc<ContentDescriptor>],
    /// Descriptor the new launch will reuse, if any.
    pub reuse: Option<&'a Arc<ContentDescriptor>>,
}

impl ConflictContext<'_> {
    /// True if nothing conflicts.
    pub fn is_empty(&self) -> bool {
        self.same.is_empty() && self.incompatible.is_empty()
    }
}

/// Pluggable conflict policy.
pub trait ConflictPolicy: Send + Sync + 'static {
    /// Decides how to treat the conflicts in `ctx` (never called with an empty context).
    fn decide(&self, ctx: &ConflictContext<'_>) -> ConflictDecision;
}

/// Default policy: ask, unless the rerun targets the very descriptor being
/// reused or the configuration restarts silently.
#[derive(Clone, Copy, Debug)]
pub struct DefaultConflictPolicy {
    /// When false, every conflict proceeds without asking.
    pub confirm: bool,
}

impl Default for DefaultConflictPolicy {
    fn default() -> Self {
        Self { confirm: true }
    }
}

impl ConflictPolicy for DefaultConflictPolicy {
    fn decide(&self, ctx: &ConflictContext<'_>) -> ConflictDecision {
        if !self.confirm {
            return ConflictDecision::Proceed;
        }
        if !ctx.incompatible.is_empty() {
            return ConflictDecision::Ask;
        }
        if ctx.record.singleton.restarts_silently() {
            return ConflictDecision::Proceed;
        }
        let reusing_only_instance = ctx.same.len() == 1
            && ctx
                .reuse
                .is_some_and(|reuse| Arc::ptr_eq(reuse, &ctx.same[0]));
        if reusing_only_instance {
            ConflictDecision::Proceed
        } else {
            ConflictDecision::Ask
        }
    }
}

/// User confirmation for [`ConflictDecision::Ask`].
///
/// Called on the foreground context.
#[async_trait]
pub trait ConfirmRerun: Send + Sync + 'static {
    /// Returns true to stop `conflicts` and launch `record`.
    async fn confirm(
        &self,
        record: &ConfigurationRecord,
        conflicts: &[Arc<ContentDescriptor>],
    ) -> bool;
}

/// Confirms every rerun (the dialog's default button).
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmRerun for AlwaysConfirm {
    async fn confirm(&self, _: &ConfigurationRecord, _: &[Arc<ContentDescriptor>]) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::SingletonPolicy;
    use crate::testkit::FakeProcess;

    fn desc(name: &str) -> Arc<ContentDescriptor> {
        ContentDescriptor::new(name, FakeProcess::arc())
    }

    #[test]
    fn asks_for_plain_same_instance_conflict() {
        let rec = ConfigurationRecord::new("a", "T");
        let same = vec![desc("a")];
        let ctx = ConflictContext {
            record: &rec,
            same: &same,
            incompatible: &[],
            reuse: None,
        };
        assert_eq!(DefaultConflictPolicy::default().decide(&ctx), ConflictDecision::Ask);
    }

    #[test]
    fn proceeds_when_reusing_the_only_instance() {
        let rec = ConfigurationRecord::new("a", "T");
        let same = vec![desc("a")];
        let ctx = ConflictContext {
            record: &rec,
            same: &same,
            incompatible: &[],
            reuse: Some(&same[0]),
        };
        assert_eq!(
            DefaultConflictPolicy::default().decide(&ctx),
            ConflictDecision::Proceed
        );
    }

    #[test]
    fn silent_restart_policy_proceeds() {
        let rec = ConfigurationRecord::new("a", "T").with_singleton(SingletonPolicy::SingleInstanceOnly);
        let same = vec![desc("a"), desc("a")];
        let ctx = ConflictContext {
            record: &rec,
            same: &same,
            incompatible: &[],
            reuse: None,
        };
        assert_eq!(
            DefaultConflictPolicy::default().decide(&ctx),
            ConflictDecision::Proceed
        );
    }

    #[test]
    fn incompatible_always_asks_unless_confirmation_disabled() {
        let rec = ConfigurationRecord::new("a", "T").with_singleton(SingletonPolicy::SingleInstanceOnly);
        let inc = vec![desc("b")];
        let ctx = ConflictContext {
            record: &rec,
            same: &[],
            incompatible: &inc,
            reuse: None,
        };
        assert_eq!(DefaultConflictPolicy::default().decide(&ctx), ConflictDecision::Ask);
        assert_eq!(
            DefaultConflictPolicy { confirm: false }.decide(&ctx),
            ConflictDecision::Proceed
        );
    }
}
