//! # launchvisor
//!
//! **Launchvisor** keeps a project's run configurations and drives their
//! launches: before-run tasks, singleton restarts, incompatible
//! configurations and running-instance tracking.
//!
//! The crate is designed as the core of an IDE- or tool-side launcher: the
//! user-facing surfaces (dialogs, consoles, tool windows) plug in through
//! traits; this crate owns the bookkeeping and the launch state machine.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌────────────────────────┐      ┌──────────────────────────┐
//!  │ ConfigurationRegistry  │◄─────┤ ConfigurationStore       │◄── load/save (StateStorage)
//!  │ types, templates,      │      │ records, selection,      │
//!  │ effective before-run   │      │ order, recents           │
//!  └──────────┬─────────────┘      └────────────┬─────────────┘
//!             │                                 │
//!             ▼                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ExecutionCoordinator                                             │
//! │  - admission (conflicts, in-progress markers, pending restarts)   │
//! │  - BeforeRunPipeline (providers, nested launches)                 │
//! │  - RunnerRegistry (ProgramRunner per executor)                    │
//! │  - foreground loop (start step, confirmations, error reports)     │
//! │  - RunningRegistry (live descriptors)                             │
//! └──────┬────────────────────────────────────────────────────┬───────┘
//!        │ publish(Event)                                     │ ProcessHandle
//!        ▼                                                    ▼
//! ┌───────────────────────────────┐                ┌─────────────────────┐
//! │ Bus                           │                │ process lifecycle   │
//! │ - synchronous Listen-ers      │◄── relay ──────┤ terminating /       │
//! │ - broadcast ─► SubscriberSet  │                │ terminated          │
//! └───────────────────────────────┘                └─────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! execute(env)
//!   ├─ runner + validation ── fail ──► Failed
//!   ├─ conflicts? ── yes ──► policy ──► stop conflicts ──► pending restart (poll)
//!   └─ Scheduled ──► BeforeRun (optional) ──► Starting ──► Running
//!                         │                      │            │
//!                         └── veto/fail ─────────┴──► Failed  ▼
//!                                                   Terminating ──► Terminated
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                                      |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------------------|
//! | **Store**         | Records, selection, ordering, temporary recents, persistence. | [`ConfigurationStore`], [`StateStorage`]                |
//! | **Types**         | Configuration types, factories, templates.                    | [`ConfigurationType`], [`ConfigurationRegistry`]        |
//! | **Before-run**    | Ordered, vetoable tasks before a launch.                      | [`BeforeRunProvider`], [`ProviderFn`]                   |
//! | **Launching**     | Launch state machine and restart protocol.                    | [`ExecutionCoordinator`], [`ProgramRunner`]             |
//! | **Policies**      | Singleton, conflict and poll policies.                        | [`SingletonPolicy`], [`ConflictPolicy`], [`PollBackoff`] |
//! | **Events**        | Store and launch notifications.                               | [`Event`], [`Bus`], [`Subscribe`]                       |
//! | **Errors**        | Typed errors for launches, providers and the store.           | [`LaunchError`], [`BeforeRunError`], [`StoreError`]     |
//! | **Configuration** | Centralized settings.                                         | [`CoordinatorConfig`]                                   |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber that logs events via `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use launchvisor::{
//!     CommandLine, ConfigurationRecord, CoordinatorConfig, ExecutionCoordinator,
//!     ExecutionEnvironment, Executor, SimpleType,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = ExecutionCoordinator::builder(CoordinatorConfig::default())
//!         .with_type(SimpleType::new("Shell").into_ref())
//!         .build();
//!
//!     let record = coordinator.store().add(
//!         ConfigurationRecord::new("hello", "Shell")
//!             .with_command(CommandLine::new("echo", ["hello"])),
//!     );
//!
//!     let env = ExecutionEnvironment::new(record.as_ref().clone(), Executor::run());
//!     let code = coordinator.launch_and_wait(env).await?;
//!     println!("exited with {code:?}");
//!
//!     coordinator.dispose();
//!     Ok(())
//! }
//! ```

mod core;
mod error;
mod events;
mod model;
mod pipeline;
mod policies;
mod process;
mod registry;
mod runners;
mod running;
mod store;
pub mod subscribers;

#[cfg(test)]
mod testkit;

// ---- Public re-exports ----

pub use crate::core::{
    ChannelReporter, CoordinatorBuilder, CoordinatorConfig, ErrorReporter, ExecutionCoordinator,
    FailureReport, InProgressMarker, IndexingGate, LaunchOutcome, LaunchState,
};
pub use error::{BeforeRunError, LaunchError, StoreError};
pub use events::{Bus, Event, EventKind, Listen};
pub use model::{
    BeforeRunTask, CommandLine, ConfigurationFactory, ConfigurationRecord, ConfigurationType,
    ExecutionEnvironment, ExecutionTarget, Executor, RecordHandle, SettingsIssue, SimpleType,
    StorageTier, TypeRef, UNKNOWN_TYPE_ID,
};
pub use pipeline::{
    BeforeRunContext, BeforeRunPipeline, BeforeRunProvider, NestedLauncher, ProviderFn,
    ProviderRef, RunConfigurationTask, RUN_CONFIGURATION_PROVIDER,
};
pub use policies::{
    AlwaysConfirm, ConfirmRerun, ConflictContext, ConflictDecision, ConflictPolicy,
    DefaultConflictPolicy, PollBackoff, SingletonPolicy,
};
pub use process::{
    request_stop, ChildProcess, ContentDescriptor, ProcessHandle, ProcessListener, ProcessSignals,
    TerminationReason,
};
pub use registry::ConfigurationRegistry;
pub use runners::{CommandRunner, ProgramRunner, RunnerRef, RunnerRegistry, COMMAND_RUNNER};
pub use running::{RunningEntry, RunningRegistry};
pub use store::{
    by_custom_order, by_name, Comparator, ConfigurationStore, FileStorage, FolderGroup,
    PersistedState, StateStorage, TypeGroup,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a logging subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
