//! Data model: records, before-run tasks, configuration types and environments.
//!
//! ## Contents
//! - [`ConfigurationRecord`], [`RecordHandle`], [`StorageTier`], [`CommandLine`]
//! - [`BeforeRunTask`]
//! - [`ConfigurationType`], [`ConfigurationFactory`], [`SimpleType`], [`SettingsIssue`]
//! - [`ExecutionEnvironment`], [`Executor`], [`ExecutionTarget`]

mod environment;
mod record;
mod task;
mod types;

pub use environment::{ExecutionEnvironment, ExecutionTarget, Executor};
pub use record::{CommandLine, ConfigurationRecord, RecordHandle, StorageTier};
pub use task::BeforeRunTask;
pub(crate) use types::unknown_type;
pub use types::{
    ConfigurationFactory, ConfigurationType, SettingsIssue, SimpleType, TypeRef, UNKNOWN_TYPE_ID,
};
