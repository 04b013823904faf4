//! # Configuration records.
//!
//! A [`ConfigurationRecord`] is a named, typed, persisted description of how to
//! launch a program. Records carry two identities:
//!
//! - a [`RecordHandle`]: process-local, assigned at creation, survives edits
//!   and renames (the "same object" identity);
//! - a unique id ([`ConfigurationRecord::unique_id`]): derived from type, name
//!   and storage location, used as the key in the store and in persisted state.
//!
//! When an edit changes the unique id, the store migrates the entry from the
//! old id to the new one, keeping its position and recency.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::model::task::BeforeRunTask;
use crate::policies::SingletonPolicy;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-local identity of a record (stable across edits and renames).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHandle(u64);

impl RecordHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value (for logs).
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a record is persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tier", content = "path", rename_all = "snake_case")]
pub enum StorageTier {
    /// Private to the local workspace.
    #[default]
    Workspace,
    /// Shared with the team (project folder).
    Shared,
    /// Stored in an arbitrary file inside the project.
    ArbitraryFile(PathBuf),
}

impl StorageTier {
    /// True for the shared and arbitrary-file tiers.
    pub fn is_shared(&self) -> bool {
        !matches!(self, StorageTier::Workspace)
    }
}

/// Program invocation used by the built-in command runner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    /// Executable path or name.
    pub program: String,
    /// Arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CommandLine {
    /// Creates a command line for `program` with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

/// A stored run configuration.
///
/// Fields are public because records are user-editable; the store owns the
/// canonical copy and hands out clones. A clone keeps the [`RecordHandle`] and
/// therefore denotes the *same* record (use [`ConfigurationRecord::duplicate`]
/// for an independent copy).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    #[serde(skip, default = "RecordHandle::next")]
    handle: RecordHandle,

    /// Display name.
    pub name: String,
    /// Configuration type id.
    #[serde(rename = "type")]
    pub type_id: String,
    /// Factory id (absent for single-factory types).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_id: Option<String>,
    /// Auto-created, subject to eviction.
    #[serde(default, skip_serializing_if = "is_false")]
    pub temporary: bool,
    /// Template record (one per type+factory, held by the registry).
    #[serde(default, skip_serializing_if = "is_false")]
    pub template: bool,
    /// Storage tier.
    #[serde(default)]
    pub storage: StorageTier,
    /// Parallel-run policy.
    #[serde(default)]
    pub singleton: SingletonPolicy,
    /// Explicit before-run tasks. `None` inherits the template's tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_run: Option<Vec<BeforeRunTask>>,
    /// Folder grouping name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Unique ids of configurations that must not run alongside this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incompatible_with: Vec<String>,
    /// Command used by the built-in command runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandLine>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl ConfigurationRecord {
    /// Creates a new workspace-local record with a fresh handle.
    pub fn new(name: impl Into<String>, type_id: impl Into<String>) -> Self {
        Self {
            handle: RecordHandle::next(),
            name: name.into(),
            type_id: type_id.into(),
            factory_id: None,
            temporary: false,
            template: false,
            storage: StorageTier::Workspace,
            singleton: SingletonPolicy::default(),
            before_run: None,
            folder: None,
            incompatible_with: Vec::new(),
            command: None,
        }
    }

    /// Returns the identity handle.
    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    /// Returns an independent copy (fresh handle), e.g. for "copy configuration".
    pub fn duplicate(&self) -> Self {
        Self {
            handle: RecordHandle::next(),
            ..self.clone()
        }
    }

    /// Unique id: `"{type}.{name}"`, with `"@{path}"` appended for records
    /// stored in an arbitrary project file.
    ///
    /// ```
    /// use launchvisor::ConfigurationRecord;
    ///
    /// let rec = ConfigurationRecord::new("server", "Application");
    /// assert_eq!(rec.unique_id(), "Application.server");
    /// ```
    pub fn unique_id(&self) -> String {
        match &self.storage {
            StorageTier::ArbitraryFile(path) => {
                format!("{}.{}@{}", self.type_id, self.name, path.display())
            }
            _ => format!("{}.{}", self.type_id, self.name),
        }
    }

    /// True if parallel instances of this record may run.
    pub fn allows_parallel(&self) -> bool {
        self.singleton.allows_parallel()
    }

    /// True if this record declares itself incompatible with `other_id`.
    pub fn is_incompatible_with(&self, other_id: &str) -> bool {
        self.incompatible_with.iter().any(|id| id == other_id)
    }

    /// Builder: marks the record temporary.
    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    /// Builder: sets the storage tier.
    pub fn with_storage(mut self, storage: StorageTier) -> Self {
        self.storage = storage;
        self
    }

    /// Builder: sets the singleton policy.
    pub fn with_singleton(mut self, singleton: SingletonPolicy) -> Self {
        self.singleton = singleton;
        self
    }

    /// Builder: sets explicit before-run tasks.
    pub fn with_before_run(mut self, tasks: Vec<BeforeRunTask>) -> Self {
        self.before_run = Some(tasks);
        self
    }

    /// Builder: sets the folder.
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Builder: declares incompatibility with another record's unique id.
    pub fn with_incompatible(mut self, other_id: impl Into<String>) -> Self {
        self.incompatible_with.push(other_id.into());
        self
    }

    /// Builder: sets the command line.
    pub fn with_command(mut self, command: CommandLine) -> Self {
        self.command = Some(command);
        self
    }

    /// Builder: sets the factory id.
    pub fn with_factory(mut self, factory_id: impl Into<String>) -> Self {
        self.factory_id = Some(factory_id.into());
        self
    }
}
