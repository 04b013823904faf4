//! # Configuration types and factories.
//!
//! A [`ConfigurationType`] groups one or more [`ConfigurationFactory`]s. Each
//! `(type, factory)` pair owns one template record in the registry; templates
//! are keyed by the type id alone for single-factory types.
//!
//! [`SimpleType`] covers the common case; implement the trait directly when a
//! type needs custom settings validation.

use std::sync::Arc;

use crate::model::environment::Executor;
use crate::model::record::ConfigurationRecord;
use crate::model::task::BeforeRunTask;
use crate::policies::SingletonPolicy;

/// Id of the synthetic type records fall back to when their type is not registered.
pub const UNKNOWN_TYPE_ID: &str = "Unknown";

/// Outcome of a settings check that did not pass cleanly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsIssue {
    /// Blocks the launch.
    Error(String),
    /// Informational; the launch proceeds.
    Warning(String),
}

/// Creates records of one flavor of a type and declares their defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurationFactory {
    /// Factory id (unique within the type).
    pub id: String,
    /// Owning type id.
    pub type_id: String,
    /// Default parallel-run policy for new records.
    pub singleton: SingletonPolicy,
    /// Hard-coded before-run tasks seeded into the template.
    pub default_before_run: Vec<BeforeRunTask>,
}

impl ConfigurationFactory {
    /// Creates a factory with default policies and no before-run tasks.
    pub fn new(type_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            singleton: SingletonPolicy::default(),
            default_before_run: Vec::new(),
        }
    }

    /// Builder: sets the default singleton policy.
    pub fn with_singleton(mut self, singleton: SingletonPolicy) -> Self {
        self.singleton = singleton;
        self
    }

    /// Builder: appends a hard-coded before-run task.
    pub fn with_before_run(mut self, task: BeforeRunTask) -> Self {
        self.default_before_run.push(task);
        self
    }
}

/// # A kind of run configuration.
#[allow(unused_variables)]
pub trait ConfigurationType: Send + Sync + 'static {
    /// Stable type id.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn display_name(&self) -> &str {
        self.id()
    }

    /// Factories of this type (at least one).
    fn factories(&self) -> &[ConfigurationFactory];

    /// Unmanaged types (e.g. the unknown type) are never auto-selected and
    /// cannot have their before-run tasks edited.
    fn is_managed(&self) -> bool {
        true
    }

    /// Whether records of this type may launch while the project is indexing.
    fn is_indexing_aware(&self) -> bool {
        false
    }

    /// Validates `record` for `executor`.
    fn check_settings(
        &self,
        record: &ConfigurationRecord,
        executor: &Executor,
    ) -> Result<(), SettingsIssue> {
        Ok(())
    }
}

/// Shared handle to a configuration type.
pub type TypeRef = Arc<dyn ConfigurationType>;

/// Plain data-driven configuration type.
#[derive(Clone, Debug)]
pub struct SimpleType {
    id: String,
    display_name: String,
    factories: Vec<ConfigurationFactory>,
    managed: bool,
    indexing_aware: bool,
}

impl SimpleType {
    /// Single-factory type whose factory id equals the type id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            factories: vec![ConfigurationFactory::new(id.clone(), id.clone())],
            id,
            managed: true,
            indexing_aware: false,
        }
    }

    /// Type with an explicit factory list.
    pub fn with_factories(id: impl Into<String>, factories: Vec<ConfigurationFactory>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            factories,
            managed: true,
            indexing_aware: false,
        }
    }

    /// Builder: sets the display name.
    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Builder: marks the type indexing-aware.
    pub fn indexing_aware(mut self, aware: bool) -> Self {
        self.indexing_aware = aware;
        self
    }

    /// Builder: maps the only/first factory.
    pub fn map_factory(mut self, f: impl FnOnce(ConfigurationFactory) -> ConfigurationFactory) -> Self {
        if let Some(first) = self.factories.first_mut() {
            *first = f(first.clone());
        }
        self
    }

    /// Converts into a shared handle.
    pub fn into_ref(self) -> TypeRef {
        Arc::new(self)
    }
}

impl ConfigurationType for SimpleType {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn factories(&self) -> &[ConfigurationFactory] {
        &self.factories
    }

    fn is_managed(&self) -> bool {
        self.managed
    }

    fn is_indexing_aware(&self) -> bool {
        self.indexing_aware
    }
}

/// Fallback type for records whose type is not registered.
pub(crate) fn unknown_type() -> TypeRef {
    let mut ty = SimpleType::new(UNKNOWN_TYPE_ID).indexing_aware(true);
    ty.managed = false;
    Arc::new(ty)
}
