//! # Configuration registry: types, factories and templates.
//!
//! [`ConfigurationRegistry`] knows the registered [`ConfigurationType`]s (in
//! registration order, which is also the type sort order) and owns one
//! template record per `(type, factory)` pair.
//!
//! ## Templates
//! ```text
//! template_for(factory)
//!   ├─ cached?  ──► return it
//!   └─ create   ──► record { template: true, singleton: factory.singleton,
//!                            before_run: factory.default_before_run }
//!
//! key = "type"          (single-factory types)
//!     = "type.factory"  (otherwise)
//! ```
//! Unregistering (or replacing) a type drops that type's templates only.
//! Templates installed with [`put_template`](ConfigurationRegistry::put_template)
//! or edited with [`set_template_before_run`](ConfigurationRegistry::set_template_before_run)
//! are "edited" and persist with the store; lazily created ones do not.
//!
//! ## Effective before-run tasks
//! - Record without an explicit list: the template's enabled tasks.
//! - Record with a list: its own enabled tasks, then enabled template tasks
//!   whose provider the record does not mention. A disabled entry in the
//!   record therefore suppresses the template's task of that provider.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::LaunchError;
use crate::model::{
    unknown_type, BeforeRunTask, ConfigurationFactory, ConfigurationRecord, Executor,
    SettingsIssue, TypeRef, UNKNOWN_TYPE_ID,
};

struct Template {
    record: Arc<ConfigurationRecord>,
    edited: bool,
}

/// Registered configuration types and their templates.
pub struct ConfigurationRegistry {
    types: RwLock<Vec<TypeRef>>,
    templates: Mutex<HashMap<String, Template>>,
    unknown: TypeRef,
}

impl Default for ConfigurationRegistry {
    fn default() -> Self {
        Self {
            types: RwLock::new(Vec::new()),
            templates: Mutex::new(HashMap::new()),
            unknown: unknown_type(),
        }
    }
}

impl ConfigurationRegistry {
    /// Creates a registry with the given types (in sort order).
    pub fn new(types: impl IntoIterator<Item = TypeRef>) -> Self {
        let reg = Self::default();
        reg.types.write().extend(types);
        reg
    }

    /// Registers a type. Re-registering an id replaces it in place and
    /// drops the replaced type's templates.
    pub fn register_type(&self, ty: TypeRef) {
        let replaced = {
            let mut types = self.types.write();
            match types.iter_mut().find(|t| t.id() == ty.id()) {
                Some(slot) => {
                    *slot = Arc::clone(&ty);
                    true
                }
                None => {
                    types.push(Arc::clone(&ty));
                    false
                }
            }
        };
        if replaced {
            self.drop_templates_of(ty.id());
        }
    }

    /// Unregisters a type. Records of that type resolve to the unknown type
    /// from now on. Returns false if the type was not registered.
    pub fn unregister_type(&self, type_id: &str) -> bool {
        let removed = {
            let mut types = self.types.write();
            let before = types.len();
            types.retain(|t| t.id() != type_id);
            types.len() != before
        };
        if removed {
            self.drop_templates_of(type_id);
        }
        removed
    }

    fn drop_templates_of(&self, type_id: &str) {
        self.templates
            .lock()
            .retain(|_, t| t.record.type_id != type_id);
    }

    /// Registered types in sort order.
    pub fn types(&self) -> Vec<TypeRef> {
        self.types.read().clone()
    }

    /// Resolves a type id, falling back to the unknown type.
    pub fn type_of(&self, type_id: &str) -> TypeRef {
        self.find_type(type_id)
            .unwrap_or_else(|| Arc::clone(&self.unknown))
    }

    /// True if `type_id` is registered.
    pub fn is_known(&self, type_id: &str) -> bool {
        self.find_type(type_id).is_some()
    }

    /// True if records of `type_id` are managed (registered and not synthetic).
    pub fn is_managed(&self, type_id: &str) -> bool {
        self.find_type(type_id).is_some_and(|t| t.is_managed())
    }

    /// Sort rank of a type: registration index, unknown types last.
    pub fn type_rank(&self, type_id: &str) -> usize {
        self.types
            .read()
            .iter()
            .position(|t| t.id() == type_id)
            .unwrap_or(usize::MAX)
    }

    /// Resolves the factory of a record's `(type, factory)` pair.
    ///
    /// Without a factory id (or for single-factory types) the type's first
    /// factory is used; unresolvable pairs fall back to the unknown type.
    pub fn factory(&self, type_id: &str, factory_id: Option<&str>) -> ConfigurationFactory {
        let ty = self.type_of(type_id);
        let factories = ty.factories();
        let found = match factory_id {
            Some(id) if factories.len() > 1 => factories.iter().find(|f| f.id == id),
            _ => factories.first(),
        };
        match found {
            Some(f) => f.clone(),
            None => ConfigurationFactory::new(UNKNOWN_TYPE_ID, UNKNOWN_TYPE_ID),
        }
    }

    /// Template cache key of a factory.
    pub fn factory_key(&self, factory: &ConfigurationFactory) -> String {
        let single = self
            .find_type(&factory.type_id)
            .map_or(true, |t| t.factories().len() <= 1);
        if single {
            factory.type_id.clone()
        } else {
            format!("{}.{}", factory.type_id, factory.id)
        }
    }

    /// Returns the cached template of `factory`, creating it on first use.
    pub fn template_for(&self, factory: &ConfigurationFactory) -> Arc<ConfigurationRecord> {
        let key = self.factory_key(factory);
        let mut templates = self.templates.lock();
        let template = templates.entry(key).or_insert_with(|| {
            let mut rec = ConfigurationRecord::new("<template>", factory.type_id.clone())
                .with_singleton(factory.singleton)
                .with_before_run(factory.default_before_run.clone());
            rec.template = true;
            if factory.id != factory.type_id {
                rec.factory_id = Some(factory.id.clone());
            }
            Template {
                record: Arc::new(rec),
                edited: false,
            }
        });
        Arc::clone(&template.record)
    }

    /// Template of a record's `(type, factory)` pair.
    pub fn template_of(&self, record: &ConfigurationRecord) -> Arc<ConfigurationRecord> {
        let factory = self.factory(&record.type_id, record.factory_id.as_deref());
        self.template_for(&factory)
    }

    /// Replaces the before-run tasks of a factory's template.
    pub fn set_template_before_run(&self, factory: &ConfigurationFactory, tasks: Vec<BeforeRunTask>) {
        let current = self.template_for(factory);
        let mut updated = (*current).clone();
        updated.before_run = Some(tasks);
        self.templates.lock().insert(
            self.factory_key(factory),
            Template {
                record: Arc::new(updated),
                edited: true,
            },
        );
    }

    /// Installs `record` as the template of its `(type, factory)` pair.
    ///
    /// Templates of unregistered types are ignored. Returns true if installed.
    pub fn put_template(&self, mut record: ConfigurationRecord) -> bool {
        if !self.is_known(&record.type_id) {
            tracing::debug!(type_id = %record.type_id, "template of an unknown type ignored");
            return false;
        }
        record.template = true;
        let factory = self.factory(&record.type_id, record.factory_id.as_deref());
        self.templates.lock().insert(
            self.factory_key(&factory),
            Template {
                record: Arc::new(record),
                edited: true,
            },
        );
        true
    }

    /// Edited templates of registered types, ordered by cache key.
    pub fn edited_templates(&self) -> Vec<Arc<ConfigurationRecord>> {
        let templates = self.templates.lock();
        let mut edited: Vec<_> = templates
            .iter()
            .filter(|(_, t)| t.edited && self.is_known(&t.record.type_id))
            .collect();
        edited.sort_by(|a, b| a.0.cmp(b.0));
        edited.into_iter().map(|(_, t)| Arc::clone(&t.record)).collect()
    }

    /// Drops every cached template.
    pub fn drop_cache(&self) {
        self.templates.lock().clear();
    }

    /// Number of cached templates.
    pub fn template_count(&self) -> usize {
        self.templates.lock().len()
    }

    /// Creates a new record seeded from the template of `factory`.
    pub fn create_record(&self, name: impl Into<String>, factory: &ConfigurationFactory) -> ConfigurationRecord {
        let template = self.template_for(factory);
        let mut rec = template.duplicate();
        rec.name = name.into();
        rec.template = false;
        rec.before_run = None;
        rec
    }

    /// Before-run tasks a launch of `record` actually runs.
    pub fn effective_before_run(&self, record: &ConfigurationRecord) -> Vec<BeforeRunTask> {
        let template = if record.template {
            None
        } else {
            Some(self.template_of(record))
        };
        let inherited: &[BeforeRunTask] = template
            .as_deref()
            .and_then(|t| t.before_run.as_deref())
            .unwrap_or(&[]);

        let Some(own) = record.before_run.as_deref() else {
            return inherited.iter().filter(|t| t.enabled).cloned().collect();
        };

        let mut tasks: Vec<BeforeRunTask> = own.iter().filter(|t| t.enabled).cloned().collect();
        tasks.extend(
            inherited
                .iter()
                .filter(|t| t.enabled && !own.iter().any(|o| o.provider_id == t.provider_id))
                .cloned(),
        );
        tasks
    }

    /// Validates a record's settings for `executor`.
    ///
    /// Errors reject the launch; warnings are logged and pass.
    pub fn can_run(&self, record: &ConfigurationRecord, executor: &Executor) -> Result<(), LaunchError> {
        let ty = self.type_of(&record.type_id);
        if !ty.is_managed() {
            return Err(LaunchError::Validation {
                record: record.unique_id(),
                message: format!("unknown configuration type '{}'", record.type_id),
            });
        }
        match ty.check_settings(record, executor) {
            Ok(()) => Ok(()),
            Err(SettingsIssue::Warning(message)) => {
                tracing::warn!(record = %record.unique_id(), %message, "configuration settings warning");
                Ok(())
            }
            Err(SettingsIssue::Error(message)) => Err(LaunchError::Validation {
                record: record.unique_id(),
                message,
            }),
        }
    }

    fn find_type(&self, type_id: &str) -> Option<TypeRef> {
        self.types
            .read()
            .iter()
            .find(|t| t.id() == type_id)
            .cloned()
    }
}
