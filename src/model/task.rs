//! # Before-run task descriptors.
//!
//! A [`BeforeRunTask`] names a provider (resolved at run time through the
//! provider map) plus provider-specific options. Tasks that launch another
//! configuration carry that configuration's unique id in `target`; those are
//! the references stripped when the target record is removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn enabled_default() -> bool {
    true
}

/// A pre-launch step attached to a configuration or template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeRunTask {
    /// Provider id (key into the provider map).
    pub provider_id: String,
    /// Disabled tasks are kept to override template defaults.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Unique id of another configuration this task runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Provider-specific options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl BeforeRunTask {
    /// Creates an enabled task for `provider_id`.
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            enabled: true,
            target: None,
            options: BTreeMap::new(),
        }
    }

    /// Creates a task that runs another configuration first.
    pub fn run_configuration(target_id: impl Into<String>) -> Self {
        Self {
            target: Some(target_id.into()),
            ..Self::new(crate::pipeline::RUN_CONFIGURATION_PROVIDER)
        }
    }

    /// Builder: sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder: adds an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// True if this task targets the record with `id`.
    pub fn references(&self, id: &str) -> bool {
        self.target.as_deref() == Some(id)
    }
}
