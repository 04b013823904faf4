//! # Before-run pipeline.
//!
//! - [`BeforeRunProvider`], [`ProviderRef`], [`ProviderFn`] task implementations
//! - [`BeforeRunContext`], [`NestedLauncher`] what providers see of the launch
//! - [`BeforeRunPipeline`] provider map and sequential runner
//! - [`RunConfigurationTask`] built-in provider running another configuration

mod provider;
mod provider_fn;
mod run;
mod run_configuration;

pub use provider::{BeforeRunContext, BeforeRunProvider, NestedLauncher, ProviderRef};
pub use provider_fn::ProviderFn;
pub use run::BeforeRunPipeline;
pub use run_configuration::{RunConfigurationTask, RUN_CONFIGURATION_PROVIDER};
