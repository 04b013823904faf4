use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::config::CoordinatorConfig;
use super::coordinator::{ExecutionCoordinator, Inner};
use super::foreground::Foreground;
use super::indexing::IndexingGate;
use super::markers::InProgress;
use super::reporter::ErrorReporter;
use crate::events::Bus;
use crate::model::TypeRef;
use crate::pipeline::{BeforeRunPipeline, ProviderRef, RunConfigurationTask};
use crate::policies::{AlwaysConfirm, ConfirmRerun, ConflictPolicy, DefaultConflictPolicy};
use crate::registry::ConfigurationRegistry;
use crate::runners::{CommandRunner, RunnerRef, RunnerRegistry};
use crate::running::RunningRegistry;
use crate::store::ConfigurationStore;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for an [`ExecutionCoordinator`] and the components it owns.
pub struct CoordinatorBuilder {
    cfg: CoordinatorConfig,
    types: Vec<TypeRef>,
    runners: Vec<RunnerRef>,
    providers: Vec<ProviderRef>,
    policy: Option<Arc<dyn ConflictPolicy>>,
    confirm: Arc<dyn ConfirmRerun>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    indexing: IndexingGate,
}

impl CoordinatorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: CoordinatorConfig) -> Self {
        Self {
            cfg,
            types: Vec::new(),
            runners: Vec::new(),
            providers: Vec::new(),
            policy: None,
            confirm: Arc::new(AlwaysConfirm),
            reporter: None,
            subscribers: Vec::new(),
            indexing: IndexingGate::new(),
        }
    }

    /// Registers configuration types, in rank order.
    pub fn with_types(mut self, types: impl IntoIterator<Item = TypeRef>) -> Self {
        self.types.extend(types);
        self
    }

    /// Registers one configuration type.
    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.types.push(ty);
        self
    }

    /// Registers a program runner.
    ///
    /// Runners are consulted in registration order; the built-in command
    /// runner comes last.
    pub fn with_runner(mut self, runner: RunnerRef) -> Self {
        self.runners.push(runner);
        self
    }

    /// Registers a before-run provider.
    pub fn with_provider(mut self, provider: ProviderRef) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replaces the default conflict policy.
    pub fn with_policy(mut self, policy: Arc<dyn ConflictPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the rerun confirmation hook (default: always confirm).
    pub fn with_confirm(mut self, confirm: Arc<dyn ConfirmRerun>) -> Self {
        self.confirm = confirm;
        self
    }

    /// Sets the error reporter for failed launches.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive coordinator and store events through dedicated
    /// workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Shares an indexing gate owned by the caller.
    pub fn with_indexing_gate(mut self, gate: IndexingGate) -> Self {
        self.indexing = gate;
        self
    }

    /// Builds the coordinator. Must be called inside a Tokio runtime.
    ///
    /// This consumes the builder and initializes:
    /// - event bus and subscriber workers
    /// - type registry and configuration store
    /// - before-run pipeline (with the run-configuration provider)
    /// - runner registry (with the command runner)
    /// - foreground loop
    pub fn build(self) -> ExecutionCoordinator {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();

        let registry = Arc::new(ConfigurationRegistry::new(self.types));
        let store = Arc::new(ConfigurationStore::new(
            Arc::clone(&registry),
            bus.clone(),
            self.cfg.recents_limit,
        ));

        let run_configuration: ProviderRef = Arc::new(RunConfigurationTask::new(Arc::clone(&store)));
        let pipeline = Arc::new(BeforeRunPipeline::new(
            std::iter::once(run_configuration).chain(self.providers),
        ));

        let command: RunnerRef = Arc::new(CommandRunner::new());
        let runners = Arc::new(RunnerRegistry::new(self.runners));
        if runners.by_id(command.id()).is_none() {
            runners.register(command);
        }

        let policy = self.policy.unwrap_or_else(|| {
            Arc::new(DefaultConflictPolicy {
                confirm: self.cfg.confirm_rerun,
            })
        });

        if !self.subscribers.is_empty() {
            subscriber_listener(&bus, SubscriberSet::new(self.subscribers), token.clone());
        }

        let inner = Arc::new(Inner {
            foreground: Foreground::spawn(token.clone()),
            cfg: self.cfg,
            bus,
            store,
            registry,
            runners,
            pipeline,
            running: Arc::new(RunningRegistry::new()),
            policy,
            confirm: self.confirm,
            reporter: self.reporter,
            indexing: self.indexing,
            token,
            in_progress: InProgress::default(),
            awaiting: DashMap::new(),
            states: DashMap::new(),
            completions: DashMap::new(),
            admission: Default::default(),
        });
        ExecutionCoordinator::from_inner(inner)
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, set: SubscriberSet, token: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let ev = tokio::select! {
                _ = token.cancelled() => break,
                ev = rx.recv() => ev,
            };
            match ev {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    });
}

impl ExecutionCoordinator {
    /// Shorthand for [`CoordinatorBuilder::new`].
    pub fn builder(cfg: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(cfg)
    }
}
