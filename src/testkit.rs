//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::LaunchError;
use crate::events::{Bus, Event, EventKind, Listen};
use crate::model::{ConfigurationRecord, ExecutionEnvironment};
use crate::process::{ContentDescriptor, ProcessHandle, ProcessSignals};
use crate::runners::ProgramRunner;

/// In-memory process. `destroy` terminates right away unless stubborn.
#[derive(Default)]
pub(crate) struct FakeProcess {
    signals: ProcessSignals,
    stubborn: bool,
    starts: AtomicUsize,
    destroys: AtomicUsize,
    kills: AtomicUsize,
}

impl FakeProcess {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A process that only reports `terminating` on destroy; kill ends it.
    pub(crate) fn stubborn() -> Arc<Self> {
        Arc::new(Self {
            stubborn: true,
            ..Self::default()
        })
    }

    /// Natural exit.
    pub(crate) fn finish(&self, exit_code: Option<i32>) -> bool {
        self.signals.notify_terminated(exit_code)
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn destroy_calls(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub(crate) fn kill_calls(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessHandle for FakeProcess {
    fn start_notify(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.signals.notify_terminating();
        if !self.stubborn {
            self.signals.notify_terminated(None);
        }
    }

    fn detach(&self) {
        self.signals.notify_terminated(None);
    }

    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.signals.notify_terminated(None);
    }

    fn signals(&self) -> &ProcessSignals {
        &self.signals
    }
}

#[derive(Clone)]
enum Mode {
    Process,
    Stubborn,
    PreTerminated(Option<i32>),
    Nothing,
    Fail(String),
    Panic,
}

pub(crate) struct Launch {
    pub(crate) env: ExecutionEnvironment,
    pub(crate) process: Arc<FakeProcess>,
    pub(crate) descriptor: Arc<ContentDescriptor>,
}

/// Runner that hands out [`FakeProcess`]es and records every launch.
pub(crate) struct FakeRunner {
    id: String,
    executor: Option<String>,
    mode: Mode,
    attempts: AtomicUsize,
    launches: Mutex<Vec<Launch>>,
}

impl FakeRunner {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            executor: None,
            mode: Mode::Process,
            attempts: AtomicUsize::new(0),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Only accepts `executor`.
    pub(crate) fn with_executor(mut self, executor: &str) -> Self {
        self.executor = Some(executor.to_string());
        self
    }

    pub(crate) fn stubborn(mut self) -> Self {
        self.mode = Mode::Stubborn;
        self
    }

    /// The process has already exited when `execute` returns.
    pub(crate) fn pre_terminated(mut self, exit_code: Option<i32>) -> Self {
        self.mode = Mode::PreTerminated(exit_code);
        self
    }

    pub(crate) fn returning_nothing(mut self) -> Self {
        self.mode = Mode::Nothing;
        self
    }

    pub(crate) fn failing(mut self, message: &str) -> Self {
        self.mode = Mode::Fail(message.to_string());
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.mode = Mode::Panic;
        self
    }

    pub(crate) fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of `execute` calls.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of launches that produced a process.
    pub(crate) fn launches(&self) -> usize {
        self.launches.lock().len()
    }

    pub(crate) fn process(&self, i: usize) -> Arc<FakeProcess> {
        Arc::clone(&self.launches.lock()[i].process)
    }

    pub(crate) fn descriptor(&self, i: usize) -> Arc<ContentDescriptor> {
        Arc::clone(&self.launches.lock()[i].descriptor)
    }

    pub(crate) fn env(&self, i: usize) -> ExecutionEnvironment {
        self.launches.lock()[i].env.clone()
    }
}

#[async_trait]
impl ProgramRunner for FakeRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn can_run(&self, executor_id: &str, _record: &ConfigurationRecord) -> bool {
        self.executor.as_deref().map_or(true, |e| e == executor_id)
    }

    async fn execute(&self, env: &ExecutionEnvironment) -> Result<Option<Arc<ContentDescriptor>>, LaunchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let process = match &self.mode {
            Mode::Process | Mode::PreTerminated(_) => FakeProcess::arc(),
            Mode::Stubborn => FakeProcess::stubborn(),
            Mode::Nothing => return Ok(None),
            Mode::Fail(message) => {
                return Err(LaunchError::StartFailed {
                    message: message.clone(),
                })
            }
            Mode::Panic => panic!("runner exploded"),
        };
        if let Mode::PreTerminated(code) = self.mode {
            process.finish(code);
        }
        let descriptor = ContentDescriptor::new(env.record().name.clone(), process.clone());
        self.launches.lock().push(Launch {
            env: env.clone(),
            process,
            descriptor: Arc::clone(&descriptor),
        });
        Ok(Some(descriptor))
    }
}

/// Synchronous bus listener that keeps every event.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<Event>>,
    notify: Notify,
}

impl Recorder {
    pub(crate) fn attach(bus: &Bus) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        bus.listen(recorder.clone());
        recorder
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub(crate) fn last(&self, kind: EventKind) -> Option<Event> {
        self.events.lock().iter().rev().find(|e| e.kind == kind).cloned()
    }

    /// Waits until at least `n` events of `kind` were seen. Panics after 5s.
    pub(crate) async fn wait_for(&self, kind: EventKind, n: usize) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.count(kind) >= n {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), wait).await.is_err() {
            panic!("timed out waiting for {n} x {kind:?}; saw {:?}", self.kinds());
        }
    }
}

impl Listen for Recorder {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
        self.notify.notify_waiters();
    }
}
