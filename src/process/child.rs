//! # OS child processes.
//!
//! [`ChildProcess`] adapts a [`tokio::process::Child`] to [`ProcessHandle`].
//! The process is spawned eagerly; exit is observed by a waiter task started
//! from [`ProcessHandle::start_notify`].
//!
//! ```text
//! spawn() ──► child parked ──► start_notify() ──► waiter task
//!                                                   ├─ child.wait() ─► terminated(code)
//!                                                   ├─ destroy      ─► SIGTERM, keep waiting
//!                                                   ├─ kill         ─► start_kill, wait ─► terminated(code)
//!                                                   └─ detach       ─► terminated(None), child left running
//! ```
//!
//! A stop request before `start_notify` starts the waiter itself, so the
//! child is always reaped. Outside unix `destroy` is as forceful as `kill`.

use std::io;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::watch;

use super::handle::{ProcessHandle, ProcessSignals};
use crate::model::CommandLine;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Control {
    Run,
    Terminate,
    Kill,
    Detach,
}

/// A spawned OS process.
pub struct ChildProcess {
    pid: Option<u32>,
    signals: Arc<ProcessSignals>,
    child: Mutex<Option<Child>>,
    control: watch::Sender<Control>,
}

impl ChildProcess {
    /// Spawns `command` (stdin closed, output inherited).
    pub fn spawn(command: &CommandLine) -> io::Result<Arc<Self>> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        let child = cmd.spawn()?;
        let (control, _) = watch::channel(Control::Run);

        tracing::debug!(program = %command.program, pid = ?child.id(), "process spawned");
        Ok(Arc::new(Self {
            pid: child.id(),
            signals: Arc::new(ProcessSignals::new()),
            child: Mutex::new(Some(child)),
            control,
        }))
    }

    /// OS process id (absent once reaped).
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn request(&self, control: Control) {
        self.signals.notify_terminating();
        self.control.send_replace(control);
        // No-op once the waiter runs.
        self.start_notify();
    }
}

/// Asks the child to exit (SIGTERM on unix).
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: signals our own unreaped child; `id()` is None once reaped.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
    }
    let _ = child.start_kill();
}

impl ProcessHandle for ChildProcess {
    fn start_notify(&self) {
        let Some(mut child) = self.child.lock().take() else {
            return;
        };
        let mut control = self.control.subscribe();
        let signals = Arc::clone(&self.signals);

        tokio::spawn(async move {
            let code = loop {
                let requested = *control.borrow_and_update();
                match requested {
                    Control::Kill => {
                        let _ = child.start_kill();
                        break child.wait().await.ok().and_then(|s| s.code());
                    }
                    Control::Terminate => terminate(&mut child),
                    Control::Detach => break None,
                    Control::Run => {}
                }
                tokio::select! {
                    status = child.wait() => {
                        break status.ok().and_then(|s| s.code());
                    }
                    changed = control.changed() => {
                        if changed.is_err() {
                            break None;
                        }
                    }
                }
            };
            tracing::debug!(exit_code = ?code, "process exited");
            signals.notify_terminated(code);
        });
    }

    fn destroy(&self) {
        self.request(Control::Terminate);
    }

    fn detach(&self) {
        self.request(Control::Detach);
    }

    fn kill(&self) {
        self.request(Control::Kill);
    }

    fn signals(&self) -> &ProcessSignals {
        &self.signals
    }
}
