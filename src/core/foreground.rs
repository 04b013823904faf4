//! # Foreground execution context.
//!
//! One task runs posted jobs strictly one after another. The coordinator
//! posts the final start step, rerun confirmations and error reports here,
//! so no two launches interleave their start step.
//!
//! ```text
//! post(job) ──► [unbounded queue] ──► loop: job.await (panic-isolated)
//!                                       └─ token cancelled ──► pending jobs dropped
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

type Job = BoxFuture<'static, ()>;

/// Handle to the foreground loop.
#[derive(Clone)]
pub(crate) struct Foreground {
    tx: mpsc::UnboundedSender<Job>,
}

impl Foreground {
    /// Spawns the loop; it stops when `token` is cancelled or every handle is dropped.
    pub(crate) fn spawn(token: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    res = AssertUnwindSafe(job).catch_unwind() => {
                        if res.is_err() {
                            tracing::error!("foreground job panicked");
                        }
                    }
                }
            }
            tracing::debug!("foreground loop stopped");
        });
        Self { tx }
    }

    /// Queues a job. Returns false if the loop has stopped.
    pub(crate) fn post(&self, job: impl Future<Output = ()> + Send + 'static) -> bool {
        self.tx.send(job.boxed()).is_ok()
    }

    /// Runs `fut` on the loop and returns its output, or `None` if the loop
    /// stopped before the job completed.
    pub(crate) async fn call<T, F>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if !self.post(async move {
            let _ = tx.send(fut.await);
        }) {
            return None;
        }
        rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_order_without_interleaving() {
        let fg = Foreground::spawn(CancellationToken::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            fg.post(async move {
                log.lock().push(format!("start {i}"));
                tokio::task::yield_now().await;
                log.lock().push(format!("end {i}"));
            });
        }
        assert_eq!(fg.call(async { 7 }).await, Some(7));
        assert_eq!(
            *log.lock(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn panics_are_isolated() {
        let fg = Foreground::spawn(CancellationToken::new());
        let out = fg
            .call(async {
                if true {
                    panic!("job bug");
                }
            })
            .await;
        assert_eq!(out, None);
        assert_eq!(fg.call(async { 1 }).await, Some(1));
    }

    #[tokio::test]
    async fn cancelled_loop_refuses_work() {
        let token = CancellationToken::new();
        let fg = Foreground::spawn(token.clone());
        token.cancel();
        assert_eq!(fg.call(std::future::pending::<()>()).await, None);
    }
}
