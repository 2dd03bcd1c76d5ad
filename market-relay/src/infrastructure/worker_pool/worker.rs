use crossbeam_channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Executes one task to completion on a pool thread.
///
/// The pool knows nothing about what a task is; anything that can consume
/// a `T` can be plugged in.
pub trait TaskHandler<T>: Send + Sync + 'static {
    fn handle(&self, task: T);
}

impl<T, F> TaskHandler<T> for F
where
    F: Fn(T) + Send + Sync + 'static,
{
    fn handle(&self, task: T) {
        self(task)
    }
}

/// Counters shared between the pool handle and its workers
#[derive(Debug, Default)]
pub(super) struct PoolCounters {
    pub active: AtomicUsize,
    pub completed: AtomicU64,
    pub panicked: AtomicU64,
}

pub(super) struct Worker<T> {
    pub id: usize,
    pub receiver: Receiver<T>,
    pub handler: Arc<dyn TaskHandler<T>>,
    pub counters: Arc<PoolCounters>,
}

impl<T: Send + 'static> Worker<T> {
    /// Main loop - blocks until a task arrives, runs it, repeats.
    ///
    /// Exits once the sending side is gone and the queue is empty.
    pub fn run(self) {
        tracing::debug!(worker_id = self.id, "Worker started");

        while let Ok(task) = self.receiver.recv() {
            self.counters.active.fetch_add(1, Ordering::Relaxed);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(task)));
            self.counters.active.fetch_sub(1, Ordering::Relaxed);

            match outcome {
                Ok(()) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        worker_id = self.id,
                        panic = panic_message(payload.as_ref()),
                        "Task panicked"
                    );
                }
            }
        }

        tracing::debug!(worker_id = self.id, "Worker stopped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
