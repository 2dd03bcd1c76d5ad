use crossbeam_channel::{Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;

use super::worker::{PoolCounters, TaskHandler, Worker};

// Pool state constants
const POOL_STATE_RUNNING: u8 = 0;
const POOL_STATE_SHUTTING_DOWN: u8 = 1;
const POOL_STATE_STOPPED: u8 = 2;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    InvalidSize,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub panicked: u64,
}

/// Fixed-size pool of OS threads draining one shared task queue
///
/// `enqueue` is safe from any thread and wakes exactly one idle worker.
/// No ordering or priority is given between tasks.
pub struct WorkerPool<T: Send + 'static> {
    /// `None` once shutdown has begun
    sender: RwLock<Option<Sender<T>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    state: AtomicU8,
    size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `size` workers named `{name}-{n}`
    pub fn new(
        size: usize,
        name: &str,
        handler: Arc<dyn TaskHandler<T>>,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let (sender, receiver) = unbounded();
        let counters = Arc::new(PoolCounters::default());
        let mut threads = Vec::with_capacity(size);

        for id in 0..size {
            let worker = Worker {
                id,
                receiver: receiver.clone(),
                handler: Arc::clone(&handler),
                counters: Arc::clone(&counters),
            };

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    // Closing the queue lets the already-started workers exit.
                    drop(sender);
                    for handle in threads {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        tracing::info!(workers = size, name, "Worker pool started");

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            threads: Mutex::new(threads),
            counters,
            state: AtomicU8::new(POOL_STATE_RUNNING),
            size,
        })
    }

    /// Queue a task. Fails with [`PoolError::ShutDown`] once shutdown has begun.
    pub fn enqueue(&self, task: T) -> Result<(), PoolError> {
        match self.sender.read().as_ref() {
            Some(sender) => sender.send(task).map_err(|_| PoolError::ShutDown),
            None => Err(PoolError::ShutDown),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == POOL_STATE_RUNNING
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.size,
            queued: self.sender.read().as_ref().map_or(0, |s| s.len()),
            active: self.counters.active.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting tasks, let workers finish what is queued, and join them.
    ///
    /// Blocks the caller until every worker has exited. Idempotent.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(
                POOL_STATE_RUNNING,
                POOL_STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        // Dropping the only sender wakes every idle worker.
        self.sender.write().take();

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }

        self.state.store(POOL_STATE_STOPPED, Ordering::Release);
        tracing::info!(
            completed = self.counters.completed.load(Ordering::Relaxed),
            panicked = self.counters.panicked.load(Ordering::Relaxed),
            "Worker pool shutdown complete"
        );
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_zero_workers_rejected() {
        let handler: Arc<dyn TaskHandler<u32>> = Arc::new(|_: u32| {});
        assert!(matches!(
            WorkerPool::new(0, "test", handler),
            Err(PoolError::InvalidSize)
        ));
    }

    #[test]
    fn test_executes_every_task() {
        let sum = Arc::new(AtomicUsize::new(0));
        let total = Arc::clone(&sum);
        let handler: Arc<dyn TaskHandler<usize>> = Arc::new(move |n: usize| {
            total.fetch_add(n, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(4, "test", handler).unwrap();
        for n in 1..=100 {
            pool.enqueue(n).unwrap();
        }
        pool.shutdown();

        assert_eq!(sum.load(Ordering::SeqCst), 5050);
        assert_eq!(pool.stats().completed, 100);
    }

    #[test]
    fn test_enqueue_after_shutdown_is_rejected() {
        let handler: Arc<dyn TaskHandler<u32>> = Arc::new(|_: u32| {});
        let pool = WorkerPool::new(2, "test", handler).unwrap();

        pool.shutdown();

        assert!(!pool.is_running());
        assert!(matches!(pool.enqueue(1), Err(PoolError::ShutDown)));
        // Second shutdown is a no-op
        pool.shutdown();
    }

    #[test]
    fn test_tasks_run_in_parallel() {
        let barrier = Arc::new(Barrier::new(4));
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = parking_lot::Mutex::new(done_tx);

        let gate = Arc::clone(&barrier);
        let handler: Arc<dyn TaskHandler<u32>> = Arc::new(move |n: u32| {
            gate.wait();
            let _ = done_tx.lock().send(n);
        });

        let pool = WorkerPool::new(4, "test", handler).unwrap();
        for n in 0..4 {
            pool.enqueue(n).unwrap();
        }

        // All four must be inside the handler at once to pass the barrier.
        for _ in 0..4 {
            done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("tasks did not run concurrently");
        }
        pool.shutdown();
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let handler: Arc<dyn TaskHandler<bool>> = Arc::new(move |explode: bool| {
            if explode {
                panic!("boom");
            }
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(1, "test", handler).unwrap();
        pool.enqueue(true).unwrap();
        pool.enqueue(false).unwrap();
        pool.shutdown();

        let stats = pool.stats();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let handler: Arc<dyn TaskHandler<u32>> = Arc::new(move |_: u32| {
            std::thread::sleep(Duration::from_millis(5));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(1, "test", handler).unwrap();
        for n in 0..10 {
            pool.enqueue(n).unwrap();
        }
        pool.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert_eq!(pool.stats().queued, 0);
    }
}
