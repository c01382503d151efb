//! Bounded worker pool.
//!
//! Fire-and-forget task submission with a blocking drain barrier: tasks are
//! spawned immediately but at most `workers` of them run concurrently, and
//! [`WorkerPool::wait`] blocks until every submitted task has finished.
//!
//! A panic inside a task is recovered at the pool boundary, logged, and
//! counted as a failure; sibling tasks are unaffected.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// A bounded pool of concurrent tasks with a drain barrier.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Create a pool running at most `workers` tasks at once.
    pub fn new(workers: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(workers.max(1))), tasks: JoinSet::new() }
    }

    /// Submit a task. Returns immediately; the task waits for a worker slot.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed while the pool is alive.
            let Ok(_permit) = permits.acquire_owned().await else { return };
            task.await;
        });
    }

    /// Block until all submitted tasks have completed.
    ///
    /// Returns the number of tasks that panicked.
    pub async fn wait(mut self) -> usize {
        let mut failed = 0;
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("Worker task panicked: {e}");
                    failed += 1;
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::WorkerPool;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_submitted_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(4);
        for _ in 0..32 {
            let counter = counter.clone();
            pool.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.wait().await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(3);
        for _ in 0..12 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.wait().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_abort_siblings() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2);
        pool.spawn(async {
            panic!("task blew up");
        });
        for _ in 0..5 {
            let counter = counter.clone();
            pool.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.wait().await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
