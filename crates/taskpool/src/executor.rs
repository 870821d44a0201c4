//! InProcessExecutor (C3): bounded-concurrency cooperative task queue.
//!
//! Unlike `IsolatedPool`, this executor never spawns OS threads of its own —
//! it runs tasks as ordinary `tokio` tasks, gated by a `tokio::sync::Semaphore`
//! so that no more than `max_size` run concurrently. The semaphore's FIFO
//! wait queue gives waiting tasks the ordering the design calls for without
//! any bookkeeping of our own.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use taskpool_core::error::TaskError;
use taskpool_core::id::{IdAllocator, TaskId};

use crate::handle::{Cancellable, CompletionHandle};

/// Configuration for one `InProcessExecutor`.
#[derive(Debug, Clone)]
pub struct InProcessExecutorConfig {
    /// Maximum number of tasks running concurrently.
    pub max_size: usize,
}

impl Default for InProcessExecutorConfig {
    fn default() -> Self {
        Self { max_size: 20 }
    }
}

struct ExecutorShared {
    semaphore: Semaphore,
    id_alloc: IdAllocator,
    /// Tasks that have not yet acquired a permit, keyed by id, each with its
    /// own cancellation flag. Removed the moment a task starts running, so
    /// `cancel_task` can only ever intercept a not-yet-started task.
    queued: Mutex<HashMap<TaskId, Arc<AtomicBool>>>,
    in_flight: AtomicUsize,
}

impl Cancellable for ExecutorShared {
    fn cancel_task(&self, task_id: TaskId) -> bool {
        if let Some(flag) = self.queued.lock().remove(&task_id) {
            flag.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }
}

/// A bounded-concurrency in-process task executor.
///
/// Cheap to clone: internally an `Arc`.
#[derive(Clone)]
pub struct InProcessExecutor {
    shared: Arc<ExecutorShared>,
}

impl InProcessExecutor {
    pub fn new(config: InProcessExecutorConfig) -> Self {
        Self {
            shared: Arc::new(ExecutorShared {
                semaphore: Semaphore::new(config.max_size.max(1)),
                id_alloc: IdAllocator::new(),
                queued: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of tasks currently holding a permit and running.
    pub fn active_count(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Schedule `task` to run once a permit is available, returning a
    /// handle to its eventual outcome.
    pub fn execute<F, T>(&self, task: F) -> CompletionHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Clone + Send + 'static,
    {
        let task_id = TaskId::new(self.shared.id_alloc.next());
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.shared.queued.lock().insert(task_id, cancel_flag.clone());

        let cancel_sink: Weak<dyn Cancellable> = {
            let concrete: Arc<ExecutorShared> = self.shared.clone();
            Arc::downgrade(&concrete) as Weak<dyn Cancellable>
        };
        let handle = CompletionHandle::new(task_id, "InProcessTask", Some(cancel_sink));
        let delivery = handle.shared();
        let shared = self.shared.clone();

        tokio::spawn(async move {
            let permit = shared.semaphore.acquire().await.expect("semaphore never closed");
            let was_queued = shared.queued.lock().remove(&task_id).is_some();
            if !was_queued || cancel_flag.load(Ordering::Acquire) {
                drop(permit);
                delivery.deliver_cancelled();
                return;
            }

            shared.in_flight.fetch_add(1, Ordering::AcqRel);
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            drop(permit);

            match outcome {
                Ok(value) => delivery.deliver_value(value),
                Err(payload) => delivery.deliver_error(TaskError::from_panic_payload(payload)),
            }
        });

        handle
    }

    /// Schedule every item in `tasks`, preserving order in the returned
    /// vector of handles.
    pub fn execute_list<F, T, I>(&self, tasks: I) -> Vec<CompletionHandle<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Clone + Send + 'static,
    {
        tasks.into_iter().map(|task| self.execute(task)).collect()
    }

    /// Cancel every task still waiting for a permit. Tasks already running
    /// are unaffected.
    pub fn clear_all(&self) {
        let mut queued = self.shared.queued.lock();
        for (_, flag) in queued.drain() {
            flag.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_runs_and_delivers_value() {
        let executor = InProcessExecutor::new(InProcessExecutorConfig { max_size: 2 });
        let handle = executor.execute(async { 2 + 2 });
        assert_eq!(handle.wait().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn execute_bounds_concurrency() {
        let executor = InProcessExecutor::new(InProcessExecutorConfig { max_size: 1 });
        let started = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let started = started.clone();
                let max_seen = max_seen.clone();
                executor.execute(async move {
                    let now = started.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    started.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.wait().await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_catches_panics() {
        let executor = InProcessExecutor::new(InProcessExecutorConfig::default());
        let handle = executor.execute(async { panic!("nope") });
        let err = handle.wait().await.unwrap_err();
        match err {
            crate::handle::WaitError::Task(e) => assert_eq!(e.message(), "nope"),
            crate::handle::WaitError::Cancelled => panic!("expected a task error"),
        }
    }

    #[tokio::test]
    async fn cancel_before_start_marks_handle_cancelled() {
        let executor = InProcessExecutor::new(InProcessExecutorConfig { max_size: 1 });
        let blocker = executor.execute(async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        });
        let queued = executor.execute(async { 1 });
        assert!(queued.cancel());
        assert!(queued.wait().await.is_err());
        blocker.wait().await.unwrap();
    }
}
