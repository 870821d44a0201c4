//! IsolatedPool (C2): a pool of isolated worker threads with core/max
//! sizing, idle reaping, and a FIFO overflow queue.
//!
//! Grounded on `ksvc-module::fixed_pool::FixedPool`'s thread-per-worker
//! design (named threads via `thread::Builder`, one inbound channel per
//! worker) generalized to variable pool size, and on
//! `horizon-lattice-core::threadpool`'s event-driven dispatch (a background
//! loop reacting to worker lifecycle messages rather than a shared run
//! queue workers pull from directly).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use taskpool_core::envelope::TaskEnvelope;
use taskpool_core::error::{PoolError, PoolResult};
use taskpool_core::id::{IdAllocator, TaskId, WorkerId};
use taskpool_core::message::WorkerMessage;

use crate::handle::{Cancellable, CompletionHandle, PendingDelivery};
use crate::worker::{spawn_worker, WorkerSpawnConfig};

/// Configuration for one `IsolatedPool`.
#[derive(Debug, Clone)]
pub struct IsolatedPoolConfig {
    /// Used as a thread-name prefix and in tracing spans.
    pub name: String,
    /// Workers spawned up to this count at startup never idle-reap.
    pub core: usize,
    /// Hard ceiling on simultaneously live workers.
    pub max: usize,
    /// How long (in whole seconds) a non-core worker may sit idle before
    /// it self-exits.
    pub keep_active_seconds: u64,
}

impl Default for IsolatedPoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            name: "taskpool".to_string(),
            core: cpus,
            max: cpus * 2,
            keep_active_seconds: 30,
        }
    }
}

struct WorkerEntry {
    is_core: bool,
    inbound: Option<Sender<TaskEnvelope>>,
    is_running: bool,
    current_task: Option<TaskId>,
    pending: Option<TaskEnvelope>,
    #[allow(dead_code)]
    join_handle: Option<JoinHandle<()>>,
}

struct PoolState {
    // BTreeMap keyed by WorkerId, which is allocated monotonically, so
    // iteration order doubles as worker insertion order.
    workers: BTreeMap<WorkerId, WorkerEntry>,
    overflow: VecDeque<TaskEnvelope>,
    deliverers: HashMap<TaskId, Box<dyn PendingDelivery>>,
    exited: HashSet<WorkerId>,
    active_workers: usize,
    is_shutdown: bool,
}

struct PoolShared {
    config: IsolatedPoolConfig,
    id_alloc: IdAllocator,
    state: Mutex<PoolState>,
    result_tx: Sender<WorkerMessage>,
    lost_count: AtomicU64,
}

impl Cancellable for PoolShared {
    fn cancel_task(&self, task_id: TaskId) -> bool {
        let deliverer = {
            let mut state = self.state.lock();
            let Some(pos) = state.overflow.iter().position(|e| e.id() == task_id) else {
                return false;
            };
            state.overflow.remove(pos);
            state.deliverers.remove(&task_id)
        };
        if let Some(deliverer) = deliverer {
            deliverer.deliver_cancelled();
        }
        true
    }
}

impl PoolShared {
    /// Shared by `IsolatedPool::shutdown` and `Drop`: stop accepting work and
    /// close every live worker's inbound channel so its `recv` unblocks.
    fn shutdown_locked(&self) {
        let mut state = self.state.lock();
        if state.is_shutdown {
            return;
        }
        state.is_shutdown = true;
        state.overflow.clear();
        for entry in state.workers.values_mut() {
            entry.inbound = None;
        }
    }

    fn spawn_worker_locked(self: &Arc<Self>, state: &mut PoolState, pending: Option<TaskEnvelope>) {
        let worker_id = WorkerId::new(self.id_alloc.next());
        let is_core = state.active_workers < self.config.core;
        state.active_workers += 1;
        let debug_name = format!("{}-{}", self.config.name, worker_id.as_u64());
        let join_handle = spawn_worker(WorkerSpawnConfig {
            id: worker_id,
            debug_name,
            is_core,
            keep_active_ticks: self.config.keep_active_seconds.max(1),
            result_tx: self.result_tx.clone(),
        });
        state.workers.insert(
            worker_id,
            WorkerEntry {
                is_core,
                inbound: None,
                is_running: false,
                current_task: None,
                pending,
                join_handle: Some(join_handle),
            },
        );
    }

    /// After any event that may have freed capacity: hand queued overflow
    /// work to idle workers (in worker insertion order), then spawn fresh
    /// non-core workers for whatever overflow remains, up to `max`.
    fn dispatch_locked(self: &Arc<Self>, state: &mut PoolState) {
        let idle_ids: Vec<WorkerId> = state
            .workers
            .iter()
            .filter(|(_, w)| w.inbound.is_some() && !w.is_running)
            .map(|(id, _)| *id)
            .collect();

        for id in idle_ids {
            let Some(envelope) = state.overflow.pop_front() else {
                break;
            };
            let entry = state.workers.get_mut(&id).expect("just iterated");
            let task_id = envelope.id();
            let inbound = entry.inbound.clone().expect("filtered on inbound.is_some()");
            if inbound.send(envelope).is_ok() {
                entry.is_running = true;
                entry.current_task = Some(task_id);
            }
        }

        while !state.overflow.is_empty() && state.active_workers < self.config.max {
            let envelope = state.overflow.pop_front().expect("checked non-empty");
            self.spawn_worker_locked(state, Some(envelope));
        }
    }

    fn handle_message(self: &Arc<Self>, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Ready { worker_id, inbound } => {
                let mut state = self.state.lock();
                if state.is_shutdown {
                    // Let the just-started worker notice its channel is
                    // gone and exit on its own.
                    drop(inbound);
                    return;
                }
                if let Some(entry) = state.workers.get_mut(&worker_id) {
                    entry.inbound = Some(inbound.clone());
                    if let Some(pending) = entry.pending.take() {
                        let task_id = pending.id();
                        if inbound.send(pending).is_ok() {
                            entry.is_running = true;
                            entry.current_task = Some(task_id);
                        }
                    }
                }
                self.dispatch_locked(&mut state);
            }
            WorkerMessage::Ack {
                worker_id,
                task_id,
                outcome,
            } => {
                let deliverer = {
                    let mut state = self.state.lock();
                    if let Some(entry) = state.workers.get_mut(&worker_id) {
                        entry.is_running = false;
                        entry.current_task = None;
                    }
                    let deliverer = state.deliverers.remove(&task_id);
                    self.dispatch_locked(&mut state);
                    deliverer
                };
                if let Some(deliverer) = deliverer {
                    deliverer.deliver_outcome(outcome);
                }
            }
            WorkerMessage::Exit { worker_id } => {
                let lost_task = {
                    let mut state = self.state.lock();
                    if !state.exited.insert(worker_id) {
                        // Already processed; nothing to do. Kept as a
                        // defensive no-op even though this channel design
                        // cannot actually deliver a duplicate Exit.
                        return;
                    }
                    let lost = state.workers.remove(&worker_id).and_then(|entry| {
                        state.active_workers = state.active_workers.saturating_sub(1);
                        entry.current_task
                    });
                    self.dispatch_locked(&mut state);
                    lost
                };
                if let Some(task_id) = lost_task {
                    self.lost_count.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        worker = %worker_id,
                        task = %task_id,
                        "worker exited without acking its dispatched task; result lost"
                    );
                }
            }
        }
    }
}

fn reactor_loop(shared: Arc<PoolShared>, rx: Receiver<WorkerMessage>) {
    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(msg) => shared.handle_message(msg),
            Err(RecvTimeoutError::Timeout) => {
                if shared.state.lock().is_shutdown {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// A pool of isolated worker threads.
///
/// Cheap to clone: internally an `Arc`, so every clone refers to the same
/// pool of workers.
#[derive(Clone)]
pub struct IsolatedPool {
    shared: Arc<PoolShared>,
}

impl IsolatedPool {
    pub fn new(config: IsolatedPoolConfig) -> Self {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(PoolShared {
            config,
            id_alloc: IdAllocator::new(),
            state: Mutex::new(PoolState {
                workers: BTreeMap::new(),
                overflow: VecDeque::new(),
                deliverers: HashMap::new(),
                exited: HashSet::new(),
                active_workers: 0,
                is_shutdown: false,
            }),
            result_tx,
            lost_count: AtomicU64::new(0),
        });

        {
            let mut state = shared.state.lock();
            for _ in 0..shared.config.core {
                shared.spawn_worker_locked(&mut state, None);
            }
        }

        let reactor_shared = shared.clone();
        std::thread::Builder::new()
            .name(format!("{}-reactor", shared.config.name))
            .spawn(move || reactor_loop(reactor_shared, result_rx))
            .expect("failed to spawn taskpool reactor thread");

        Self { shared }
    }

    /// Submit a unit of work and return its id. No `CompletionHandle` is
    /// produced; the outcome is computed but never delivered anywhere. Use
    /// [`IsolatedPool::submit_with_handle`] (or the top-level
    /// `submit_isolated`) to observe the result.
    pub fn submit<A, R>(&self, entry: fn(A) -> R, argument: A) -> PoolResult<TaskId>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        let task_id = TaskId::new(self.shared.id_alloc.next());
        let envelope = TaskEnvelope::new(task_id, "task", entry, argument);
        self.submit_envelope(envelope, None)?;
        Ok(task_id)
    }

    /// Submit a unit of work and return a `CompletionHandle` wired to the
    /// task's eventual outcome.
    pub fn submit_with_handle<A, R>(
        &self,
        entry: fn(A) -> R,
        argument: A,
        debug_label: impl Into<String>,
    ) -> CompletionHandle<R>
    where
        A: Send + 'static,
        R: Clone + Send + 'static,
    {
        let task_id = TaskId::new(self.shared.id_alloc.next());
        let cancel_sink: Weak<dyn Cancellable> = {
            let concrete: Arc<PoolShared> = self.shared.clone();
            Arc::downgrade(&concrete) as Weak<dyn Cancellable>
        };
        let handle = CompletionHandle::new(task_id, debug_label, Some(cancel_sink));
        let envelope = TaskEnvelope::new(task_id, handle.debug_label().to_string(), entry, argument);
        match self.submit_envelope(envelope, Some(handle.deliverer())) {
            Ok(()) => {}
            Err(err) => {
                handle.shared().deliver_rejected(err);
            }
        }
        handle
    }

    fn submit_envelope(
        &self,
        envelope: TaskEnvelope,
        deliverer: Option<Box<dyn PendingDelivery>>,
    ) -> PoolResult<()> {
        let mut state = self.shared.state.lock();
        if state.is_shutdown {
            return Err(PoolError::ShutDown);
        }
        let task_id = envelope.id();
        if let Some(deliverer) = deliverer {
            state.deliverers.insert(task_id, deliverer);
        }
        // Always enqueue first, then dispatch: dispatch hands work to any
        // already-idle worker before spawning a fresh one, so a submission
        // never spawns a new worker while an existing one sits idle.
        state.overflow.push_back(envelope);
        self.shared.dispatch_locked(&mut state);
        Ok(())
    }

    /// Cancel a not-yet-started task. Returns `true` only if the task was
    /// still sitting in the overflow queue; a task already handed to a
    /// worker cannot be cancelled. O(n) in the overflow queue's length.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        self.shared.cancel_task(task_id)
    }

    /// Stop accepting new work and signal every live worker to exit at its
    /// next opportunity. Does not block; workers finish their in-flight
    /// task (if any) and then drain out. Rust has no safe way to forcibly
    /// kill a running OS thread, so "forced termination" here means closing
    /// every worker's inbound channel, which unblocks a worker's `recv`
    /// immediately whether it was idle or core.
    pub fn shutdown(&self) {
        self.shared.shutdown_locked();
    }

    pub fn active_workers(&self) -> usize {
        self.shared.state.lock().active_workers
    }

    pub fn lost_count(&self) -> u64 {
        self.shared.lost_count.load(Ordering::Relaxed)
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        self.shutdown_locked();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_pool(core: usize, max: usize) -> IsolatedPool {
        IsolatedPool::new(IsolatedPoolConfig {
            name: "test".to_string(),
            core,
            max,
            keep_active_seconds: 1,
        })
    }

    fn triple(x: i32) -> i32 {
        x * 3
    }

    fn boom(_: ()) -> i32 {
        panic!("boom");
    }

    #[test]
    fn submit_with_handle_delivers_value() {
        let pool = small_pool(1, 2);
        let handle = pool.submit_with_handle(triple, 14, "triple");
        let result = handle.wait_blocking().expect("should succeed");
        assert_eq!(result, 42);
    }

    #[test]
    fn submit_with_handle_delivers_panic_as_error() {
        let pool = small_pool(1, 2);
        let handle = pool.submit_with_handle(boom, (), "boom");
        let err = handle.wait_blocking().expect_err("should fail");
        match err {
            crate::handle::WaitError::Task(e) => assert_eq!(e.message(), "boom"),
            crate::handle::WaitError::Cancelled => panic!("expected a task error"),
        }
    }

    #[test]
    fn overflow_is_handled_beyond_core_size() {
        let pool = small_pool(1, 4);
        let handles: Vec<_> = (0..8)
            .map(|i| pool.submit_with_handle(triple, i, "triple"))
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.wait_blocking().unwrap(), i as i32 * 3);
        }
    }

    #[test]
    fn cancel_removes_queued_task_before_it_runs() {
        let pool = small_pool(0, 1);
        // Fill the only worker with a slow task so the next one queues.
        fn slow(_: ()) -> i32 {
            std::thread::sleep(Duration::from_millis(200));
            1
        }
        let first = pool.submit_with_handle(slow, (), "slow");
        std::thread::sleep(Duration::from_millis(20));
        let second = pool.submit_with_handle(triple, 10, "triple");
        assert!(pool.cancel(second.task_id()));
        assert!(second.wait_blocking().is_err());
        assert!(first.wait_blocking().is_ok());
    }

    #[test]
    fn shutdown_rejects_further_submissions() {
        let pool = small_pool(1, 1);
        pool.shutdown();
        std::thread::sleep(Duration::from_millis(50));
        assert!(pool.submit(triple, 1).is_err());
    }
}
