//! CompletionHandle (C4): a future-like, multi-subscriber result cell.
//!
//! Unlike a plain `Future`, a `CompletionHandle` can be observed more than
//! once (`then`/`when_complete`/`on_cancel` can all be registered
//! independently, and each fires at most once), polled synchronously
//! (`result()`/`is_complete()`), awaited asynchronously (`wait()`), or
//! awaited from a thread with no async runtime at all (`wait_blocking()`).
//!
//! Internally it is a small state machine guarded by a `parking_lot::Mutex`,
//! woken on transition via both a waker list (for `wait()`) and a
//! condvar (for `wait_blocking()`), the same pairing
//! `horizon-lattice-core::threadpool::TaskWakeup` uses to let one
//! completion serve both async and blocking observers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

use parking_lot::{Condvar, Mutex};
use taskpool_core::{TaskError, TaskId, TaskOutcome};

/// Something a `CompletionHandle` can ask to cancel its underlying task.
///
/// Implemented by the isolated pool and the in-process executor. Handles
/// hold only a `Weak` reference to this so that outstanding handles never
/// keep a pool or executor alive.
pub(crate) trait Cancellable: Send + Sync {
    fn cancel_task(&self, task_id: TaskId) -> bool;
}

/// Bridges a type-erased `TaskOutcome` (as produced by an isolated worker)
/// back into a concrete `CompletionHandle<R>`. The isolated pool's
/// dispatcher holds a `HashMap<TaskId, Box<dyn PendingDelivery>>` so it can
/// stay generic over the result types of every task it has in flight.
pub(crate) trait PendingDelivery: Send {
    fn deliver_outcome(self: Box<Self>, outcome: TaskOutcome);
    fn deliver_cancelled(self: Box<Self>);
}

struct HandleDeliverer<R> {
    shared: Arc<HandleShared<R>>,
}

impl<R: Clone + Send + 'static> PendingDelivery for HandleDeliverer<R> {
    fn deliver_outcome(self: Box<Self>, outcome: TaskOutcome) {
        match outcome {
            Ok(boxed) => match boxed.downcast::<R>() {
                Ok(value) => self.shared.deliver_value(*value),
                Err(_) => self
                    .shared
                    .deliver_error(TaskError::new("task result type mismatch")),
            },
            Err(err) => self.shared.deliver_error(err),
        }
    }

    fn deliver_cancelled(self: Box<Self>) {
        self.shared.deliver_cancelled();
    }
}

/// The condvar half of the wakeup pairing, for `wait_blocking()`.
///
/// Grounded directly on `horizon-lattice-core::threadpool::TaskWakeup`.
struct Wakeup {
    ready: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl Wakeup {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn wake(&self) {
        let _guard = self.lock.lock();
        self.ready.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn wait_until_ready(&self) {
        if self.ready.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.ready.load(Ordering::Acquire) {
            self.condvar.wait(&mut guard);
        }
    }
}

type ValueSubscriber<T> = Box<dyn FnOnce(T) + Send>;
type ErrorSubscriber = Box<dyn FnOnce(&TaskError) + Send>;
type UnitSubscriber = Box<dyn FnOnce() + Send>;

enum HandleState<T> {
    Pending {
        on_value: Vec<ValueSubscriber<T>>,
        on_error: Vec<ErrorSubscriber>,
        on_complete: Vec<UnitSubscriber>,
        on_cancel: Vec<UnitSubscriber>,
        wakers: Vec<Waker>,
    },
    Value(T),
    Error(TaskError),
    Cancelled,
}

impl<T> HandleState<T> {
    fn pending() -> Self {
        HandleState::Pending {
            on_value: Vec::new(),
            on_error: Vec::new(),
            on_complete: Vec::new(),
            on_cancel: Vec::new(),
            wakers: Vec::new(),
        }
    }
}

pub(crate) struct HandleShared<T> {
    task_id: TaskId,
    debug_label: String,
    cancel_sink: Option<Weak<dyn Cancellable>>,
    state: Mutex<HandleState<T>>,
    wakeup: Wakeup,
}

impl<T: Clone + Send + 'static> HandleShared<T> {
    pub(crate) fn deliver_value(&self, value: T) {
        let (on_value, on_complete, wakers) = {
            let mut guard = self.state.lock();
            match std::mem::replace(&mut *guard, HandleState::Value(value.clone())) {
                HandleState::Pending {
                    on_value,
                    on_complete,
                    wakers,
                    ..
                } => (on_value, on_complete, wakers),
                other => {
                    *guard = other;
                    return;
                }
            }
        };
        for cb in on_value {
            cb(value.clone());
        }
        for cb in on_complete {
            cb();
        }
        for waker in wakers {
            waker.wake();
        }
        self.wakeup.wake();
    }

    pub(crate) fn deliver_error(&self, err: TaskError) {
        let (on_error, on_complete, wakers) = {
            let mut guard = self.state.lock();
            match std::mem::replace(&mut *guard, HandleState::Error(err.clone())) {
                HandleState::Pending {
                    on_error,
                    on_complete,
                    wakers,
                    ..
                } => (on_error, on_complete, wakers),
                other => {
                    *guard = other;
                    return;
                }
            }
        };
        for cb in on_error {
            // Subscriber panics are caught and logged for onError specifically;
            // onValue/onComplete/onCancel panics are left to propagate.
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&err))).is_err() {
                tracing::error!(task = %self.task_id, "onError subscriber panicked");
            }
        }
        for cb in on_complete {
            cb();
        }
        for waker in wakers {
            waker.wake();
        }
        self.wakeup.wake();
    }

    /// Deliver a terminal error for a submission that was rejected before a
    /// task ever reached a worker or executor slot (e.g. the pool was
    /// already shut down). Lets `submit_isolated`/`submit_in_process` hand
    /// back a plain `CompletionHandle<R>` instead of a `Result`.
    pub(crate) fn deliver_rejected(&self, err: taskpool_core::PoolError) {
        self.deliver_error(TaskError::new(err.to_string()));
    }

    pub(crate) fn deliver_cancelled(&self) {
        let (on_cancel, wakers) = {
            let mut guard = self.state.lock();
            match std::mem::replace(&mut *guard, HandleState::Cancelled) {
                HandleState::Pending {
                    on_cancel, wakers, ..
                } => (on_cancel, wakers),
                other => {
                    *guard = other;
                    return;
                }
            }
        };
        for cb in on_cancel {
            cb();
        }
        for waker in wakers {
            waker.wake();
        }
        self.wakeup.wake();
    }
}

/// A handle to the eventual result of one task, submitted to either the
/// isolated pool or the in-process executor.
pub struct CompletionHandle<T: Clone + Send + 'static> {
    shared: Arc<HandleShared<T>>,
}

impl<T: Clone + Send + 'static> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("task_id", &self.shared.task_id)
            .field("debug_label", &self.shared.debug_label)
            .field("is_complete", &self.is_complete())
            .finish()
    }
}

/// Error surfaced by `wait()`/`wait_blocking()`.
#[derive(Debug, Clone)]
pub enum WaitError {
    Task(TaskError),
    Cancelled,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Task(err) => write!(f, "task failed: {err}"),
            WaitError::Cancelled => write!(f, "task was cancelled"),
        }
    }
}

impl std::error::Error for WaitError {}

impl<T: Clone + Send + 'static> CompletionHandle<T> {
    pub(crate) fn new(
        task_id: TaskId,
        debug_label: impl Into<String>,
        cancel_sink: Option<Weak<dyn Cancellable>>,
    ) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                task_id,
                debug_label: debug_label.into(),
                cancel_sink,
                state: Mutex::new(HandleState::pending()),
                wakeup: Wakeup::new(),
            }),
        }
    }

    pub(crate) fn shared(&self) -> Arc<HandleShared<T>> {
        self.shared.clone()
    }

    pub(crate) fn deliverer(&self) -> Box<dyn PendingDelivery>
    where
        T: 'static,
    {
        Box::new(HandleDeliverer {
            shared: self.shared.clone(),
        })
    }

    pub fn task_id(&self) -> TaskId {
        self.shared.task_id
    }

    pub fn debug_label(&self) -> &str {
        &self.shared.debug_label
    }

    pub fn is_complete(&self) -> bool {
        !matches!(&*self.shared.state.lock(), HandleState::Pending { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(&*self.shared.state.lock(), HandleState::Error(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.shared.state.lock(), HandleState::Cancelled)
    }

    pub fn result(&self) -> Option<T> {
        match &*self.shared.state.lock() {
            HandleState::Value(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<TaskError> {
        match &*self.shared.state.lock() {
            HandleState::Error(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Register `on_value`/`on_error` callbacks. If already terminal, the
    /// matching callback fires immediately and is not retained; a cancelled
    /// handle fires neither.
    pub fn then(
        &self,
        on_value: impl FnOnce(T) + Send + 'static,
        on_error: impl FnOnce(&TaskError) + Send + 'static,
    ) {
        let mut guard = self.shared.state.lock();
        match &mut *guard {
            HandleState::Pending {
                on_value: ov,
                on_error: oe,
                ..
            } => {
                ov.push(Box::new(on_value));
                oe.push(Box::new(on_error));
            }
            HandleState::Value(v) => {
                let v = v.clone();
                drop(guard);
                on_value(v);
            }
            HandleState::Error(e) => {
                let e = e.clone();
                drop(guard);
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| on_error(&e))).is_err()
                {
                    tracing::error!(task = %self.shared.task_id, "onError subscriber panicked");
                }
            }
            HandleState::Cancelled => {}
        }
    }

    /// Registers `action` to run once the task completes (value or error).
    /// If already terminal, fires immediately and is not appended; does not
    /// fire for cancellation.
    pub fn when_complete(&self, action: impl FnOnce() + Send + 'static) {
        let mut guard = self.shared.state.lock();
        match &mut *guard {
            HandleState::Pending { on_complete, .. } => on_complete.push(Box::new(action)),
            HandleState::Value(_) | HandleState::Error(_) => {
                drop(guard);
                action();
            }
            HandleState::Cancelled => {}
        }
    }

    /// Registers `action` to run if and when the task is cancelled. Only
    /// takes effect if the handle is not yet terminal; otherwise a no-op,
    /// even if the handle was already cancelled.
    pub fn on_cancel(&self, action: impl FnOnce() + Send + 'static) {
        let mut guard = self.shared.state.lock();
        if let HandleState::Pending { on_cancel, .. } = &mut *guard {
            on_cancel.push(Box::new(action));
        }
    }

    /// Async wait for the terminal outcome.
    pub async fn wait(&self) -> Result<T, WaitError> {
        Wait { handle: self }.await
    }

    /// Block the current OS thread until the terminal outcome is available.
    /// Safe to call from a thread with no async runtime.
    pub fn wait_blocking(&self) -> Result<T, WaitError> {
        self.shared.wakeup.wait_until_ready();
        match &*self.shared.state.lock() {
            HandleState::Value(v) => Ok(v.clone()),
            HandleState::Error(e) => Err(WaitError::Task(e.clone())),
            HandleState::Cancelled => Err(WaitError::Cancelled),
            HandleState::Pending { .. } => {
                unreachable!("wakeup fired before the handle reached a terminal state")
            }
        }
    }

    /// Attempt to cancel the underlying task. Returns `true`, and transitions
    /// the handle to cancelled, only if the underlying pool/executor
    /// actually intercepted the task before it started running.
    pub fn cancel(&self) -> bool {
        let Some(sink) = self.shared.cancel_sink.as_ref().and_then(Weak::upgrade) else {
            return false;
        };
        let cancelled = sink.cancel_task(self.shared.task_id);
        if cancelled {
            self.shared.deliver_cancelled();
        }
        cancelled
    }
}

struct Wait<'a, T: Clone + Send + 'static> {
    handle: &'a CompletionHandle<T>,
}

impl<'a, T: Clone + Send + 'static> Future for Wait<'a, T> {
    type Output = Result<T, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.handle.shared.state.lock();
        match &mut *guard {
            HandleState::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            HandleState::Value(v) => Poll::Ready(Ok(v.clone())),
            HandleState::Error(e) => Poll::Ready(Err(WaitError::Task(e.clone()))),
            HandleState::Cancelled => Poll::Ready(Err(WaitError::Cancelled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fresh_handle() -> CompletionHandle<i32> {
        CompletionHandle::new(TaskId::new(1), "test", None)
    }

    #[test]
    fn then_fires_immediately_when_already_terminal() {
        let handle = fresh_handle();
        handle.shared().deliver_value(7);
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        handle.then(move |v| seen2.store(v as u32, Ordering::SeqCst), |_| {});
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn when_complete_does_not_fire_for_cancellation() {
        let handle = fresh_handle();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        handle.when_complete(move || fired2.store(true, Ordering::SeqCst));
        handle.shared().deliver_cancelled();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn on_cancel_is_noop_once_terminal() {
        let handle = fresh_handle();
        handle.shared().deliver_value(1);
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        // Per spec: registering after termination never fires, even though
        // the handle is not itself cancelled here.
        handle.on_cancel(move || fired2.store(true, Ordering::SeqCst));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_blocking_observes_value() {
        let handle = fresh_handle();
        let shared = handle.shared();
        std::thread::spawn(move || shared.deliver_value(99));
        assert_eq!(handle.wait_blocking().unwrap(), 99);
    }

    #[tokio::test]
    async fn wait_observes_error() {
        let handle = fresh_handle();
        handle.shared().deliver_error(TaskError::new("nope"));
        let err = handle.wait().await.unwrap_err();
        matches!(err, WaitError::Task(_));
    }

    #[test]
    fn cancel_without_sink_returns_false() {
        let handle = fresh_handle();
        assert!(!handle.cancel());
    }
}
