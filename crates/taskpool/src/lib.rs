//! # taskpool
//!
//! Bounded-concurrency task execution behind a uniform completion handle.
//!
//! Two execution backends:
//!
//! - [`IsolatedPool`] runs each task on its own OS thread, sized between a
//!   `core` floor (never reaped) and a `max` ceiling, with excess work
//!   queued FIFO until a worker frees up.
//! - [`InProcessExecutor`] runs tasks as ordinary `tokio` tasks, gated by a
//!   semaphore so at most `max_size` run concurrently.
//!
//! Both report their outcome through a [`CompletionHandle`]: subscribe with
//! `then`/`when_complete`/`on_cancel`, poll synchronously, `await` it, or
//! block a plain thread on it with `wait_blocking`. [`join`] waits for a
//! whole batch of handles at once.
//!
//! ```no_run
//! use taskpool::{submit_isolated, CompletionHandle};
//!
//! fn square(x: i32) -> i32 {
//!     x * x
//! }
//!
//! let handle: CompletionHandle<i32> = submit_isolated(square, 9, None, None);
//! let result = handle.wait_blocking().unwrap();
//! assert_eq!(result, 81);
//! ```

mod default;
mod executor;
mod handle;
mod join;
mod pool;
mod worker;

pub use default::{default_executor, default_pool, submit_in_process, submit_isolated};
pub use executor::{InProcessExecutor, InProcessExecutorConfig};
pub use handle::{CompletionHandle, WaitError};
pub use join::{join, JoinOutcome};
pub use pool::{IsolatedPool, IsolatedPoolConfig};

pub use taskpool_core::{PoolError, PoolResult, TaskError, TaskId, WorkerId};
