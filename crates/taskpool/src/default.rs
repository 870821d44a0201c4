//! Process-wide default pool and executor, lazily initialized.
//!
//! Mirrors the `OnceLock`-backed singleton pattern
//! `horizon-lattice-core::threadpool` uses for its default global pool:
//! created on first use, sized from the environment, and shared by every
//! caller that doesn't bring its own `IsolatedPool`/`InProcessExecutor`.

use std::sync::OnceLock;

use taskpool_core::env::env_get;

use crate::executor::{InProcessExecutor, InProcessExecutorConfig};
use crate::handle::CompletionHandle;
use crate::pool::{IsolatedPool, IsolatedPoolConfig};

static DEFAULT_POOL: OnceLock<IsolatedPool> = OnceLock::new();
static DEFAULT_EXECUTOR: OnceLock<InProcessExecutor> = OnceLock::new();

/// The process-wide default isolated pool, sized `2 * num_cpus` by default
/// (overridable via `TASKPOOL_DEFAULT_MAX`/`TASKPOOL_DEFAULT_CORE`).
pub fn default_pool() -> &'static IsolatedPool {
    DEFAULT_POOL.get_or_init(|| {
        let cpus = num_cpus::get().max(1);
        let core = env_get("TASKPOOL_DEFAULT_CORE", cpus);
        let max = env_get("TASKPOOL_DEFAULT_MAX", cpus * 2);
        let keep_active_seconds = env_get("TASKPOOL_DEFAULT_KEEP_ACTIVE_SECONDS", 30u64);
        IsolatedPool::new(IsolatedPoolConfig {
            name: "taskpool-default".to_string(),
            core,
            max,
            keep_active_seconds,
        })
    })
}

/// The process-wide default in-process executor, sized 20 by default
/// (overridable via `TASKPOOL_DEFAULT_EXECUTOR_SIZE`).
pub fn default_executor() -> &'static InProcessExecutor {
    DEFAULT_EXECUTOR.get_or_init(|| {
        let max_size = env_get("TASKPOOL_DEFAULT_EXECUTOR_SIZE", 20usize);
        InProcessExecutor::new(InProcessExecutorConfig { max_size })
    })
}

/// Submit `entry(argument)` to `pool` (or the process default) and return a
/// handle to its outcome. If submission is rejected (e.g. the pool is
/// shut down), the returned handle is already terminal with that error.
pub fn submit_isolated<A, R>(
    entry: fn(A) -> R,
    argument: A,
    pool: Option<&IsolatedPool>,
    debug_label: Option<&str>,
) -> CompletionHandle<R>
where
    A: Send + 'static,
    R: Clone + Send + 'static,
{
    let pool = pool.unwrap_or_else(|| default_pool());
    let label = debug_label.unwrap_or("CompletableIsolate");
    pool.submit_with_handle(entry, argument, label)
}

/// Schedule `task` on `executor` (or the process default) and return a
/// handle to its outcome.
pub fn submit_in_process<F, T>(task: F, executor: Option<&InProcessExecutor>) -> CompletionHandle<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Clone + Send + 'static,
{
    let executor = executor.unwrap_or_else(|| default_executor());
    executor.execute(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(x: i32) -> i32 {
        x * 2
    }

    #[test]
    fn submit_isolated_uses_default_pool() {
        let handle = submit_isolated(double, 21, None, None);
        assert_eq!(handle.wait_blocking().unwrap(), 42);
    }

    #[tokio::test]
    async fn submit_in_process_uses_default_executor() {
        let handle = submit_in_process(async { 1 + 1 }, None);
        assert_eq!(handle.wait().await.unwrap(), 2);
    }
}
