//! Black-box scenarios exercising the public API end to end. Timings are
//! scaled down from the scenarios a production deployment would use so the
//! suite runs in a reasonable time; the shapes (FIFO overflow, idle reap,
//! core retention, queued cancellation, error transport, bounded in-process
//! concurrency) are unchanged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskpool::{join, IsolatedPool, IsolatedPoolConfig, JoinOutcome};

fn echo_index(x: usize) -> usize {
    std::thread::sleep(Duration::from_millis(20));
    x
}

#[test]
fn throughput_every_result_matches_its_input() {
    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "throughput".to_string(),
        core: 0,
        max: 4,
        keep_active_seconds: 5,
    });
    let handles: Vec<_> = (0..40)
        .map(|i| pool.submit_with_handle(echo_index, i, "echo"))
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait_blocking().unwrap(), i);
    }
}

#[test]
fn idle_workers_are_reaped_once_work_drains() {
    fn fast(x: i32) -> i32 {
        x
    }
    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "reap".to_string(),
        core: 0,
        max: 2,
        keep_active_seconds: 1,
    });
    let handles: Vec<_> = (0..10)
        .map(|i| pool.submit_with_handle(fast, i, "fast"))
        .collect();
    for handle in handles {
        handle.wait_blocking().unwrap();
    }
    std::thread::sleep(Duration::from_secs(3));
    assert_eq!(pool.active_workers(), 0);
}

#[test]
fn core_workers_are_retained_after_work_drains() {
    fn fast(x: i32) -> i32 {
        x
    }
    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "core-retain".to_string(),
        core: 2,
        max: 4,
        keep_active_seconds: 1,
    });
    for handle in (0..10).map(|i| pool.submit_with_handle(fast, i, "fast")) {
        handle.wait_blocking().unwrap();
    }
    std::thread::sleep(Duration::from_secs(3));
    assert_eq!(pool.active_workers(), 2);
}

#[test]
fn cancel_on_a_queued_task_succeeds_and_does_not_disturb_the_running_one() {
    fn slow(_: ()) -> &'static str {
        std::thread::sleep(Duration::from_millis(300));
        "first"
    }
    fn quick(_: ()) -> &'static str {
        "second"
    }
    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "cancel-queued".to_string(),
        core: 0,
        max: 1,
        keep_active_seconds: 5,
    });
    let first = pool.submit_with_handle(slow, (), "slow");
    std::thread::sleep(Duration::from_millis(30));
    let second = pool.submit_with_handle(quick, (), "quick");

    assert!(second.cancel());
    assert!(!second.cancel(), "cancelling twice must not succeed twice");
    assert!(second.wait_blocking().is_err());
    assert!(second.is_cancelled());
    assert_eq!(first.wait_blocking().unwrap(), "first");
}

#[test]
fn error_transport_fires_on_error_and_on_complete_exactly_once() {
    fn boom(_: ()) -> i32 {
        panic!("synthetic failure");
    }
    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "errors".to_string(),
        core: 1,
        max: 1,
        keep_active_seconds: 5,
    });
    let handle = pool.submit_with_handle(boom, (), "boom");
    let on_error_count = Arc::new(AtomicUsize::new(0));
    let on_complete_count = Arc::new(AtomicUsize::new(0));
    {
        let on_error_count = on_error_count.clone();
        let on_complete_count = on_complete_count.clone();
        handle.then(
            |_| unreachable!("must not fire onValue for a failed task"),
            move |_| {
                on_error_count.fetch_add(1, Ordering::SeqCst);
            },
        );
        handle.when_complete(move || {
            on_complete_count.fetch_add(1, Ordering::SeqCst);
        });
    }
    let _ = handle.wait_blocking();
    assert!(handle.is_error());
    assert_eq!(handle.error().unwrap().message(), "synthetic failure");
    assert_eq!(on_error_count.load(Ordering::SeqCst), 1);
    assert_eq!(on_complete_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn in_process_executor_never_exceeds_its_bound() {
    use taskpool::{InProcessExecutor, InProcessExecutorConfig};

    let executor = InProcessExecutor::new(InProcessExecutorConfig { max_size: 3 });
    let peak = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..9)
        .map(|_| {
            let peak = peak.clone();
            let probe = executor.clone();
            executor.execute(async move {
                peak.fetch_max(probe.active_count(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
            })
        })
        .collect();

    let start = Instant::now();
    let outcomes: Vec<JoinOutcome<()>> = join(handles).await;
    assert!(outcomes.iter().all(|o| matches!(o, JoinOutcome::Value(()))));
    assert!(start.elapsed() >= Duration::from_millis(140));
    assert!(peak.load(Ordering::SeqCst) <= 3);
}
