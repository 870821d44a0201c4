//! Cancel-queued demo
//!
//! Shows that a task still sitting in the overflow queue can be cancelled
//! before it ever reaches a worker, while a task already running on a
//! worker is unaffected.

use std::time::Duration;

use taskpool::{IsolatedPool, IsolatedPoolConfig};

fn slow(_: ()) -> &'static str {
    std::thread::sleep(Duration::from_millis(500));
    "first"
}

fn quick(_: ()) -> &'static str {
    "second"
}

fn main() {
    tracing_subscriber::fmt::init();

    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "cancel-demo".to_string(),
        core: 0,
        max: 1,
        keep_active_seconds: 5,
    });

    println!("=== Cancel-Queued Demo ===\n");
    let first = pool.submit_with_handle(slow, (), "slow");
    // Give the single worker time to pick up `first` before `second` queues
    // behind it.
    std::thread::sleep(Duration::from_millis(50));
    let second = pool.submit_with_handle(quick, (), "quick");

    let cancelled = second.cancel();
    println!("cancel(second) = {cancelled} (expect true: second never left the overflow queue)");
    println!("second.is_cancelled() = {}", second.is_cancelled());

    let result = first.wait_blocking().expect("first should not fail");
    println!("first completed normally with result = {result:?}");
}
