//! Throughput demo
//!
//! Submits a batch of sleeping tasks to an `IsolatedPool` and reports wall
//! time, demonstrating that a bounded pool of workers runs them in parallel
//! rather than one at a time.

use std::time::{Duration, Instant};

use taskpool::{IsolatedPool, IsolatedPoolConfig};

fn sleep_and_echo(index: u64) -> u64 {
    std::thread::sleep(Duration::from_millis(100));
    index
}

fn main() {
    tracing_subscriber::fmt::init();

    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "throughput-demo".to_string(),
        core: 0,
        max: 4,
        keep_active_seconds: 5,
    });

    println!("=== Throughput Demo ===\n");
    let total = 40u64;
    let start = Instant::now();

    let handles: Vec<_> = (0..total)
        .map(|i| pool.submit_with_handle(sleep_and_echo, i, "sleep_and_echo"))
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.wait_blocking().expect("task should not fail");
        assert_eq!(result, i as u64);
    }

    println!(
        "Ran {total} tasks (100ms each) across max=4 workers in {:?}",
        start.elapsed()
    );
}
