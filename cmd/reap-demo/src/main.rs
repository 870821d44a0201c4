//! Idle-reap demo
//!
//! Shows `core` workers surviving an idle period while non-core workers
//! self-exit once past `keepActiveSeconds`.

use std::time::Duration;

use taskpool::{IsolatedPool, IsolatedPoolConfig};

fn fast(x: i32) -> i32 {
    x
}

fn main() {
    tracing_subscriber::fmt::init();

    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "reap-demo".to_string(),
        core: 2,
        max: 6,
        keep_active_seconds: 1,
    });

    println!("=== Idle Reap Demo ===\n");
    println!("Submitting a burst of fast tasks to grow the pool past its core size...");
    for handle in (0..20).map(|i| pool.submit_with_handle(fast, i, "fast")) {
        handle.wait_blocking().expect("task should not fail");
    }
    println!("active_workers right after the burst: {}", pool.active_workers());

    println!("Waiting 3s for non-core workers to idle-reap...");
    std::thread::sleep(Duration::from_secs(3));
    println!(
        "active_workers after the reaper runs: {} (expect core = 2)",
        pool.active_workers()
    );
}
