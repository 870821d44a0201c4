//! Throughput of `IsolatedPool::submit_with_handle` under saturation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use taskpool::{IsolatedPool, IsolatedPoolConfig};

fn work(x: u64) -> u64 {
    // A handful of cheap arithmetic ops, just enough to not be optimized
    // away entirely and to give the scheduler something to interleave.
    (0..32).fold(x, |acc, i| acc.wrapping_mul(i + 1).wrapping_add(i))
}

fn submit_and_drain(pool: &IsolatedPool, count: u64) {
    let handles: Vec<_> = (0..count)
        .map(|i| pool.submit_with_handle(work, i, "bench"))
        .collect();
    for handle in handles {
        black_box(handle.wait_blocking().unwrap());
    }
}

fn bench_submit(c: &mut Criterion) {
    let pool = IsolatedPool::new(IsolatedPoolConfig {
        name: "bench".to_string(),
        core: num_cpus::get(),
        max: num_cpus::get() * 2,
        keep_active_seconds: 30,
    });

    c.bench_function("submit_with_handle_1000", |b| {
        b.iter(|| submit_and_drain(&pool, 1000));
    });
}

criterion_group!(benches, bench_submit);
criterion_main!(benches);
