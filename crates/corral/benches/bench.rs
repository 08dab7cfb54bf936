use core::{hint::black_box, time::Duration};
use corral::{AcquireOrder, OrderedLockSet, PoolConfig, WorkerPool};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::index::sample};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Tasks or lock sets per benchmark iteration (split across threads for the
// contended variants).
const TOTAL_OPS: usize = 4096;
const ITEMS: usize = 64;
const CART_SIZE: usize = 3;
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

fn carts(seed: u64, count: usize) -> Vec<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let size = rng.random_range(1..=CART_SIZE);
            sample(&mut rng, ITEMS, size).into_vec()
        })
        .collect()
}

/// Uncontended lock-set acquisition on a single thread.
fn bench_lock_set_sequential(c: &mut Criterion, group_name: &str, order: AcquireOrder) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    let carts = carts(7, TOTAL_OPS);
    group.bench_function(format!("elems/{TOTAL_OPS}"), |b| {
        let locks = OrderedLockSet::new();
        b.iter(|| {
            for cart in &carts {
                let held = locks
                    .with_locks_ordered(cart.iter().copied(), LOCK_TIMEOUT, order, || cart.len())
                    .unwrap();
                black_box(held);
            }
        });
    });

    group.finish();
}

/// Lock sets drawn from a small key space by many threads at once.
fn bench_lock_set_contended(c: &mut Criterion, group_name: &str) {
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8, 16] {
        let per_thread = TOTAL_OPS / thread_count;
        let carts: Vec<_> = (0..thread_count)
            .map(|t| carts(t as u64, per_thread))
            .collect();

        group.throughput(Throughput::Elements(TOTAL_OPS as u64));
        group.bench_function(
            format!("elems/{TOTAL_OPS}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let locks = OrderedLockSet::new();
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for thread_carts in &carts {
                                let locks = locks.clone();
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for cart in thread_carts {
                                        let held = locks
                                            .with_locks(cart.iter().copied(), LOCK_TIMEOUT, || {
                                                cart.len()
                                            })
                                            .unwrap();
                                        black_box(held);
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Submit-then-join throughput for trivial tasks.
fn bench_pool_submit(c: &mut Criterion, group_name: &str, config: impl Fn() -> PoolConfig) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("elems/{TOTAL_OPS}"), |b| {
        let pool = WorkerPool::with_config(config()).unwrap();
        b.iter(|| {
            let handles: Vec<_> = (0..TOTAL_OPS)
                .map(|i| pool.submit(move || black_box(i)).unwrap())
                .collect();
            for handle in handles {
                black_box(handle.join().unwrap());
            }
        });
    });

    group.finish();
}

/// Many submitters pushing into one saturated pool.
fn bench_pool_contended(c: &mut Criterion, group_name: &str) {
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8] {
        let per_thread = TOTAL_OPS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_OPS as u64));
        group.bench_function(
            format!("elems/{TOTAL_OPS}/threads/{thread_count}"),
            |b| {
                let pool = WorkerPool::with_config(
                    PoolConfig::new(2, 4, Duration::from_secs(60), 64).prestart(true),
                )
                .unwrap();
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let barrier = Arc::clone(&barrier);
                                let pool = &pool;
                                s.spawn(move || {
                                    barrier.wait();
                                    let handles: Vec<_> = (0..per_thread)
                                        .map(|i| pool.submit(move || black_box(i)).unwrap())
                                        .collect();
                                    for handle in handles {
                                        black_box(handle.join().unwrap());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_lock_sequential_canonical(c: &mut Criterion) {
    bench_lock_set_sequential(c, "lock/sequential/canonical", AcquireOrder::Canonical);
}

fn benchmark_lock_sequential_as_given(c: &mut Criterion) {
    bench_lock_set_sequential(c, "lock/sequential/as_given", AcquireOrder::AsGiven);
}

fn benchmark_lock_contended(c: &mut Criterion) {
    bench_lock_set_contended(c, "lock/contended/canonical");
}

/// Work fits in the core workers and the single-slot offer.
fn benchmark_pool_sequential_small(c: &mut Criterion) {
    bench_pool_submit(c, "pool/sequential/small", || {
        PoolConfig::new(1, 2, Duration::from_secs(60), 16)
    });
}

/// Wide pool with plenty of queue room.
fn benchmark_pool_sequential_wide(c: &mut Criterion) {
    bench_pool_submit(c, "pool/sequential/wide", || {
        let workers = num_cpus::get().max(1);
        PoolConfig::new(workers, workers * 2, Duration::from_secs(60), 1024).prestart(true)
    });
}

fn benchmark_pool_contended(c: &mut Criterion) {
    bench_pool_contended(c, "pool/contended");
}

criterion_group!(
    benches,
    // Lock manager
    benchmark_lock_sequential_canonical,
    benchmark_lock_sequential_as_given,
    benchmark_lock_contended,
    // Worker pool
    benchmark_pool_sequential_small,
    benchmark_pool_sequential_wide,
    benchmark_pool_contended,
);
criterion_main!(benches);
