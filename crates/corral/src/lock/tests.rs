use crate::{AcquireOrder, LockRegistry, OrderedLockSet, ResourceLock};
use core::time::Duration;
use rand::{Rng, seq::SliceRandom};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        mpsc,
    },
    thread::{self, scope},
    time::Instant,
};

const SHORT: Duration = Duration::from_millis(50);
const LONG: Duration = Duration::from_secs(10);

/// Ten inventory counters, mutated only with non-atomic read-modify-write so
/// that a missing lock shows up as a lost update.
struct Inventory {
    remaining: Vec<AtomicI64>,
}

impl Inventory {
    fn new(items: usize, stock: i64) -> Self {
        Self {
            remaining: (0..items).map(|_| AtomicI64::new(stock)).collect(),
        }
    }

    fn take_one(&self, item: usize) {
        let current = self.remaining[item].load(Ordering::Relaxed);
        thread::yield_now();
        self.remaining[item].store(current - 1, Ordering::Relaxed);
    }

    fn total(&self) -> i64 {
        self.remaining.iter().map(|r| r.load(Ordering::Relaxed)).sum()
    }
}

fn random_cart(rng: &mut impl Rng, items: usize, size: usize) -> Vec<usize> {
    let mut cart = rand::seq::index::sample(rng, items, size).into_vec();
    cart.shuffle(rng);
    cart
}

#[test]
fn reentrant_acquire_needs_matching_releases() {
    let lock = Arc::new(ResourceLock::new("item0"));

    let first = lock.acquire(SHORT).unwrap();
    let second = lock.acquire(SHORT).unwrap();
    let third = lock.try_acquire().unwrap();
    assert_eq!(lock.hold_count(), 3);
    assert!(lock.is_held_by_current_thread());

    drop(third);
    drop(first);
    assert!(lock.is_locked());
    assert_eq!(lock.hold_count(), 1);

    drop(second);
    assert!(!lock.is_locked());
    assert_eq!(lock.hold_count(), 0);
}

#[test]
fn acquire_times_out_and_deregisters_waiter() {
    let lock = Arc::new(ResourceLock::new("item0"));
    let _held = lock.acquire(SHORT).unwrap();

    let other = Arc::clone(&lock);
    let err = thread::spawn(move || {
        assert!(other.try_acquire().is_none());
        other.acquire(SHORT).unwrap_err()
    })
    .join()
    .unwrap();

    assert_eq!(err.key, "item0");
    assert!(err.waited >= SHORT);
    assert_eq!(lock.waiters(), 0);
    assert_eq!(lock.hold_count(), 1);
}

#[test]
fn waiter_gets_lock_once_released() {
    let lock = Arc::new(ResourceLock::new("item0"));
    let held = lock.acquire(SHORT).unwrap();
    let (tx, rx) = mpsc::channel();

    let other = Arc::clone(&lock);
    let waiter = thread::spawn(move || {
        tx.send(()).unwrap();
        let guard = other.acquire(LONG).unwrap();
        other.hold_count() == 1 && guard.lock().key() == "item0"
    });

    rx.recv().unwrap();
    while lock.waiters() == 0 {
        thread::yield_now();
    }
    drop(held);
    assert!(waiter.join().unwrap());
    assert!(!lock.is_locked());
}

#[test]
fn timed_out_head_waiter_hands_over_to_next() {
    let lock = Arc::new(ResourceLock::new("item0"));
    let held = lock.acquire(SHORT).unwrap();

    // The first waiter gives up quickly; the second must still be served.
    let early = Arc::clone(&lock);
    let first = thread::spawn(move || early.acquire(Duration::from_millis(20)).is_err());
    while lock.waiters() == 0 {
        thread::yield_now();
    }
    let late = Arc::clone(&lock);
    let second = thread::spawn(move || late.acquire(LONG).is_ok());

    assert!(first.join().unwrap());
    drop(held);
    assert!(second.join().unwrap());
    assert_eq!(lock.waiters(), 0);
}

#[test]
fn canonical_order_sorts_and_dedups() {
    let keys = AcquireOrder::Canonical.arrange(["item3", "item1", "item3", "item2"]);
    assert_eq!(keys, ["item1", "item2", "item3"]);

    let keys = AcquireOrder::AsGiven.arrange(["item3", "item1", "item3", "item2"]);
    assert_eq!(keys, ["item3", "item1", "item2"]);
}

#[test]
fn with_locks_runs_body_once_and_releases_everything() {
    let locks = OrderedLockSet::new();
    let calls = AtomicUsize::new(0);

    let out = locks
        .with_locks(["b", "a", "c", "a"], SHORT, || {
            assert_eq!(locks.registry().held_count(), 3);
            assert!(locks.registry().is_locked(&"a"));
            calls.fetch_add(1, Ordering::Relaxed);
            "done"
        })
        .unwrap();

    assert_eq!(out, "done");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(locks.registry().held_count(), 0);
    assert!(locks.registry().is_empty());
}

#[test]
fn lock_all_holds_in_canonical_order() {
    let locks = OrderedLockSet::new();
    let held = locks
        .lock_all([9, 4, 7, 4], SHORT, AcquireOrder::Canonical)
        .unwrap();

    assert_eq!(held.keys().copied().collect::<Vec<_>>(), [4, 7, 9]);
    assert_eq!(held.len(), 3);
    drop(held);
    assert_eq!(locks.registry().held_count(), 0);
}

#[test]
fn with_locks_releases_when_body_panics() {
    let locks = OrderedLockSet::new();

    let result = catch_unwind(AssertUnwindSafe(|| {
        locks.with_locks(["a", "b"], SHORT, || panic!("body failed"))
    }));

    assert!(result.is_err());
    assert_eq!(locks.registry().held_count(), 0);
    assert!(!locks.registry().is_locked(&"a"));
    assert!(!locks.registry().is_locked(&"b"));
}

#[test]
fn failed_member_rolls_back_earlier_members() {
    let locks = OrderedLockSet::new();
    let ran = AtomicBool::new(false);
    let holding = Barrier::new(2);
    let done = Barrier::new(2);

    scope(|s| {
        s.spawn(|| {
            locks
                .with_locks(["b"], SHORT, || {
                    holding.wait();
                    done.wait();
                })
                .unwrap();
        });

        holding.wait();
        let err = locks
            .with_locks(["c", "a", "b"], SHORT, || ran.store(true, Ordering::Relaxed))
            .unwrap_err();

        assert_eq!(err.key, "\"b\"");
        assert_eq!(err.position, 1);
        assert_eq!(err.rolled_back, 1);
        assert!(!locks.registry().is_locked(&"a"));
        assert!(!locks.registry().is_locked(&"c"));
        assert_eq!(locks.registry().held_count(), 1);
        done.wait();
    });

    assert!(!ran.load(Ordering::Relaxed));
    assert_eq!(locks.registry().held_count(), 0);
}

#[test]
fn registry_reclaims_entries_only_when_unreferenced() {
    let registry = LockRegistry::new();
    let handle = registry.checkout(&"a");
    let guard = handle.acquire(SHORT).unwrap();

    let again = registry.checkout(&"a");
    assert!(Arc::ptr_eq(&handle, &again));
    registry.checkin(&"a", again);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.reclaim_idle(), 0);

    drop(guard);
    registry.checkin(&"a", handle);
    assert!(registry.is_empty());

    let _unused = registry.checkout(&"b");
    assert_eq!(registry.len(), 1);
}

#[test]
fn concurrent_orders_over_overlapping_items_never_deadlock() {
    const ITEMS: usize = 10;
    const ORDERS: usize = 100;
    const THREADS: usize = 16;

    let locks = OrderedLockSet::new();
    let inventory = Inventory::new(ITEMS, 1000);
    let next = AtomicUsize::new(0);
    let succeeded = AtomicUsize::new(0);
    let started = Instant::now();

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut rng = rand::rng();
                while next.fetch_add(1, Ordering::Relaxed) < ORDERS {
                    let cart = random_cart(&mut rng, ITEMS, 3);
                    locks
                        .with_locks(cart.iter().copied(), LONG, || {
                            cart.iter().for_each(|&item| inventory.take_one(item));
                        })
                        .unwrap();
                    succeeded.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(succeeded.load(Ordering::Relaxed), ORDERS);
    assert_eq!(inventory.total(), (ITEMS as i64) * 1000 - 3 * ORDERS as i64);
    assert_eq!(locks.registry().held_count(), 0);
    assert!(started.elapsed() < LONG);
}

#[test]
fn caller_order_can_deadlock_until_timeout() {
    let locks = OrderedLockSet::new();
    let holding_b = Barrier::new(2);

    let (first, second) = scope(|s| {
        let crosser = s.spawn(|| {
            let b = locks.lock_all(["b"], SHORT, AcquireOrder::AsGiven).unwrap();
            holding_b.wait();
            while !locks.registry().is_locked(&"a") {
                thread::yield_now();
            }
            // Holds `b` and now wants `a`, which the other side holds.
            let result = locks.lock_all(["a"], Duration::from_millis(200), AcquireOrder::AsGiven);
            let failed = result.is_err();
            drop(result);
            drop(b);
            failed
        });

        holding_b.wait();
        let result = locks.with_locks_ordered(
            ["a", "b"],
            Duration::from_millis(200),
            AcquireOrder::AsGiven,
            || (),
        );
        (result.is_err(), crosser.join().unwrap())
    });

    // Both sides wait on each other; at least one must give up.
    assert!(first || second);
    assert_eq!(locks.registry().held_count(), 0);
}

#[test]
fn canonical_order_resolves_the_same_crossing() {
    let locks = OrderedLockSet::new();
    let start = Barrier::new(2);
    let crossings = AtomicUsize::new(0);

    scope(|s| {
        for keys in [["a", "b"], ["b", "a"]] {
            let locks = &locks;
            let start = &start;
            let crossings = &crossings;
            s.spawn(move || {
                start.wait();
                for _ in 0..200 {
                    locks
                        .with_locks(keys, LONG, || {
                            crossings.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(crossings.load(Ordering::Relaxed), 400);
    assert_eq!(locks.registry().held_count(), 0);
}

#[test]
fn caller_order_stress_always_terminates_clean() {
    const ITEMS: usize = 10;
    const ORDERS: usize = 100;

    let locks = OrderedLockSet::new();
    let inventory = Inventory::new(ITEMS, 1000);
    let succeeded = AtomicUsize::new(0);

    scope(|s| {
        for _ in 0..ORDERS {
            s.spawn(|| {
                let mut rng = rand::rng();
                let cart = random_cart(&mut rng, ITEMS, 3);
                let result = locks.with_locks_ordered(
                    cart.iter().copied(),
                    Duration::from_millis(100),
                    AcquireOrder::AsGiven,
                    || {
                        cart.iter().for_each(|&item| inventory.take_one(item));
                        thread::sleep(Duration::from_millis(1));
                    },
                );
                if result.is_ok() {
                    succeeded.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    // Failed orders never touched stock, successful ones took exactly three.
    let succeeded = succeeded.load(Ordering::Relaxed) as i64;
    assert_eq!(inventory.total(), (ITEMS as i64) * 1000 - 3 * succeeded);
    assert_eq!(locks.registry().held_count(), 0);
}
