//! Concurrent orders over a shared inventory.
//!
//! Every order draws a cart of random items and decrements each one while
//! holding all of the cart's item locks. Running the same orders with
//! canonical and caller-ordered acquisition shows the difference: the former
//! always completes, the latter can form wait cycles that only the lock
//! timeout breaks.

use crate::config::InventoryConfig;
use corral::{AcquireOrder, OrderedLockSet};
use rand::Rng;
use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    thread::scope,
    time::{Duration, Instant},
};

struct Item {
    name: String,
    remaining: AtomicU64,
}

/// Items keyed by position; the lock keys are the item names.
pub struct Inventory {
    items: Vec<Item>,
    locks: OrderedLockSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderReport {
    pub placed: usize,
    pub succeeded: usize,
    pub units_sold: u64,
    pub remaining: u64,
    pub initial: u64,
    pub elapsed: Duration,
}

impl OrderReport {
    /// Stock is consistent when every unit sold is accounted for.
    pub const fn is_consistent(&self) -> bool {
        self.initial == self.remaining + self.units_sold
    }
}

impl Inventory {
    pub fn new(items: usize, stock: u64) -> Self {
        Self {
            items: (0..items)
                .map(|i| Item {
                    name: format!("item{i}"),
                    remaining: AtomicU64::new(stock),
                })
                .collect(),
            locks: OrderedLockSet::new(),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.items
            .iter()
            .map(|item| item.remaining.load(Ordering::Relaxed))
            .sum()
    }

    /// Draws `size` items, possibly repeating one.
    pub fn random_cart(&self, rng: &mut impl Rng, size: usize) -> Vec<usize> {
        (0..size)
            .map(|_| rng.random_range(0..self.items.len()))
            .collect()
    }

    /// Places one order, returning whether it went through.
    ///
    /// The stock update is a plain read-then-write, so it is only correct
    /// while the cart's locks are held.
    pub fn place_order(&self, cart: &[usize], timeout: Duration, order: AcquireOrder) -> bool {
        let keys = cart.iter().map(|&i| self.items[i].name.clone());
        let placed = self.locks.with_locks_ordered(keys, timeout, order, || {
            for &i in cart {
                let remaining = &self.items[i].remaining;
                let current = remaining.load(Ordering::Relaxed);
                std::thread::yield_now();
                remaining.store(current.saturating_sub(1), Ordering::Relaxed);
            }
        });

        match placed {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Order {cart:?} abandoned: {e}");
                false
            }
        }
    }

    /// Places `config.orders` orders at once, one thread each.
    pub fn run(&self, config: &InventoryConfig, order: AcquireOrder) -> OrderReport {
        let initial = self.remaining();
        let succeeded = AtomicUsize::new(0);
        let units_sold = AtomicU64::new(0);
        let started = Instant::now();

        scope(|s| {
            for _ in 0..config.orders {
                s.spawn(|| {
                    let cart = self.random_cart(&mut rand::rng(), config.cart_size);
                    if self.place_order(&cart, config.lock_timeout, order) {
                        succeeded.fetch_add(1, Ordering::Relaxed);
                        units_sold.fetch_add(cart.len() as u64, Ordering::Relaxed);
                    }
                });
            }
        });

        OrderReport {
            placed: config.orders,
            succeeded: succeeded.into_inner(),
            units_sold: units_sold.into_inner(),
            remaining: self.remaining(),
            initial,
            elapsed: started.elapsed(),
        }
    }
}

/// Runs the scenario with both acquisition orders on fresh inventories.
pub fn run(config: &InventoryConfig) {
    for (label, order) in [
        ("canonical", AcquireOrder::Canonical),
        ("as-given", AcquireOrder::AsGiven),
    ] {
        let inventory = Inventory::new(config.items, config.stock);
        let report = inventory.run(config, order);

        tracing::info!(
            order = label,
            placed = report.placed,
            succeeded = report.succeeded,
            remaining = report.remaining,
            consistent = report.is_consistent(),
            elapsed = ?report.elapsed,
            "Inventory scenario finished"
        );
        if report.succeeded < report.placed {
            tracing::warn!(
                order = label,
                "{} order(s) timed out waiting for item locks",
                report.placed - report.succeeded
            );
        }
    }
}
