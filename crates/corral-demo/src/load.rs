//! Paced submissions into an eager-growing pool.
//!
//! Submits `tasks` sleeping tasks, one every `submit_interval`, while a
//! monitor thread logs [`PoolStats`](corral::PoolStats) every
//! `stats_interval`. The log shows the pool growing to `max_size` before the
//! queue fills, then blocking (or rejecting) submitters, then shrinking back
//! once the keep-alive expires.

use crate::config::LoadConfig;
use corral::{Error, WorkerPool};
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread::{self, scope},
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub submitted: usize,
    pub rejected: usize,
    pub completed: u64,
    pub largest_pool_size: usize,
}

pub fn run(config: &LoadConfig) -> anyhow::Result<LoadReport> {
    let pool = WorkerPool::with_config(config.pool.clone())?;
    let done = AtomicBool::new(false);
    let submitted = AtomicUsize::new(0);

    let rejected = scope(|s| {
        s.spawn(|| monitor(&pool, &done, config.stats_interval));

        let mut rejected = 0;
        for id in 1..=config.tasks {
            thread::sleep(config.submit_interval);
            let task_duration = config.task_duration;
            let outcome = pool.execute(move || {
                tracing::info!("Task {id} started");
                thread::sleep(task_duration);
                tracing::info!("Task {id} finished");
            });
            match outcome {
                Ok(()) => {
                    submitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e @ Error::Rejected(_)) => {
                    tracing::error!("Error submitting task {id}: {e}");
                    rejected += 1;
                }
                Err(e) => {
                    done.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        pool.shutdown(true);
        while !pool.await_termination(config.stats_interval) {
            tracing::info!("Waiting for {} to drain", pool.stats());
        }
        done.store(true, Ordering::Relaxed);
        Ok(rejected)
    })?;

    let stats = pool.stats();
    tracing::info!("Pool scenario finished: {stats}");
    Ok(LoadReport {
        submitted: submitted.into_inner(),
        rejected,
        completed: stats.completed,
        largest_pool_size: stats.largest_pool_size,
    })
}

fn monitor(pool: &WorkerPool, done: &AtomicBool, interval: Duration) {
    while !done.load(Ordering::Relaxed) {
        let stats = pool.stats();
        tracing::info!(
            pool_size = stats.pool_size,
            active = stats.active,
            largest = stats.largest_pool_size,
            completed = stats.completed,
            queued = stats.queued,
            "Pool stats"
        );
        thread::sleep(interval);
    }
}
