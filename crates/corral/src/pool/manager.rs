//! Eager-growing worker pool.
//!
//! This module defines [`WorkerPool`], a bounded pool of OS worker threads
//! that grows *before* it queues. Every submission is placed by the first
//! rule that applies:
//!
//! 1. An idle worker exists: hand the task to it directly.
//! 2. Fewer than `max_size` workers are live: spawn one for the task.
//! 3. [`BoundedTaskQueue::offer`] accepts it, which only happens when the
//!    queue is empty.
//! 4. Otherwise the [`AdmissionController`] blocks the submitter until the
//!    task fits in the queue, or rejects it.
//!
//! All pool state lives behind a single mutex. Workers, submitters and
//! shutdown coordinate through three condition variables: work available,
//! queue space available, and terminated.

use super::{
    AdmissionController, BoundedTaskQueue, PoolConfig, PoolStats, RunState, TaskHandle,
    handle::Job, worker::Worker,
};
use crate::{Error, Rejection, Result};
use core::time::Duration;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::Instant,
};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Pool state guarded by [`Shared::state`].
pub(crate) struct PoolState {
    pub(crate) run_state: RunState,
    /// Live worker threads, including ones still starting up.
    pub(crate) live: usize,
    /// Workers that have claimed a task and not yet finished it.
    pub(crate) busy: usize,
    pub(crate) largest: usize,
    /// Tasks handed directly to idle workers. Never longer than the number
    /// of idle workers.
    pub(crate) handoff: VecDeque<Job>,
    pub(crate) queue: BoundedTaskQueue<Job>,
}

impl PoolState {
    /// Live workers that are neither running nor promised a task.
    pub(crate) fn idle(&self) -> usize {
        self.live - self.busy - self.handoff.len()
    }
}

/// State shared between the pool handle and its workers.
pub(crate) struct Shared {
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState>,
    pub(crate) work_available: Condvar,
    pub(crate) space_available: Condvar,
    pub(crate) terminated: Condvar,
    pub(crate) completed: CachePadded<AtomicU64>,
    pub(crate) allow_core_timeout: AtomicBool,
    next_worker_id: AtomicUsize,
}

impl Shared {
    /// Starts a worker, optionally with its first task already claimed.
    ///
    /// Must be called with the state lock held; the new thread blocks on it
    /// until the caller releases it.
    pub(crate) fn spawn_worker(
        self: &Arc<Self>,
        state: &mut PoolState,
        first_task: Option<Job>,
    ) -> Result<()> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let claimed = first_task.is_some();
        let worker = Worker::new(id, Arc::clone(self), first_task);

        state.live += 1;
        if claimed {
            state.busy += 1;
        }
        state.largest = state.largest.max(state.live);

        let spawned = thread::Builder::new()
            .name(format!("{}-{id}", self.config.thread_name))
            .spawn(move || worker.run());

        match spawned {
            Ok(_) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(worker = id, live = state.live, "Worker spawned");
                Ok(())
            }
            Err(source) => {
                state.live -= 1;
                if claimed {
                    state.busy -= 1;
                }
                #[cfg(feature = "tracing")]
                tracing::error!(worker = id, "Failed to spawn worker: {source}");
                Err(Error::Spawn { source })
            }
        }
    }

    /// Marks the pool terminated once it is shut down, has no live workers
    /// and nothing left to run.
    pub(crate) fn try_terminate(&self, state: &mut PoolState) {
        if state.run_state == RunState::ShuttingDown
            && state.live == 0
            && state.queue.is_empty()
            && state.handoff.is_empty()
        {
            state.run_state = RunState::Terminated;
            self.terminated.notify_all();

            #[cfg(feature = "tracing")]
            tracing::info!(
                completed = self.completed.load(Ordering::Relaxed),
                "Worker pool terminated"
            );
        }
    }
}

/// A bounded pool of worker threads that grows before it queues.
///
/// Use [`WorkerPool::submit`] to run a closure and obtain a [`TaskHandle`]
/// for its result. Dropping the pool starts a graceful shutdown without
/// waiting for it to finish.
///
/// # Example
///
/// ```
/// use corral::WorkerPool;
/// use std::time::Duration;
///
/// let pool = WorkerPool::new(2, 5, Duration::from_secs(5), 10).unwrap();
/// let handle = pool.submit(|| 6 * 7).unwrap();
/// assert_eq!(handle.join().unwrap(), 42);
///
/// pool.shutdown(true);
/// assert!(pool.await_termination(Duration::from_secs(5)));
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
    admission: AdmissionController,
}

impl WorkerPool {
    /// Creates a pool with explicit sizing and default behaviour otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the sizes are inconsistent.
    pub fn new(
        core_size: usize,
        max_size: usize,
        keep_alive: Duration,
        queue_capacity: usize,
    ) -> Result<Self> {
        Self::with_config(PoolConfig::new(
            core_size,
            max_size,
            keep_alive,
            queue_capacity,
        ))
    }

    /// Creates a pool from a full [`PoolConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is inconsistent,
    /// or [`Error::Spawn`] if prestarting a core worker failed.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let state = PoolState {
            run_state: RunState::Running,
            live: 0,
            busy: 0,
            largest: 0,
            handoff: VecDeque::with_capacity(config.max_size.min(1024)),
            queue: BoundedTaskQueue::new(config.queue_capacity),
        };
        let prestart = config.prestart;
        let pool = Self {
            admission: AdmissionController::new(config.admission_timeout),
            shared: Arc::new(Shared {
                allow_core_timeout: AtomicBool::new(config.allow_core_timeout),
                config,
                state: Mutex::new(state),
                work_available: Condvar::new(),
                space_available: Condvar::new(),
                terminated: Condvar::new(),
                completed: CachePadded::new(AtomicU64::new(0)),
                next_worker_id: AtomicUsize::new(0),
            }),
        };

        if prestart {
            let _started = pool.prestart_core_workers()?;
            #[cfg(feature = "tracing")]
            tracing::info!("{_started} core worker(s) prestarted");
        }
        Ok(pool)
    }

    /// Submits a task and returns a handle to its result.
    ///
    /// May block the caller when the pool is saturated; see
    /// [`AdmissionController`].
    ///
    /// # Errors
    ///
    /// - [`Error::Rejected`] if the pool is shutting down, or the admission
    ///   timeout elapsed.
    /// - [`Error::Spawn`] if a worker thread was needed but could not start.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = Job::with_handle(task);
        self.dispatch(job)?;
        Ok(handle)
    }

    /// Submits a task whose result nobody waits for.
    ///
    /// # Errors
    ///
    /// Same as [`Self::submit`].
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(Job::detached(task))
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    fn dispatch(&self, job: Job) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.run_state.is_running() {
            return Err(Rejection::Shutdown.into());
        }

        if state.idle() > 0 {
            state.handoff.push_back(job);
            self.shared.work_available.notify_one();
            return Ok(());
        }

        if state.live < self.shared.config.max_size {
            return self.shared.spawn_worker(&mut state, Some(job));
        }

        match state.queue.offer(job) {
            Ok(()) => {
                self.shared.work_available.notify_one();
                Ok(())
            }
            Err(job) => self.admission.admit(job, &self.shared, state),
        }
    }

    /// Starts every missing core worker without waiting for demand.
    ///
    /// Returns the number of workers started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if a worker could not start. Workers started
    /// before the failure keep running.
    pub fn prestart_core_workers(&self) -> Result<usize> {
        let mut state = self.shared.state.lock();
        let mut started = 0;
        while state.run_state.is_running() && state.live < self.shared.config.core_size {
            self.shared.spawn_worker(&mut state, None)?;
            started += 1;
        }
        Ok(started)
    }

    /// Allows or forbids idle core workers to retire after the keep-alive.
    ///
    /// Forbidding it does not respawn workers that already retired; they
    /// come back on demand.
    pub fn allow_core_timeout(&self, allow: bool) {
        self.shared.allow_core_timeout.store(allow, Ordering::Relaxed);
        // Idle core workers re-evaluate their wait mode.
        self.shared.work_available.notify_all();
    }

    /// Stops admitting tasks.
    ///
    /// With `graceful` set, every task already admitted still runs. Without
    /// it, queued tasks are discarded and their handles resolve to
    /// [`Error::Cancelled`]; tasks already running or handed to a worker
    /// run to completion either way.
    ///
    /// Submitters blocked on a saturated pool are woken and rejected. Returns
    /// the number of queued tasks discarded.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn shutdown(&self, graceful: bool) -> usize {
        let mut state = self.shared.state.lock();
        if state.run_state.is_running() {
            state.run_state = RunState::ShuttingDown;
            #[cfg(feature = "tracing")]
            tracing::info!(live = state.live, queued = state.queue.len(), "Shutdown requested");
        }

        let discarded: Vec<Job> = if graceful {
            Vec::new()
        } else {
            state.queue.drain().collect()
        };

        self.shared.work_available.notify_all();
        self.shared.space_available.notify_all();
        self.shared.try_terminate(&mut state);
        drop(state);

        // Dropped outside the lock: the captured values run arbitrary code.
        let count = discarded.len();
        drop(discarded);
        count
    }

    /// Waits up to `timeout` for the pool to terminate.
    ///
    /// Returns `true` if it terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while state.run_state != RunState::Terminated {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .terminated
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return state.run_state == RunState::Terminated;
                    }
                }
                None => self.shared.terminated.wait(&mut state),
            }
        }
        true
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        !self.shared.state.lock().run_state.is_running()
    }

    /// Returns `true` once the pool has fully terminated.
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().run_state == RunState::Terminated
    }

    /// Takes a snapshot of pool activity.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            pool_size: state.live,
            active: state.busy,
            largest_pool_size: state.largest,
            completed: self.shared.completed.load(Ordering::Relaxed),
            queued: state.queue.len(),
            state: state.run_state,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}
