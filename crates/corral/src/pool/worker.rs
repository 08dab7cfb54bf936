use super::{
    handle::{Job, Outcome},
    manager::{PoolState, Shared},
};
use core::sync::atomic::Ordering;
use parking_lot::MutexGuard;
use std::sync::Arc;

/// A single pool thread.
///
/// A worker runs its first task, if it was spawned with one, then keeps
/// claiming work until it retires. Tasks are claimed from the direct-handoff
/// slot first and the bounded queue second. A worker retires when:
///
/// - the pool is shutting down and nothing is left to run, or
/// - it waited a full keep-alive without work while more than `core_size`
///   workers were live, or core timeout is allowed.
///
/// A task that panics takes its worker down with it. The fault is reported
/// through the task's handle and a fresh worker is started in its place
/// while the pool still has a reason to need one.
pub(crate) struct Worker {
    id: usize,
    shared: Arc<Shared>,
    first_task: Option<Job>,
}

impl Worker {
    pub(crate) const fn new(id: usize, shared: Arc<Shared>, first_task: Option<Job>) -> Self {
        Self {
            id,
            shared,
            first_task,
        }
    }

    pub(crate) fn run(mut self) {
        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {} started", self.id);

        let mut next = self.first_task.take();
        if next.is_none() {
            let mut state = self.shared.state.lock();
            next = self.next_job(&mut state);
        }

        while let Some(job) = next {
            let outcome = job.run();
            self.shared.completed.fetch_add(1, Ordering::Relaxed);

            let mut state = self.shared.state.lock();
            state.busy -= 1;

            if let Outcome::Faulted { message } = outcome {
                self.exit_faulted(&mut state, &message);
                return;
            }
            next = self.next_job(&mut state);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {} stopped", self.id);
    }

    /// Claims the next task, waiting for one if necessary.
    ///
    /// Returns `None` once this worker has retired; its slot has already been
    /// released from the live count at that point.
    fn next_job(&self, state: &mut MutexGuard<'_, PoolState>) -> Option<Job> {
        let config = &self.shared.config;
        let mut timed_out = false;

        loop {
            if let Some(job) = state.handoff.pop_front() {
                state.busy += 1;
                return Some(job);
            }

            if let Some(job) = state.queue.poll() {
                state.busy += 1;
                self.shared.space_available.notify_one();
                return Some(job);
            }

            if !state.run_state.is_running() {
                self.retire(state);
                return None;
            }

            let timed = self.shared.allow_core_timeout.load(Ordering::Relaxed)
                || state.live > config.core_size;

            if timed {
                if timed_out {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "Worker {} idle for {:?}, retiring",
                        self.id,
                        config.keep_alive
                    );
                    self.retire(state);
                    return None;
                }
                timed_out = self
                    .shared
                    .work_available
                    .wait_for(state, config.keep_alive)
                    .timed_out();
            } else {
                self.shared.work_available.wait(state);
                timed_out = false;
            }
        }
    }

    fn retire(&self, state: &mut PoolState) {
        state.live -= 1;
        self.shared.try_terminate(state);
    }

    fn exit_faulted(&self, state: &mut PoolState, _message: &str) {
        state.live -= 1;

        #[cfg(feature = "tracing")]
        tracing::warn!("Worker {} lost to a panicking task: {_message}", self.id);

        let needed = state.run_state.is_running()
            || !state.queue.is_empty()
            || !state.handoff.is_empty();
        if needed {
            if let Err(_e) = self.shared.spawn_worker(state, None) {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to replace worker {}: {_e}", self.id);
            }
        }

        self.shared.try_terminate(state);
    }
}
