use super::{
    handle::Job,
    manager::{PoolState, Shared},
};
use crate::{Rejection, Result};
use core::time::Duration;
use parking_lot::MutexGuard;
use std::time::Instant;

/// The pool's saturation handler.
///
/// The pool escalates a task here when no worker is idle, the worker ceiling
/// has been reached and [`BoundedTaskQueue::offer`] refused it. The
/// controller then performs a blocking put straight into the queue,
/// bypassing the offer predicate, on the *submitting* thread. That is the
/// pool's backpressure: once every worker is busy and a task is already
/// waiting, submitters slow down to the rate at which workers drain the
/// queue.
///
/// A blocked submitter gives up with [`Rejection::Shutdown`] as soon as the
/// pool begins shutting down, and with [`Rejection::AdmissionTimeout`] if a
/// timeout is configured and elapses. In both cases the queue and the worker
/// count are left untouched.
///
/// [`BoundedTaskQueue::offer`]: crate::BoundedTaskQueue::offer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdmissionController {
    timeout: Option<Duration>,
}

impl AdmissionController {
    /// `None` blocks until space frees up or the pool shuts down.
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Blocks until `job` is in the queue, or rejects it.
    pub(crate) fn admit(
        &self,
        mut job: Job,
        shared: &Shared,
        mut state: MutexGuard<'_, PoolState>,
    ) -> Result<()> {
        let limit = self
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout).map(|at| (timeout, at)));
        let mut expired = false;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            queued = state.queue.len(),
            "Pool saturated, blocking submitter until the queue has room"
        );

        loop {
            if !state.run_state.is_running() {
                drop(state);
                drop(job);
                #[cfg(feature = "tracing")]
                tracing::debug!("Rejected blocked submission, pool is shutting down");
                return Err(Rejection::Shutdown.into());
            }

            match state.queue.put(job) {
                Ok(()) => {
                    shared.work_available.notify_one();
                    return Ok(());
                }
                Err(back) => job = back,
            }

            if expired {
                drop(state);
                drop(job);
                let waited = limit.map_or(Duration::ZERO, |(timeout, _)| timeout);
                #[cfg(feature = "tracing")]
                tracing::debug!(?waited, "Rejected submission, admission timed out");
                return Err(Rejection::AdmissionTimeout(waited).into());
            }

            expired = match limit {
                Some((_, deadline)) => shared
                    .space_available
                    .wait_until(&mut state, deadline)
                    .timed_out(),
                None => {
                    shared.space_available.wait(&mut state);
                    false
                }
            };
        }
    }
}
