use crate::{Error, Result};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};
use futures::channel::oneshot;
use std::{
    any::Any,
    fmt, mem,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// How a job ended on its worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Faulted { message: String },
}

/// A type-erased unit of work queued on the pool.
pub(crate) struct Job {
    task: Box<dyn FnOnce() -> Outcome + Send>,
}

impl Job {
    /// Wraps `task` so its result, or its panic, is delivered to the
    /// returned handle.
    pub(crate) fn with_handle<F, R>(task: F) -> (Self, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            task: Box::new(move || {
                let (result, outcome) = match catch_unwind(AssertUnwindSafe(task)) {
                    Ok(value) => (Ok(value), Outcome::Completed),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        drop_payload(payload);
                        (
                            Err(Error::WorkerFault {
                                message: message.clone(),
                            }),
                            Outcome::Faulted { message },
                        )
                    }
                };
                // A dropped handle hands the result back; it is dropped here,
                // still under the worker's unwind guard.
                if let Err(undelivered) = tx.send(result) {
                    drop(undelivered);
                }
                outcome
            }),
        };
        (job, TaskHandle { rx: Some(rx) })
    }

    /// Wraps a fire-and-forget task.
    pub(crate) fn detached<F>(task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            task: Box::new(move || match catch_unwind(AssertUnwindSafe(task)) {
                Ok(()) => Outcome::Completed,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    drop_payload(payload);
                    Outcome::Faulted { message }
                }
            }),
        }
    }

    /// Runs the job. Never unwinds: a panic anywhere in the wrapper, such as
    /// a result or panic payload whose `Drop` panics, is reported as a fault.
    pub(crate) fn run(self) -> Outcome {
        catch_unwind(AssertUnwindSafe(self.task)).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            drop_payload(payload);
            Outcome::Faulted { message }
        })
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}

/// Drops a panic payload, leaking it instead if its own `Drop` panics.
fn drop_payload(payload: Box<dyn Any + Send>) {
    if let Err(nested) = catch_unwind(AssertUnwindSafe(move || drop(payload))) {
        mem::forget(nested);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// The pending result of a task submitted with
/// [`WorkerPool::submit`](crate::WorkerPool::submit).
///
/// The result can be retrieved by blocking with [`Self::join`], polled with
/// [`Self::try_join`], or awaited, since the handle is a [`Future`].
///
/// Dropping the handle does not cancel the task.
#[must_use = "dropping the handle discards the task's result"]
pub struct TaskHandle<R> {
    /// `None` once the result has been handed out.
    rx: Option<oneshot::Receiver<Result<R>>>,
}

impl<R> TaskHandle<R> {
    /// Blocks the calling thread until the task finishes.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerFault`] if the task panicked.
    /// - [`Error::Cancelled`] if the task was discarded before it ran.
    pub fn join(self) -> Result<R> {
        futures::executor::block_on(self)
    }

    /// Returns the result if the task has already finished.
    ///
    /// Returns `None` while the task is queued or running. Once a result has
    /// been returned, later calls report [`Error::AlreadyJoined`].
    pub fn try_join(&mut self) -> Option<Result<R>> {
        let Some(rx) = self.rx.as_mut() else {
            return Some(Err(Error::AlreadyJoined));
        };
        let result = match rx.try_recv() {
            Ok(Some(result)) => result,
            Ok(None) => return None,
            Err(oneshot::Canceled) => Err(Error::Cancelled),
        };
        self.rx = None;
        Some(result)
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(Error::AlreadyJoined));
        };
        let result =
            ready!(Pin::new(rx).poll(cx)).unwrap_or_else(|oneshot::Canceled| Err(Error::Cancelled));
        self.rx = None;
        Poll::Ready(result)
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
