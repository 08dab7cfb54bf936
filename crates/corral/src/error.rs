//! Error types for the worker pool and the lock manager.
//!
//! This module defines the central [`Error`] enum returned by the pool, and
//! the two lock errors ([`LockTimeout`], [`LockFailure`]) returned by
//! [`ResourceLock`] and [`OrderedLockSet`].
//!
//! ## Error Cases
//! - `Rejected`: A task arrived while the pool was shutting down, or the
//!   submitter waited longer than the configured admission timeout.
//! - `WorkerFault`: The task panicked. The panic is confined to that task's
//!   handle and the worker that ran it is replaced.
//! - `Cancelled`: The task was queued but discarded by a forced shutdown.
//! - `AlreadyJoined`: The handle's result was already taken.
//! - `Spawn`: The OS refused to start a worker thread.
//! - `InvalidConfig`: The pool sizing parameters are inconsistent.
//!
//! [`ResourceLock`]: crate::ResourceLock
//! [`OrderedLockSet`]: crate::OrderedLockSet

use core::{fmt, time::Duration};

/// A result type defaulting to the pool's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for [`WorkerPool`](crate::WorkerPool) operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The pool refused the task. The queue and the worker count are left
    /// exactly as they were before the submission.
    #[error("Task rejected: {0}")]
    Rejected(Rejection),

    /// The task panicked while running on a worker.
    #[error("Worker fault: {message}")]
    WorkerFault { message: String },

    /// The task was discarded before it ran.
    #[error("Task cancelled before it ran")]
    Cancelled,

    /// The result was already taken from this handle.
    #[error("Task result already taken")]
    AlreadyJoined,

    /// A worker thread could not be started.
    #[error("Failed to spawn worker thread")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    /// The pool configuration is inconsistent.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Returns `true` if the pool rejected the task at admission time.
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Why a task was rejected at admission time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The pool is shutting down or has terminated.
    Shutdown,
    /// The pool stayed saturated for longer than the admission timeout.
    AdmissionTimeout(Duration),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "pool is shut down"),
            Self::AdmissionTimeout(waited) => {
                write!(f, "pool saturated for {waited:?}, admission timed out")
            }
        }
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// A single resource lock could not be acquired within the allotted wait.
///
/// When this is returned, the waiter has already been removed from the
/// lock's wait queue.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("Timed out after {waited:?} waiting for lock on `{key}`")]
pub struct LockTimeout {
    /// The resource key, rendered with its `Debug` representation.
    pub key: String,
    /// How long the caller waited.
    pub waited: Duration,
}

/// A member acquisition inside [`OrderedLockSet`](crate::OrderedLockSet)
/// failed.
///
/// Every lock the transaction had already taken was released, in reverse
/// order, before this error was returned. The body never ran.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("Could not lock `{key}` (position {position} in acquisition order); rolled back {rolled_back} lock(s)")]
pub struct LockFailure {
    /// The key that could not be locked.
    pub key: String,
    /// Zero-based index of `key` in the acquisition order.
    pub position: usize,
    /// Number of locks released during rollback.
    pub rolled_back: usize,
    /// The underlying timeout.
    #[source]
    pub source: LockTimeout,
}
