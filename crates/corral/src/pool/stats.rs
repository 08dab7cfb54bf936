use core::fmt;

/// Lifecycle of a [`WorkerPool`](crate::WorkerPool).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Accepting tasks.
    Running,
    /// Shutdown requested; draining work already admitted, admitting none.
    ShuttingDown,
    /// No live workers and nothing left queued.
    Terminated,
}

impl RunState {
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A point-in-time snapshot of pool activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads.
    pub pool_size: usize,
    /// Workers currently running a task.
    pub active: usize,
    /// The most workers that were ever live at once.
    pub largest_pool_size: usize,
    /// Tasks that finished running, successfully or not.
    pub completed: u64,
    /// Tasks waiting in the bounded queue.
    pub queued: usize,
    pub state: RunState,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pool_size={} active={} largest={} completed={} queued={} state={:?}",
            self.pool_size,
            self.active,
            self.largest_pool_size,
            self.completed,
            self.queued,
            self.state
        )
    }
}
