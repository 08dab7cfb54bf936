use crate::{Error, Result};
use core::time::Duration;

/// Sizing and behaviour of a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers kept alive while idle (unless `allow_core_timeout` is set).
    pub core_size: usize,

    /// Hard ceiling on live workers.
    pub max_size: usize,

    /// How long an idle worker above the core size waits for work before it
    /// retires.
    pub keep_alive: Duration,

    /// Capacity of the task queue used once every worker is busy.
    pub queue_capacity: usize,

    /// Lets idle core workers retire after `keep_alive` as well.
    pub allow_core_timeout: bool,

    /// Spawn `core_size` workers when the pool is built.
    pub prestart: bool,

    /// Upper bound on how long a submitter may block once the pool is
    /// saturated. `None` blocks until space frees up or the pool shuts down.
    pub admission_timeout: Option<Duration>,

    /// Prefix for worker thread names (`<prefix>-<n>`).
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let max_size = num_cpus::get().max(1);
        Self {
            core_size: 1,
            max_size,
            keep_alive: Duration::from_secs(60),
            queue_capacity: max_size * 64,
            allow_core_timeout: false,
            prestart: false,
            admission_timeout: None,
            thread_name: "corral-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with explicit sizing and defaults elsewhere.
    pub fn new(
        core_size: usize,
        max_size: usize,
        keep_alive: Duration,
        queue_capacity: usize,
    ) -> Self {
        Self {
            core_size,
            max_size,
            keep_alive,
            queue_capacity,
            ..Self::default()
        }
    }

    /// Set the number of core workers.
    pub fn core_size(mut self, n: usize) -> Self {
        self.core_size = n;
        self
    }

    /// Set the maximum number of workers.
    pub fn max_size(mut self, n: usize) -> Self {
        self.max_size = n;
        self
    }

    /// Set the idle keep-alive.
    pub fn keep_alive(mut self, d: Duration) -> Self {
        self.keep_alive = d;
        self
    }

    /// Set the queue capacity.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Allow or forbid idle core workers to retire.
    pub fn allow_core_timeout(mut self, allow: bool) -> Self {
        self.allow_core_timeout = allow;
        self
    }

    /// Spawn the core workers up front.
    pub fn prestart(mut self, prestart: bool) -> Self {
        self.prestart = prestart;
        self
    }

    /// Bound how long a saturated submission may block.
    pub fn admission_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.admission_timeout = timeout;
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.max_size == 0 {
            return invalid("max_size must be at least 1");
        }
        if self.core_size > self.max_size {
            return invalid("core_size must not exceed max_size");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        if self.allow_core_timeout && self.keep_alive.is_zero() {
            return invalid("core workers may only time out with a non-zero keep_alive");
        }
        Ok(())
    }
}
