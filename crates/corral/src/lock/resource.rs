use crate::LockTimeout;
use core::{marker::PhantomData, time::Duration};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    fmt,
    sync::Arc,
    thread::{self, ThreadId},
    time::Instant,
};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// A re-entrant, exclusive lock guarding a single named resource.
///
/// Ownership belongs to the acquiring thread. The owner may acquire the lock
/// again without blocking; each acquisition returns its own
/// [`ResourceGuard`] and the lock is only relinquished once every guard has
/// been dropped.
///
/// Contended waiters are served in arrival order. A waiter whose timeout
/// elapses removes itself from the wait queue before returning, so a failed
/// acquisition leaves no trace on the lock.
///
/// # Example
///
/// ```
/// use corral::ResourceLock;
/// use std::{sync::Arc, time::Duration};
///
/// let lock = Arc::new(ResourceLock::new("item0"));
/// let outer = lock.acquire(Duration::from_millis(10)).unwrap();
/// let inner = lock.acquire(Duration::from_millis(10)).unwrap();
/// assert_eq!(lock.hold_count(), 2);
///
/// drop(inner);
/// drop(outer);
/// assert!(!lock.is_locked());
/// ```
pub struct ResourceLock {
    key: String,
    state: Mutex<LockState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    holds: usize,
    waiters: VecDeque<u64>,
    next_ticket: u64,
}

impl LockState {
    const fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    fn claim(&mut self, owner: ThreadId) {
        debug_assert!(self.owner.is_none() && self.holds == 0);
        self.owner = Some(owner);
        self.holds = 1;
    }
}

impl ResourceLock {
    /// Creates an unlocked resource lock.
    ///
    /// `key` is only used to label timeouts and debug output.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    /// The label this lock was created with.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquires the lock, blocking the calling thread for at most `timeout`.
    ///
    /// If the calling thread already owns the lock this returns immediately
    /// and increments the hold count.
    ///
    /// # Errors
    ///
    /// Returns [`LockTimeout`] if the lock did not become available in time.
    /// The waiter is deregistered before the error is returned.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(key = %self.key)))]
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<ResourceGuard, LockTimeout> {
        let me = thread::current().id();
        let started = Instant::now();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.holds += 1;
            return Ok(ResourceGuard::new(Arc::clone(self)));
        }
        if state.is_free() && state.waiters.is_empty() {
            state.claim(me);
            return Ok(ResourceGuard::new(Arc::clone(self)));
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.waiters.push_back(ticket);
        // `None` means the timeout is too large to represent; wait forever.
        let deadline = started.checked_add(timeout);

        loop {
            if state.is_free() && state.waiters.front() == Some(&ticket) {
                state.waiters.pop_front();
                state.claim(me);
                return Ok(ResourceGuard::new(Arc::clone(self)));
            }

            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.released.wait(&mut state);
                    false
                }
            };

            if timed_out {
                if state.is_free() && state.waiters.front() == Some(&ticket) {
                    state.waiters.pop_front();
                    state.claim(me);
                    return Ok(ResourceGuard::new(Arc::clone(self)));
                }

                let was_front = state.waiters.front() == Some(&ticket);
                state.waiters.retain(|&t| t != ticket);
                if was_front && state.is_free() {
                    // The next waiter may have been parked behind us.
                    self.released.notify_all();
                }

                #[cfg(feature = "tracing")]
                tracing::debug!(key = %self.key, ?timeout, "lock acquisition timed out");

                return Err(LockTimeout {
                    key: self.key.clone(),
                    waited: started.elapsed(),
                });
            }
        }
    }

    /// Acquires the lock only if it can be done without waiting.
    ///
    /// Succeeds when the calling thread already owns the lock, or when the
    /// lock is free and nobody is queued for it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ResourceGuard> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.holds += 1;
        } else if state.is_free() && state.waiters.is_empty() {
            state.claim(me);
        } else {
            return None;
        }
        Some(ResourceGuard::new(Arc::clone(self)))
    }

    /// Returns `true` if any thread owns the lock.
    pub fn is_locked(&self) -> bool {
        !self.state.lock().is_free()
    }

    /// Returns `true` if the calling thread owns the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Number of outstanding guards held by the calling thread.
    pub fn hold_count(&self) -> usize {
        let state = self.state.lock();
        if state.owner == Some(thread::current().id()) {
            state.holds
        } else {
            0
        }
    }

    /// Number of threads currently queued for the lock.
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            if !state.waiters.is_empty() {
                // Waiters poll for their own ticket at the head of the queue.
                self.released.notify_all();
            }
        }
    }
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceLock")
            .field("key", &self.key)
            .field("owner", &state.owner)
            .field("holds", &state.holds)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// Proof of one acquisition of a [`ResourceLock`].
///
/// Dropping the guard releases that acquisition. Guards are tied to the
/// thread that acquired them and cannot be sent elsewhere.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ResourceGuard {
    lock: Arc<ResourceLock>,
    _not_send: PhantomData<*const ()>,
}

impl ResourceGuard {
    fn new(lock: Arc<ResourceLock>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// The lock this guard holds.
    pub fn lock(&self) -> &ResourceLock {
        &self.lock
    }

    pub(crate) const fn handle(&self) -> &Arc<ResourceLock> {
        &self.lock
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceGuard").field(&self.lock.key).finish()
    }
}
