use std::collections::{VecDeque, vec_deque::Drain};

/// The admission predicate applied by [`BoundedTaskQueue::offer`].
///
/// A task is buffered only when nothing is queued yet. While anything is
/// waiting, offers are refused even if capacity remains, which tells the
/// owning pool to grow another worker instead of building a backlog.
#[inline]
pub const fn admits_offer(queued: usize) -> bool {
    queued == 0
}

/// A fixed-capacity FIFO whose `offer` refuses tasks whenever it is
/// non-empty.
///
/// Two insertion paths exist:
///
/// - [`offer`](Self::offer) applies [`admits_offer`]. The pool calls it
///   before it knows the queue is needed, so a refusal is a signal to grow
///   or to escalate to the admission controller.
/// - [`put`](Self::put) bypasses the predicate and only respects capacity.
///   The admission controller uses it once the pool is at its worker ceiling.
///
/// The queue itself does not block; the pool wraps it in its own lock and
/// condition variables to provide blocking `put` and `take`.
///
/// # Example
///
/// ```
/// use corral::BoundedTaskQueue;
///
/// let mut queue = BoundedTaskQueue::new(10);
/// assert!(queue.offer("first").is_ok());
/// assert_eq!(queue.offer("second"), Err("second"));
/// assert!(queue.put("second").is_ok());
/// assert_eq!(queue.poll(), Some("first"));
/// ```
#[derive(Debug)]
pub struct BoundedTaskQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedTaskQueue<T> {
    /// Creates an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Buffers `item` only if the queue is currently empty.
    ///
    /// # Errors
    ///
    /// Hands `item` back, without touching the queue, when anything is
    /// already queued or the queue has no capacity.
    pub fn offer(&mut self, item: T) -> Result<(), T> {
        if admits_offer(self.items.len()) && !self.is_full() {
            self.items.push_back(item);
            Ok(())
        } else {
            Err(item)
        }
    }

    /// Buffers `item` if there is room, ignoring the admission predicate.
    ///
    /// # Errors
    ///
    /// Hands `item` back when the queue is full.
    pub fn put(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            Err(item)
        } else {
            self.items.push_back(item);
            Ok(())
        }
    }

    /// Removes the oldest task.
    pub fn poll(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Removes every queued task, oldest first.
    pub fn drain(&mut self) -> Drain<'_, T> {
        self.items.drain(..)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` once the queue holds `capacity` tasks. Only blocking
    /// puts can get it there, since [`Self::offer`] needs an empty queue.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// The fixed bound given at construction.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks that can still be put before the queue is full.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }
}
