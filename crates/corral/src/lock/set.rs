use crate::{LockFailure, LockRegistry, ResourceGuard};
use core::{fmt::Debug, hash::Hash, time::Duration};
use std::{collections::HashSet, sync::Arc};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// The order in which a transaction requests its locks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AcquireOrder {
    /// Ascending key order. Every transaction requests overlapping resources
    /// in the same global order, so no cycle of waiters can form.
    #[default]
    Canonical,
    /// The caller's enumeration order, duplicates removed.
    ///
    /// Two transactions over overlapping keys can each hold what the other
    /// needs. Exists only to reproduce that circular wait; production code
    /// should always use [`AcquireOrder::Canonical`].
    AsGiven,
}

impl AcquireOrder {
    /// Deduplicates `keys` and arranges them in this acquisition order.
    pub fn arrange<K>(self, keys: impl IntoIterator<Item = K>) -> Vec<K>
    where
        K: Ord + Hash + Clone,
    {
        match self {
            Self::Canonical => {
                let mut keys: Vec<K> = keys.into_iter().collect();
                keys.sort_unstable();
                keys.dedup();
                keys
            }
            Self::AsGiven => {
                let mut seen = HashSet::new();
                keys.into_iter()
                    .filter(|key| seen.insert(key.clone()))
                    .collect()
            }
        }
    }
}

/// A deadlock-avoiding manager for compound, multi-resource operations.
///
/// [`OrderedLockSet::with_locks`] atomically acquires the locks for a set of
/// resource keys, runs the caller's body exactly once, and releases every
/// lock on the way out. Acquisition is all-or-nothing: if any member times
/// out, the members already taken are released in reverse order and the body
/// never runs.
///
/// # Example
///
/// ```
/// use corral::OrderedLockSet;
/// use std::time::Duration;
///
/// let locks = OrderedLockSet::<&str>::new();
/// let total = locks
///     .with_locks(["item7", "item2", "item4"], Duration::from_secs(1), || 3)
///     .unwrap();
///
/// assert_eq!(total, 3);
/// assert_eq!(locks.registry().held_count(), 0);
/// ```
pub struct OrderedLockSet<K> {
    registry: Arc<LockRegistry<K>>,
}

impl<K> OrderedLockSet<K>
where
    K: Ord + Hash + Clone + Debug,
{
    /// Creates a lock set backed by its own, empty registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(LockRegistry::new()))
    }

    /// Creates a lock set over a shared registry.
    pub const fn with_registry(registry: Arc<LockRegistry<K>>) -> Self {
        Self { registry }
    }

    /// The registry holding the per-resource locks.
    pub fn registry(&self) -> &LockRegistry<K> {
        &self.registry
    }

    /// Locks every key in canonical order, runs `body`, then releases.
    ///
    /// `timeout` bounds the wait for *each* lock. Duplicate keys are removed
    /// before acquisition. The locks are released in reverse acquisition
    /// order on every exit path, including a panic inside `body`.
    ///
    /// # Errors
    ///
    /// Returns [`LockFailure`] if any lock could not be acquired in time.
    /// Nothing is retried; the caller owns the retry policy.
    pub fn with_locks<I, F, R>(&self, keys: I, timeout: Duration, body: F) -> Result<R, LockFailure>
    where
        I: IntoIterator<Item = K>,
        F: FnOnce() -> R,
    {
        self.with_locks_ordered(keys, timeout, AcquireOrder::Canonical, body)
    }

    /// Like [`Self::with_locks`], with an explicit [`AcquireOrder`].
    ///
    /// # Errors
    ///
    /// Returns [`LockFailure`] if any lock could not be acquired in time.
    pub fn with_locks_ordered<I, F, R>(
        &self,
        keys: I,
        timeout: Duration,
        order: AcquireOrder,
        body: F,
    ) -> Result<R, LockFailure>
    where
        I: IntoIterator<Item = K>,
        F: FnOnce() -> R,
    {
        let held = self.lock_all(keys, timeout, order)?;
        let result = body();
        drop(held);
        Ok(result)
    }

    /// Acquires every key and returns the held set.
    ///
    /// The locks stay held until the returned [`HeldLocks`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LockFailure`] after rolling back if any lock could not be
    /// acquired in time.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, keys)))]
    pub fn lock_all<I>(
        &self,
        keys: I,
        timeout: Duration,
        order: AcquireOrder,
    ) -> Result<HeldLocks<'_, K>, LockFailure>
    where
        I: IntoIterator<Item = K>,
    {
        let keys = order.arrange(keys);
        let mut held = HeldLocks {
            registry: &self.registry,
            guards: Vec::with_capacity(keys.len()),
        };

        for (position, key) in keys.into_iter().enumerate() {
            let lock = self.registry.checkout(&key);
            match lock.acquire(timeout) {
                Ok(guard) => {
                    self.registry.checkin(&key, lock);
                    held.guards.push((key, guard));
                }
                Err(source) => {
                    self.registry.checkin(&key, lock);
                    let rolled_back = held.len();
                    drop(held);

                    #[cfg(feature = "tracing")]
                    tracing::debug!(?key, position, rolled_back, "lock set acquisition failed");

                    return Err(LockFailure {
                        key: format!("{key:?}"),
                        position,
                        rolled_back,
                        source,
                    });
                }
            }
        }

        Ok(held)
    }
}

impl<K> Default for OrderedLockSet<K>
where
    K: Ord + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for OrderedLockSet<K> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K: Debug> Debug for OrderedLockSet<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OrderedLockSet")
            .field("registry", &self.registry)
            .finish()
    }
}

/// The locks held by one transaction, in acquisition order.
///
/// Dropping it releases every lock in reverse acquisition order.
#[must_use = "the locks are released as soon as the set is dropped"]
pub struct HeldLocks<'a, K>
where
    K: Eq + Hash + Clone + Debug,
{
    registry: &'a LockRegistry<K>,
    guards: Vec<(K, ResourceGuard)>,
}

impl<K> HeldLocks<'_, K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// The held keys, in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.guards.iter().map(|(key, _)| key)
    }

    /// Number of locks held.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Returns `true` if no locks are held.
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl<K> Drop for HeldLocks<'_, K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        while let Some((key, guard)) = self.guards.pop() {
            let handle = Arc::clone(guard.handle());
            drop(guard);
            self.registry.checkin(&key, handle);
        }
    }
}
