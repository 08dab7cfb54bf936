use crate::ResourceLock;
use core::{fmt::Debug, hash::Hash};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

/// A table of [`ResourceLock`]s keyed by resource identifier.
///
/// Locks are created lazily on first reference. An entry is reclaimed as soon
/// as the last handle to it is checked back in and no thread holds or awaits
/// the lock, so the table only grows with the number of resources that are
/// *currently* in use.
pub struct LockRegistry<K> {
    locks: Mutex<HashMap<K, Arc<ResourceLock>>>,
}

impl<K> LockRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a handle to the lock for `key`, creating it if needed.
    ///
    /// Every handle obtained here should be returned through
    /// [`Self::checkin`] once the caller no longer needs it, otherwise the
    /// entry is only reclaimed by [`Self::reclaim_idle`].
    pub fn checkout(&self, key: &K) -> Arc<ResourceLock> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(key) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(ResourceLock::new(format!("{key:?}")));
        locks.insert(key.clone(), Arc::clone(&lock));
        lock
    }

    /// Returns a handle obtained from [`Self::checkout`].
    ///
    /// If this was the last outstanding handle and the lock is free, the
    /// entry is removed.
    pub fn checkin(&self, key: &K, handle: Arc<ResourceLock>) {
        let mut locks = self.locks.lock();
        drop(handle);
        // Handles are only cloned out of the table under this mutex, so a
        // count of one cannot race with a concurrent checkout.
        let idle = locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1 && !lock.is_locked());
        if idle {
            locks.remove(key);
        }
    }

    /// Removes every entry that nobody holds, awaits or references.
    ///
    /// Returns the number of entries removed.
    pub fn reclaim_idle(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1 || lock.is_locked());
        before - locks.len()
    }

    /// Returns `true` if the lock for `key` exists and is owned by any thread.
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks.lock().get(key).is_some_and(|lock| lock.is_locked())
    }

    /// Number of resources whose lock is currently owned.
    pub fn held_count(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| lock.is_locked())
            .count()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns `true` if the registry has no live entries.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl<K> Default for LockRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Debug> Debug for LockRegistry<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("locks", &self.locks.lock().len())
            .finish()
    }
}
