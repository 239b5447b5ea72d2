use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

#[derive(Default)]
struct KeyLock {
    held: Mutex<bool>,
    cv: Condvar,
}

/// A table of independent locks, one per key. Locks are created on first use and kept
/// for the lifetime of the table.
///
/// Locks are not reentrant: locking a key twice from one thread without unlocking it deadlocks.
pub struct MultiMutex<K> {
    map: Mutex<HashMap<K, Arc<KeyLock>>>,
}

impl<K> Default for MultiMutex<K> {
    fn default() -> Self {
        Self { map: Mutex::new(HashMap::new()) }
    }
}

fn recover<T>(r: Result<T, PoisonError<T>>) -> T {
    r.unwrap_or_else(PoisonError::into_inner)
}

impl<K: Eq + Hash + Clone> MultiMutex<K> {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key_lock(&self, key: &K) -> Arc<KeyLock> {
        let mut map = recover(self.map.lock());
        Arc::clone(map.entry(key.clone()).or_default())
    }

    /// Blocks until the lock of a key is free, then takes it.
    pub fn lock(&self, key: &K) {
        let kl = self.key_lock(key);
        let mut held = recover(kl.held.lock());
        while *held {
            held = recover(kl.cv.wait(held));
        }
        *held = true;
    }

    /// Takes the lock of a key if it is free. Returns `false` if it is held.
    pub fn try_lock(&self, key: &K) -> bool {
        let kl = self.key_lock(key);
        let mut held = recover(kl.held.lock());
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    /// Releases the lock of a key and wakes up one waiter. Unlocking a free key does nothing.
    pub fn unlock(&self, key: &K) {
        let kl = recover(self.map.lock()).get(key).cloned();
        if let Some(kl) = kl {
            let mut held: MutexGuard<bool> = recover(kl.held.lock());
            *held = false;
            kl.cv.notify_one();
        }
    }

    /// Takes the lock of a key and returns a guard that releases it when dropped.
    #[must_use]
    pub fn guard(&self, key: K) -> MultiMutexGuard<'_, K> {
        self.lock(&key);
        MultiMutexGuard { mm: self, key }
    }

    /// Returns `true` if no key is currently locked.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        recover(self.map.lock()).values().all(|kl| !*recover(kl.held.lock()))
    }
}

/// A guard of a single key of a [`MultiMutex`].
pub struct MultiMutexGuard<'a, K: Eq + Hash + Clone> {
    mm: &'a MultiMutex<K>,
    key: K,
}
impl<K: Eq + Hash + Clone> Drop for MultiMutexGuard<'_, K> {
    fn drop(&mut self) {
        self.mm.unlock(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::atomic::{AtomicUsize, Ordering}, thread, time::Duration};

    #[test]
    fn same_key_is_exclusive() {
        let mm = Arc::new(MultiMutex::<i64>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4).map(|_| {
            let mm = Arc::clone(&mm);
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                let _g = mm.guard(42);
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                thread::sleep(Duration::from_millis(10));
                inside.fetch_sub(1, Ordering::SeqCst);
            })
        }).collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(mm.is_idle());
    }

    #[test]
    fn different_keys_are_independent() {
        let mm = MultiMutex::<i64>::new();
        mm.lock(&1);
        assert!(mm.try_lock(&2));
        assert!(!mm.try_lock(&1));
        assert!(!mm.is_idle());
        mm.unlock(&1);
        mm.unlock(&2);
        mm.unlock(&3);
        assert!(mm.is_idle());
    }
}
