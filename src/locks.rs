//! Per-key async mutexes.
//!
//! Every read-modify-write of an availability row runs under the lock for its
//! [`AvailabilityKey`](crate::models::AvailabilityKey); reservation passes also
//! hold the lock for their production order. Guards are owned so they can be
//! held across `.await` points.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots<K> = DashMap<K, Arc<Mutex<()>>>;

/// A registry of mutexes keyed by `K`. Slots are created on first lock and
/// dropped once the last guard or waiter for the key goes away.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    slots: Arc<Slots<K>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }
}

/// Exclusive access to one key. Releasing it prunes the key's slot when
/// nobody else is queued on it.
#[derive(Debug)]
pub struct KeyGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    slots: Arc<Slots<K>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // The guard holds its own reference to the mutex; let it go first.
        self.guard.take();
        // `remove_if` runs under the shard lock, so no new waiter can clone
        // the slot between the count check and the removal.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

impl<K: Eq + Hash + Clone + Ord> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let guard = self.slot(key).lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key: key.clone(),
            slots: self.slots.clone(),
        }
    }

    /// Locks several keys in ascending order so that two callers asking for
    /// overlapping sets cannot deadlock. Duplicate keys are locked once.
    pub async fn lock_many(&self, keys: &[K]) -> Vec<KeyGuard<K>> {
        let mut ordered: Vec<&K> = keys.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_locker_waits_for_release() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let guard = locks.lock(&1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender acquires after release")
            .unwrap();
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = KeyedLocks::<u32>::new();
        let _a = locks.lock(&1).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&2))
            .await
            .expect("other key is free");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn lock_many_deduplicates() {
        let locks = KeyedLocks::<u32>::new();
        let guards = locks.lock_many(&[3, 1, 3]).await;
        assert_eq!(guards.len(), 2);
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let locks = KeyedLocks::<u32>::new();
        for key in 0..10_000 {
            let _guard = locks.lock(&key).await;
        }
        assert!(locks.is_empty());

        let guards = locks.lock_many(&[7, 8, 9]).await;
        assert_eq!(locks.len(), 3);
        drop(guards);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn slot_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let guard = locks.lock(&1).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&1).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(locks.len(), 1);

        let seen_by_waiter = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter acquires after release")
            .unwrap();
        assert_eq!(seen_by_waiter, 1);
        assert!(locks.is_empty());
    }
}
