//! Keyed async mutexes
//!
//! Allocation serializes on worker ids and job ids. Each key maps to its own
//! `tokio::sync::Mutex`, created on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Guards held for the duration of one critical section
pub type KeyGuards = Vec<OwnedMutexGuard<()>>;

/// Map from key to an async mutex
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Lock a single key
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }

    /// Lock several keys in sorted order, skipping duplicates
    ///
    /// Every caller acquires in the same order, so two callers locking
    /// overlapping sets cannot deadlock.
    pub async fn lock_all<'a, I>(&self, keys: I) -> KeyGuards
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys: Vec<&str> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Drop entries nobody is holding or waiting on
    pub fn prune(&self) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - map.len()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
