use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Idle entries are pruned once the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-key async mutexes.
///
/// Work on the same deal, lead or department is serialised; different keys
/// never contend. Guards are owned so they can be held across `.await`
/// points.
pub struct KeyedLocks<K = Uuid>
where
    K: Eq + Hash,
{
    inner: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        if self.inner.len() > PRUNE_THRESHOLD {
            // Entries only referenced by the map are not held by anyone.
            self.inner.retain(|_, m| Arc::strong_count(m) > 1);
        }
        let mutex = self.inner.entry(key).or_default().clone();
        mutex.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks")
            .field("keys", &self.inner.len())
            .finish()
    }
}
