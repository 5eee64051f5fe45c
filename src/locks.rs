use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type EntityKey = (String, String);

/// In-process mutual exclusion keyed by `(entity_type, entity_id)`.
///
/// Entries are created on first use and dropped when the last holder or
/// waiter lets go, so the map only holds entities that are in flight.
#[derive(Default)]
pub struct EntityLocks {
    locks: Arc<DashMap<EntityKey, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one entity.
    ///
    /// If the returned future is dropped while still waiting, the map entry
    /// is cleaned up the same way a released guard cleans it up.
    pub async fn lock(&self, entity_type: &str, entity_id: &str) -> EntityGuard {
        let key = (entity_type.to_string(), entity_id.to_string());
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        // Declared before the wait so it drops after the pending lock future.
        let entry = EntryRef {
            locks: self.locks.clone(),
            key,
        };
        let guard = mutex.lock_owned().await;
        EntityGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of entities currently locked or waited on.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

/// Held for the duration of one read-modify-write on an entity.
///
/// Fields drop in order: the mutex is released before the entry is checked.
pub struct EntityGuard {
    _guard: OwnedMutexGuard<()>,
    _entry: EntryRef,
}

/// Removes the map entry once nobody holds or awaits its mutex.
struct EntryRef {
    locks: Arc<DashMap<EntityKey, Arc<Mutex<()>>>>,
    key: EntityKey,
}

impl Drop for EntryRef {
    fn drop(&mut self) {
        // Only the map's own reference left.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
