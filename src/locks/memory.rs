use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::{LockHolder, SlotLockKey, SlotLockStore};
use crate::error::Result;

const STRIPES: usize = 16;

struct Entry {
    holder: LockHolder,
    expires_at: Instant,
}

/// Single-node lock store: a striped map of mutexes with lazy expiry.
pub struct InMemorySlotLockStore {
    stripes: Vec<Mutex<HashMap<SlotLockKey, Entry>>>,
}

impl InMemorySlotLockStore {
    pub fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn stripe(&self, key: &SlotLockKey) -> MutexGuard<'_, HashMap<SlotLockKey, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % STRIPES;
        // Entries are plain data, a poisoned stripe is still consistent.
        self.stripes[index].lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drops expired entries from every stripe; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.stripes
            .iter()
            .map(|stripe| {
                let mut map = stripe.lock().unwrap_or_else(|e| e.into_inner());
                let before = map.len();
                map.retain(|_, entry| entry.expires_at > now);
                before - map.len()
            })
            .sum()
    }
}

impl Default for InMemorySlotLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SlotLockStore for InMemorySlotLockStore {
    async fn acquire(&self, key: &SlotLockKey, holder: LockHolder, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.stripe(key);

        if map.get(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }

        map.insert(
            key.clone(),
            Entry {
                holder,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &SlotLockKey) -> Result<()> {
        self.stripe(key).remove(key);
        Ok(())
    }

    async fn verify_held_by(&self, key: &SlotLockKey, requester_id: Uuid) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .stripe(key)
            .get(key)
            .is_some_and(|entry| entry.expires_at > now && entry.holder.requester_id == requester_id))
    }
}
