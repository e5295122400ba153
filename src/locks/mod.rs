mod memory;
mod redis_store;

pub use self::memory::InMemorySlotLockStore;
pub use self::redis_store::RedisSlotLockStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Identifies exactly one bookable slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotLockKey {
    pub tutor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl SlotLockKey {
    pub fn new(tutor_id: Uuid, date: NaiveDate, start_time: NaiveTime) -> Self {
        Self { tutor_id, date, start_time }
    }

    pub fn storage_key(&self) -> String {
        format!("slot_lock:{}", self)
    }
}

impl fmt::Display for SlotLockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tutor_id, self.date, self.start_time.format("%H:%M"))
    }
}

/// Who holds a lock and since when (unix seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHolder {
    pub requester_id: Uuid,
    pub acquired_at: i64,
}

impl LockHolder {
    pub fn now(requester_id: Uuid) -> Self {
        Self {
            requester_id,
            acquired_at: Utc::now().timestamp(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.requester_id, self.acquired_at)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (id, ts) = raw.split_once('|')?;
        Some(Self {
            requester_id: Uuid::parse_str(id).ok()?,
            acquired_at: ts.parse().ok()?,
        })
    }
}

/// An atomic set-if-absent store with absolute expiry.
#[async_trait]
pub trait SlotLockStore: Send + Sync {
    /// Writes the holder only if the key is absent. Returns whether it was written.
    async fn acquire(&self, key: &SlotLockKey, holder: LockHolder, ttl: Duration) -> Result<bool>;

    /// Deletes the key unconditionally.
    async fn release(&self, key: &SlotLockKey) -> Result<()>;

    /// Whether the key is currently held by `requester_id`.
    async fn verify_held_by(&self, key: &SlotLockKey, requester_id: Uuid) -> Result<bool>;
}

/// Front door to the lock store used by the booking and lifecycle services.
///
/// A lock only narrows the race between concurrent attempts on the same key;
/// the overlap check inside the booking transaction stays authoritative.
#[derive(Clone)]
pub struct SlotLockManager {
    store: Arc<dyn SlotLockStore>,
    ttl: Duration,
}

impl SlotLockManager {
    pub fn new(store: Arc<dyn SlotLockStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Tries to take exclusive booking rights on the slot.
    pub async fn acquire(&self, key: &SlotLockKey, requester_id: Uuid) -> Result<bool> {
        let acquired = self
            .store
            .acquire(key, LockHolder::now(requester_id), self.ttl)
            .await?;
        tracing::debug!(slot = %key, requester = %requester_id, acquired, "slot lock acquire");
        Ok(acquired)
    }

    /// Acquires the slot or fails with a conflict. The returned guard releases
    /// the lock unless it is handed off with [`SlotLockGuard::keep`].
    pub async fn lock(&self, key: SlotLockKey, requester_id: Uuid) -> Result<SlotLockGuard> {
        if !self.acquire(&key, requester_id).await? {
            return Err(AppError::Conflict(
                "This slot is currently being booked by someone else".to_string(),
            ));
        }
        Ok(SlotLockGuard {
            manager: self.clone(),
            key: Some(key),
        })
    }

    pub async fn release(&self, key: &SlotLockKey) -> Result<()> {
        self.store.release(key).await?;
        tracing::debug!(slot = %key, "slot lock released");
        Ok(())
    }

    /// Releases and logs instead of failing; used on cleanup paths.
    pub async fn release_quietly(&self, key: &SlotLockKey) {
        if let Err(e) = self.release(key).await {
            tracing::warn!(slot = %key, error = %e, "failed to release slot lock; it will expire");
        }
    }

    pub async fn verify_held_by(&self, key: &SlotLockKey, requester_id: Uuid) -> Result<bool> {
        self.store.verify_held_by(key, requester_id).await
    }
}

/// A held slot lock.
///
/// Call [`release`](Self::release) on every exit path or [`keep`](Self::keep)
/// to leave the lock in place until it expires or is released elsewhere. A
/// guard dropped without either releases in the background.
pub struct SlotLockGuard {
    manager: SlotLockManager,
    key: Option<SlotLockKey>,
}

impl SlotLockGuard {
    pub fn key(&self) -> Option<&SlotLockKey> {
        self.key.as_ref()
    }

    pub async fn release(mut self) {
        if let Some(key) = self.key.take() {
            self.manager.release_quietly(&key).await;
        }
    }

    /// Leaves the lock held; returns its key.
    pub fn keep(mut self) -> Option<SlotLockKey> {
        self.key.take()
    }
}

impl Drop for SlotLockGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let manager = self.manager.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { manager.release_quietly(&key).await });
            }
            Err(_) => {
                tracing::warn!(slot = %key, "slot lock guard dropped outside a runtime; lock will expire");
            }
        }
    }
}
