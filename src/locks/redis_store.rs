use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{LockHolder, SlotLockKey, SlotLockStore};
use crate::error::Result;

/// Slot locks in Redis: `SET key holder NX PX ttl`, shared by every node.
#[derive(Clone)]
pub struct RedisSlotLockStore {
    redis: ConnectionManager,
}

impl RedisSlotLockStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SlotLockStore for RedisSlotLockStore {
    async fn acquire(&self, key: &SlotLockKey, holder: LockHolder, ttl: Duration) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key.storage_key())
            .arg(holder.encode())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &SlotLockKey) -> Result<()> {
        let _: () = self.redis.clone().del(key.storage_key()).await?;
        Ok(())
    }

    async fn verify_held_by(&self, key: &SlotLockKey, requester_id: Uuid) -> Result<bool> {
        let raw: Option<String> = self.redis.clone().get(key.storage_key()).await?;
        Ok(raw
            .as_deref()
            .and_then(LockHolder::decode)
            .is_some_and(|holder| holder.requester_id == requester_id))
    }
}
