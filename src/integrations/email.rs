use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::scheduling::effects::EmailTemplate;

/// Redis list the mail worker drains.
pub const EMAIL_OUTBOX_KEY: &str = "email_outbox";

/// Sends templated emails about a session.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, account_id: Uuid, session_id: Uuid, template: &EmailTemplate) -> Result<()>;
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    account_id: Uuid,
    session_id: Uuid,
    #[serde(flatten)]
    template: &'a EmailTemplate,
    queued_at: DateTime<Utc>,
}

/// Queues emails on a Redis list; rendering and delivery happen elsewhere.
#[derive(Clone)]
pub struct RedisOutboxMailer {
    redis: ConnectionManager,
}

impl RedisOutboxMailer {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl Mailer for RedisOutboxMailer {
    async fn send(&self, account_id: Uuid, session_id: Uuid, template: &EmailTemplate) -> Result<()> {
        let entry = OutboxEntry {
            account_id,
            session_id,
            template,
            queued_at: Utc::now(),
        };
        let payload = sonic_rs::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("Failed to encode email: {}", e)))?;

        let mut conn = self.redis.clone();
        let _: () = conn.lpush(EMAIL_OUTBOX_KEY, payload).await?;
        Ok(())
    }
}
