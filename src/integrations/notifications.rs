use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::Result;
use crate::repositories::notification as notification_repo;
use crate::scheduling::effects::NotificationKind;

/// Delivers in-app notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, account_id: Uuid, title: &str, body: &str, kind: NotificationKind) -> Result<()>;
}

/// Writes notifications to the `notifications` table the clients poll.
#[derive(Clone)]
pub struct PgNotifier {
    pool: Pool,
}

impl PgNotifier {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self, account_id: Uuid, title: &str, body: &str, kind: NotificationKind) -> Result<()> {
        let client = self.pool.get().await?;
        let id = notification_repo::insert(&**client, &account_id, title, body, kind.as_str()).await?;
        tracing::debug!(notification = %id, account = %account_id, kind = kind.as_str(), "notification stored");
        Ok(())
    }
}
