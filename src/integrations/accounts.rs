use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::account::{Account, Tutor};
use crate::repositories::account as account_repo;

/// Read access to account and tutor profiles.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_tutor(&self, account_id: Uuid) -> Result<Option<Tutor>>;

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>>;
}

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: Pool,
}

impl PgAccountDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn find_tutor(&self, account_id: Uuid) -> Result<Option<Tutor>> {
        let client = self.pool.get().await?;
        account_repo::find_tutor_by_account_id(&**client, &account_id).await
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        let client = self.pool.get().await?;
        account_repo::find_account_by_id(&**client, &account_id).await
    }
}
