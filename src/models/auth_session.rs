use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::account::AccountRole;

/// An authenticated request context, stored in Redis by the account service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// The account this session belongs to.
    pub account_id: Uuid,
    /// The role the account signed in with.
    pub role: AccountRole,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }
}
