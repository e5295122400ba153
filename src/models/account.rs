use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role an account acts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "account_role")]
pub enum AccountRole {
    #[postgres(name = "student")]
    Student,
    #[postgres(name = "tutor")]
    Tutor,
    #[postgres(name = "admin")]
    Admin,
}

/// Profile projection of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: AccountRole,
}

/// Tutor details needed to price and label sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tutor {
    /// The tutor's account id; sessions reference this.
    pub account_id: Uuid,
    pub display_name: String,
    /// Hourly rate in cents.
    pub hourly_rate_cents: i64,
}
