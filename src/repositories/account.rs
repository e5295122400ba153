use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::{
    db::column,
    error::Result,
    models::account::{Account, Tutor},
};

/// Finds the tutor profile for an account.
pub async fn find_tutor_by_account_id<C: GenericClient + Sync>(client: &C, account_id: &Uuid) -> Result<Option<Tutor>> {
    let row = client
        .query_opt(
            r#"
            SELECT t.account_id, t.display_name, t.hourly_rate_cents
            FROM tutors t
            WHERE t.account_id = $1
            "#,
            &[account_id],
        )
        .await?;
    row.map(|r| {
        Ok(Tutor {
            account_id: column(&r, "account_id")?,
            display_name: column(&r, "display_name")?,
            hourly_rate_cents: column(&r, "hourly_rate_cents")?,
        })
    })
    .transpose()
}

/// Finds an account by its ID.
///
/// # Arguments
///
/// * `client` - The client to query with.
/// * `account_id` - The ID of the account.
///
/// # Returns
///
/// A `Result` containing the `Account`, or `None` when it does not exist.
pub async fn find_account_by_id<C: GenericClient + Sync>(client: &C, account_id: &Uuid) -> Result<Option<Account>> {
    let row = client
        .query_opt(
            "SELECT id, name, email, role FROM accounts WHERE id = $1",
            &[account_id],
        )
        .await?;
    row.map(|r| {
        Ok(Account {
            id: column(&r, "id")?,
            name: column(&r, "name")?,
            email: column(&r, "email")?,
            role: column(&r, "role")?,
        })
    })
    .transpose()
}
