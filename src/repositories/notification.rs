use tokio_postgres::GenericClient;
use uuid::Uuid;

use crate::error::Result;

/// Stores an in-app notification.
pub async fn insert<C: GenericClient + Sync>(
    client: &C,
    account_id: &Uuid,
    title: &str,
    body: &str,
    kind: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    client
        .execute(
            r#"
            INSERT INTO notifications (id, account_id, title, body, kind)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            &[&id, account_id, &title, &body, &kind],
        )
        .await?;
    Ok(id)
}
