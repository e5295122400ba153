use tokio_postgres::{GenericClient, Row};
use uuid::Uuid;

use crate::{
    db::column,
    error::Result,
    models::purchase::{Purchase, PurchaseUpdate},
};

const PURCHASE_COLUMNS: &str = r#"
    id, payer_id, session_id, category, amount_cents, original_amount_cents,
    order_number, payment_status, transaction_ref, paid_at, created_at
"#;

fn row_to_purchase(row: &Row) -> Result<Purchase> {
    Ok(Purchase {
        id: column(row, "id")?,
        payer_id: column(row, "payer_id")?,
        session_id: column(row, "session_id")?,
        category: column(row, "category")?,
        amount_cents: column(row, "amount_cents")?,
        original_amount_cents: column(row, "original_amount_cents")?,
        order_number: column(row, "order_number")?,
        payment_status: column(row, "payment_status")?,
        transaction_ref: column(row, "transaction_ref")?,
        paid_at: column(row, "paid_at")?,
        created_at: column(row, "created_at")?,
    })
}

/// Inserts a purchase row.
///
/// # Arguments
///
/// * `client` - The client or open transaction to write with.
/// * `purchase` - The purchase to store; its order number must be unique.
///
/// # Returns
///
/// A `Result` containing the stored `Purchase`.
pub async fn insert<C: GenericClient + Sync>(client: &C, purchase: &Purchase) -> Result<Purchase> {
    let row = client
        .query_one(
            &*format!(
                r#"
                INSERT INTO purchases (
                    id, payer_id, session_id, category, amount_cents, original_amount_cents,
                    order_number, payment_status, transaction_ref, paid_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {PURCHASE_COLUMNS}
                "#
            ),
            &[
                &purchase.id,
                &purchase.payer_id,
                &purchase.session_id,
                &purchase.category,
                &purchase.amount_cents,
                &purchase.original_amount_cents,
                &purchase.order_number,
                &purchase.payment_status,
                &purchase.transaction_ref,
                &purchase.paid_at,
                &purchase.created_at,
            ],
        )
        .await?;
    row_to_purchase(&row)
}

/// Finds a purchase by its ID.
pub async fn find_by_id<C: GenericClient + Sync>(client: &C, purchase_id: &Uuid) -> Result<Option<Purchase>> {
    let row = client
        .query_opt(
            &*format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1"),
            &[purchase_id],
        )
        .await?;
    row.map(|r| row_to_purchase(&r)).transpose()
}

/// Applies a settlement if the stored status still matches. Returns rows updated.
pub async fn update_status_if<C: GenericClient + Sync>(client: &C, update: &PurchaseUpdate) -> Result<u64> {
    let updated = client
        .execute(
            r#"
            UPDATE purchases
            SET payment_status = $3, transaction_ref = $4, paid_at = $5
            WHERE id = $1 AND payment_status = $2
            "#,
            &[
                &update.purchase_id,
                &update.expected_status,
                &update.new_status,
                &update.transaction_ref,
                &update.paid_at,
            ],
        )
        .await?;
    Ok(updated)
}
