use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Settlement state of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "payment_status")]
pub enum PaymentStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "completed")]
    Completed,
    #[postgres(name = "failed")]
    Failed,
    #[postgres(name = "refunded")]
    Refunded,
}

/// What a purchase pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "purchase_category")]
pub enum PurchaseCategory {
    #[postgres(name = "session")]
    Session,
    #[postgres(name = "course")]
    Course,
}

/// The payment record for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: Uuid,
    pub payer_id: Uuid,
    pub session_id: Option<Uuid>,
    pub category: PurchaseCategory,
    /// Amount charged in cents.
    pub amount_cents: i64,
    /// Amount before any discount, in cents.
    pub original_amount_cents: i64,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    /// Reference returned by the payment provider.
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A status change applied to a purchase in the same transaction as its session.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseUpdate {
    pub purchase_id: Uuid,
    pub expected_status: PaymentStatus,
    pub new_status: PaymentStatus,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Builds an order number like `SES-20261019-9F2C41D07B3A4E8C9D1F5A2B6C7E8F90`.
///
/// The suffix is the purchase id, so order numbers are unique whenever ids are.
///
/// # Arguments
///
/// * `now` - The booking timestamp; its UTC date prefixes the number.
/// * `purchase_id` - The id of the purchase being created.
pub fn generate_order_number(now: DateTime<Utc>, purchase_id: Uuid) -> String {
    format!(
        "SES-{}-{}",
        now.format("%Y%m%d"),
        purchase_id.simple().to_string().to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_order_number_shape() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let order = generate_order_number(now, Uuid::new_v4());

        assert!(order.starts_with("SES-20261019-"));
        assert_eq!(order.len(), "SES-20261019-".len() + 32);
    }

    #[test]
    fn test_order_numbers_do_not_repeat_within_a_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let orders: HashSet<String> = (0..20_000)
            .map(|_| generate_order_number(now, Uuid::new_v4()))
            .collect();

        assert_eq!(orders.len(), 20_000);
    }
}
