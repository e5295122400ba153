use chrono::{Datelike, Duration, Utc, Weekday};
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use serde_json::{json, Value};
use uuid::Uuid;

use tutorbook::models::account::AccountRole;
use tutorbook::models::auth_session::AuthSession;

static REDIS_CLIENT: Lazy<redis::Client> = Lazy::new(|| {
    redis::Client::open(std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into()))
        .unwrap()
});

// Needs the server on 127.0.0.1:3000 with PAYMENT_WEBHOOK_SECRET=e2e-secret and
// the same DATABASE_URL and REDIS_URL this test uses.
struct TestContext {
    client: reqwest::Client,
    base_url: String,
}

impl TestContext {
    fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

async fn get_redis_conn() -> ConnectionManager {
    REDIS_CLIENT.get_connection_manager().await.unwrap()
}

/// Stores an auth session the way the account service does; returns the cookie.
async fn sign_in(account_id: Uuid, role: AccountRole) -> String {
    let session = AuthSession {
        account_id,
        role,
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::hours(1),
    };
    let session_id = Uuid::new_v4();
    let mut con = get_redis_conn().await;
    let _: () = redis::cmd("SET")
        .arg(format!("session:{}", session_id))
        .arg(serde_json::to_string(&session).unwrap())
        .arg("EX")
        .arg(3600)
        .query_async(&mut con)
        .await
        .unwrap();
    format!("session_id={}", session_id)
}

async fn seed_accounts() -> (Uuid, Uuid) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = tutorbook::db::create_pool(&database_url).unwrap();
    tutorbook::db::run_migrations(&pool).await.unwrap();
    let client = pool.get().await.unwrap();

    let tutor = Uuid::new_v4();
    let student = Uuid::new_v4();
    client
        .execute(
            "INSERT INTO accounts (id, name, role) VALUES ($1, 'E2E Tutor', 'tutor'), ($2, 'E2E Student', 'student')",
            &[&tutor, &student],
        )
        .await
        .unwrap();
    client
        .execute(
            "INSERT INTO tutors (account_id, display_name, hourly_rate_cents) VALUES ($1, 'E2E Tutor', 6000)",
            &[&tutor],
        )
        .await
        .unwrap();
    (tutor, student)
}

#[tokio::test]
#[ignore = "requires a running server with Postgres and Redis"]
async fn test_reserve_confirm_and_cancel_over_http() {
    let context = TestContext::new();
    let (tutor, student) = seed_accounts().await;
    let tutor_cookie = sign_in(tutor, AccountRole::Tutor).await;
    let student_cookie = sign_in(student, AccountRole::Student).await;

    // Step 1: the tutor opens Monday mornings.
    let window = context
        .client
        .post(format!("{}/api/availability/windows", context.base_url))
        .header("cookie", &tutor_cookie)
        .json(&json!({ "day_of_week": 1, "start_time": "09:00:00", "end_time": "12:00:00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(window.status().as_u16(), 201, "Adding availability failed");

    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() != Weekday::Mon {
        date += Duration::days(1);
    }

    // Step 2: six slots are offered.
    let slots: Value = context
        .client
        .get(format!("{}/api/tutors/{}/slots?date={}", context.base_url, tutor, date))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(slots.as_array().unwrap().len(), 6);

    // Step 3: reserve 10:00.
    let booked = context
        .client
        .post(format!("{}/api/sessions", context.base_url))
        .header("cookie", &student_cookie)
        .json(&json!({
            "tutor_id": tutor,
            "date": date,
            "start_time": "10:00:00",
            "end_time": "10:25:00"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(booked.status().as_u16(), 201, "Booking failed");
    let receipt: Value = booked.json().await.unwrap();
    assert_eq!(receipt["session"]["status"], "pending");
    let session_id = receipt["session"]["id"].as_str().unwrap().to_string();
    let purchase_id = receipt["purchase"]["id"].as_str().unwrap().to_string();

    // Step 4: the same slot is refused to a second attempt.
    let again = context
        .client
        .post(format!("{}/api/sessions", context.base_url))
        .header("cookie", &student_cookie)
        .json(&json!({
            "tutor_id": tutor,
            "date": date,
            "start_time": "10:00:00",
            "end_time": "10:25:00"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    // Step 5: the provider reports the payment.
    let settled = context
        .client
        .post(format!("{}/api/payments/outcome", context.base_url))
        .header("x-webhook-secret", "e2e-secret")
        .json(&json!({ "purchase_id": purchase_id, "status": "completed", "reference": "ch_e2e" }))
        .send()
        .await
        .unwrap();
    assert_eq!(settled.status().as_u16(), 200, "Payment outcome failed");
    let session: Value = settled.json().await.unwrap();
    assert_eq!(session["status"], "scheduled");

    // Step 6: cancel well ahead of the start and get a refund.
    let policy: Value = context
        .client
        .get(format!("{}/api/sessions/{}/cancellation-policy", context.base_url, session_id))
        .header("cookie", &student_cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(policy["can_cancel"], true);
    assert_eq!(policy["refund_eligible"], true);

    let cancelled = context
        .client
        .post(format!("{}/api/sessions/{}/cancel", context.base_url, session_id))
        .header("cookie", &student_cookie)
        .json(&json!({ "reason": "e2e" }))
        .send()
        .await
        .unwrap();
    assert_eq!(cancelled.status().as_u16(), 200);
    let cancelled: Value = cancelled.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");
}

#[tokio::test]
#[ignore = "requires a running server with Postgres and Redis"]
async fn test_requests_without_session_are_rejected() {
    let context = TestContext::new();

    let response = context
        .client
        .get(format!("{}/api/sessions", context.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let webhook = context
        .client
        .post(format!("{}/api/payments/outcome", context.base_url))
        .header("x-webhook-secret", "wrong")
        .json(&json!({ "purchase_id": Uuid::new_v4(), "status": "failed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(webhook.status().as_u16(), 401);
}
