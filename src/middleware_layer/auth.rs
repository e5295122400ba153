use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{models::auth_session::AuthSession, state::AppState};

use redis::AsyncCommands;

/// Header the payment provider signs its callbacks with.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get("session_id")
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Requires a live auth session; the account service writes them to Redis.
///
/// On success the `AuthSession` is available to handlers as an extension.
pub async fn require_auth(
    State(mut state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let session_id = extract_session_token(&cookies).ok_or_else(|| {
        tracing::debug!("No session_id cookie found");
        StatusCode::UNAUTHORIZED
    })?;

    let session_json: Option<String> = state
        .redis
        .get(format!("session:{}", session_id))
        .await
        .map_err(|e| {
            tracing::error!("Redis error while reading auth session: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let session_json = session_json.ok_or_else(|| {
        tracing::debug!("Auth session {} not found", session_id);
        StatusCode::UNAUTHORIZED
    })?;

    let session: AuthSession = sonic_rs::from_str(&session_json).map_err(|e| {
        tracing::warn!("Invalid auth session JSON: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    if chrono::Utc::now() > session.expires_at {
        tracing::debug!("Auth session expired for account {}", session.account_id);

        let deleted: redis::RedisResult<()> = state.redis.del(format!("session:{}", session_id)).await;
        if let Err(e) = deleted {
            tracing::warn!("Failed to delete expired auth session: {}", e);
        }

        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Must run after [`require_auth`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    match request.extensions().get::<AuthSession>() {
        Some(session) if session.is_admin() => Ok(next.run(request).await),
        Some(session) => {
            tracing::warn!("Account {} attempted an admin operation", session.account_id);
            Err(StatusCode::FORBIDDEN)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Constant-time comparison of the provider's shared secret.
pub fn webhook_secret_matches(expected: &str, provided: Option<&str>) -> bool {
    match provided {
        Some(provided) => expected.as_bytes().ct_eq(provided.as_bytes()).into(),
        None => false,
    }
}

pub async fn require_webhook_secret(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    if !webhook_secret_matches(&state.config.payment_webhook_secret, provided) {
        tracing::warn!("Payment callback rejected: bad or missing webhook secret");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
