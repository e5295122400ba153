pub mod admin;
pub mod availability;
pub mod payments;
pub mod sessions;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::auth_session::AuthSession;
use crate::scheduling::lifecycle::Actor;

/// Serialises `body` with sonic-rs.
pub(crate) fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// The actor for read and close-out operations; admins act as admins.
pub(crate) fn actor_of(session: &AuthSession) -> Actor {
    if session.is_admin() {
        Actor::Admin(session.account_id)
    } else {
        Actor::Participant(session.account_id)
    }
}
