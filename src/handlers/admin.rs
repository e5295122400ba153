use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use garde::Validate;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::json,
    models::auth_session::AuthSession,
    scheduling::lifecycle::Actor,
    state::AppState,
    validation::booking::{CancelSessionRequest, RescheduleSessionRequest},
};

/// Cancels without the notice floor; a paid purchase is always refunded.
pub async fn cancel_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    body: Option<Json<CancelSessionRequest>>,
) -> Result<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;

    tracing::info!(admin = %auth.account_id, session = %session_id, "admin cancellation");
    let session = state
        .engine
        .lifecycle
        .cancel(session_id, Actor::Admin(auth.account_id), req.reason)
        .await?;
    json(StatusCode::OK, &session)
}

/// Moves a session without the availability check or the notice floor.
pub async fn reschedule_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RescheduleSessionRequest>,
) -> Result<Response> {
    req.validate()?;

    tracing::info!(admin = %auth.account_id, session = %session_id, "admin reschedule");
    let session = state
        .engine
        .lifecycle
        .reschedule(
            session_id,
            Actor::Admin(auth.account_id),
            req.date,
            req.start_time,
            req.end_time,
        )
        .await?;
    json(StatusCode::OK, &session)
}
