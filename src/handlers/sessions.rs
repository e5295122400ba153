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
    handlers::{actor_of, json},
    models::auth_session::AuthSession,
    scheduling::lifecycle::Actor,
    services::booking::BookingRequest,
    state::AppState,
    validation::booking::{
        BookSessionRequest, CancelSessionRequest, ConfirmPaymentRequest, RescheduleSessionRequest,
    },
};

/// Reserves a slot; the session stays pending until payment is confirmed.
pub async fn book_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<BookSessionRequest>,
) -> Result<Response> {
    req.validate()?;
    let end_time = req.resolved_end()?;

    let receipt = state
        .engine
        .booking
        .book(BookingRequest {
            tutor_id: req.tutor_id,
            student_id: auth.account_id,
            date: req.date,
            start_time: req.start_time,
            end_time,
            kind: req.kind,
            notes: req.notes,
        })
        .await?;

    json(StatusCode::CREATED, &receipt)
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Response> {
    let sessions = state.engine.lifecycle.list_sessions(auth.account_id).await?;
    json(StatusCode::OK, &sessions)
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state
        .engine
        .lifecycle
        .get_session(session_id, &actor_of(&auth))
        .await?;
    json(StatusCode::OK, &session)
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Response> {
    req.validate()?;
    let session = state
        .engine
        .lifecycle
        .confirm_payment(session_id, auth.account_id, &req.payment_ref)
        .await?;
    json(StatusCode::OK, &session)
}

pub async fn cancellation_policy(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let policy = state
        .engine
        .lifecycle
        .cancellation_policy(session_id, &actor_of(&auth))
        .await?;
    json(StatusCode::OK, &policy)
}

pub async fn reschedule_policy(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let policy = state
        .engine
        .lifecycle
        .reschedule_policy(session_id, &actor_of(&auth))
        .await?;
    json(StatusCode::OK, &policy)
}

pub async fn cancel_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    body: Option<Json<CancelSessionRequest>>,
) -> Result<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;

    let session = state
        .engine
        .lifecycle
        .cancel(session_id, Actor::Participant(auth.account_id), req.reason)
        .await?;
    json(StatusCode::OK, &session)
}

pub async fn reschedule_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RescheduleSessionRequest>,
) -> Result<Response> {
    req.validate()?;
    let session = state
        .engine
        .lifecycle
        .reschedule(
            session_id,
            Actor::Participant(auth.account_id),
            req.date,
            req.start_time,
            req.end_time,
        )
        .await?;
    json(StatusCode::OK, &session)
}

pub async fn complete_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state
        .engine
        .lifecycle
        .complete(session_id, actor_of(&auth))
        .await?;
    json(StatusCode::OK, &session)
}

pub async fn mark_no_show(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session = state
        .engine
        .lifecycle
        .mark_no_show(session_id, actor_of(&auth))
        .await?;
    json(StatusCode::OK, &session)
}
