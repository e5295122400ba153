use axum::{
    extract::{Path, Query, State},
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
    state::AppState,
    validation::booking::{AddBlockRequest, AddWindowRequest, SlotsQuery},
};

pub async fn bookable_slots(
    State(state): State<AppState>,
    Path(tutor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Response> {
    let slots = state
        .engine
        .availability
        .bookable_slots(tutor_id, query.date)
        .await?;
    json(StatusCode::OK, &slots)
}

pub async fn list_windows(
    State(state): State<AppState>,
    Path(tutor_id): Path<Uuid>,
) -> Result<Response> {
    let windows = state.engine.availability.list_windows(tutor_id).await?;
    json(StatusCode::OK, &windows)
}

/// Adds a weekly window for the signed-in tutor.
pub async fn add_window(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<AddWindowRequest>,
) -> Result<Response> {
    req.validate()?;
    let window = state
        .engine
        .availability
        .add_window(auth.account_id, req.weekday()?, req.start_time, req.end_time)
        .await?;
    json(StatusCode::CREATED, &window)
}

pub async fn remove_window(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(window_id): Path<Uuid>,
) -> Result<Response> {
    state
        .engine
        .availability
        .remove_window(auth.account_id, window_id)
        .await?;
    json(StatusCode::OK, &sonic_rs::json!({ "message": "Availability window removed" }))
}

pub async fn list_blocks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<SlotsQuery>,
) -> Result<Response> {
    let blocks = state
        .engine
        .availability
        .blocks_for_date(auth.account_id, query.date)
        .await?;
    json(StatusCode::OK, &blocks)
}

pub async fn add_block(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<AddBlockRequest>,
) -> Result<Response> {
    req.validate()?;
    let block = state
        .engine
        .availability
        .add_block(auth.account_id, req.date, req.start_time, req.end_time, req.reason)
        .await?;
    json(StatusCode::CREATED, &block)
}

pub async fn remove_block(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(block_id): Path<Uuid>,
) -> Result<Response> {
    state
        .engine
        .availability
        .remove_block(auth.account_id, block_id)
        .await?;
    json(StatusCode::OK, &sonic_rs::json!({ "message": "Block removed" }))
}
