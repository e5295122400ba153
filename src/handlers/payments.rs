use axum::{extract::State, http::StatusCode, response::Response, Json};
use garde::Validate;

use crate::{
    error::{AppError, Result},
    handlers::json,
    services::lifecycle::PaymentOutcome,
    state::AppState,
    validation::booking::{OutcomeStatus, PaymentOutcomeRequest},
};

/// Settlement callback from the payment provider.
pub async fn record_outcome(
    State(state): State<AppState>,
    Json(req): Json<PaymentOutcomeRequest>,
) -> Result<Response> {
    req.validate()?;

    let outcome = match req.status {
        OutcomeStatus::Completed => PaymentOutcome::Completed {
            reference: req.reference.ok_or_else(|| {
                AppError::Validation("reference is required for completed payments".to_string())
            })?,
        },
        OutcomeStatus::Failed => PaymentOutcome::Failed {
            reason: req.reason.unwrap_or_else(|| "payment failed".to_string()),
        },
    };

    tracing::info!(purchase = %req.purchase_id, status = ?req.status, "payment outcome received");
    let session = state
        .engine
        .lifecycle
        .record_payment_outcome(req.purchase_id, outcome)
        .await?;
    json(StatusCode::OK, &session)
}
