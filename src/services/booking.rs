use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::locks::{SlotLockKey, SlotLockManager};
use crate::models::account::Tutor;
use crate::models::purchase::{generate_order_number, PaymentStatus, Purchase, PurchaseCategory};
use crate::models::session::{to_utc, ReminderStage, Session, SessionKind, SessionStatus};
use crate::models::slot::{is_whole_minute, TimeRange};
use crate::scheduling::slots::price_cents;
use crate::services::availability::AvailabilityService;
use crate::store::BookingStore;

/// A student's request for one session.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub tutor_id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Ignored for trial sessions, whose length is fixed.
    pub end_time: NaiveTime,
    pub kind: SessionKind,
    pub notes: Option<String>,
}

/// A reserved session awaiting payment.
#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub session: Session,
    pub purchase: Purchase,
    /// Payment must be confirmed before this instant.
    pub hold_expires_at: DateTime<Utc>,
}

/// Reserves slots: lock, validate, write session and purchase together.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    availability: AvailabilityService,
    locks: SlotLockManager,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        availability: AvailabilityService,
        locks: SlotLockManager,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            availability,
            locks,
            clock,
            offset,
        }
    }

    fn requested_range(&self, request: &BookingRequest) -> Result<TimeRange> {
        let end = match request.kind {
            SessionKind::Regular => request.end_time,
            SessionKind::Trial => {
                let minutes = self.availability.settings().trial_duration_minutes;
                let (end, wrapped) = request
                    .start_time
                    .overflowing_add_signed(Duration::minutes(i64::from(minutes)));
                if wrapped != 0 {
                    return Err(AppError::BadRequest(
                        "Trial session must end on the same day".to_string(),
                    ));
                }
                end
            }
        };

        if !is_whole_minute(request.start_time) || !is_whole_minute(end) {
            return Err(AppError::BadRequest("Times must be whole minutes".to_string()));
        }
        if request.start_time >= end {
            return Err(AppError::BadRequest("Start time must be before end time".to_string()));
        }
        Ok(TimeRange::new(request.start_time, end))
    }

    /// Reserves the requested slot for the student.
    ///
    /// On success the slot lock stays held as the payment hold and the session
    /// and purchase are both `pending`. On any failure the lock is released.
    ///
    /// # Arguments
    ///
    /// * `request` - The tutor, student, date, times and kind of the session.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `BookingReceipt` with the pending session and
    /// purchase and the instant the hold lapses.
    pub async fn book(&self, request: BookingRequest) -> Result<BookingReceipt> {
        if request.student_id == request.tutor_id {
            return Err(AppError::BadRequest("You cannot book a session with yourself".to_string()));
        }

        let tutor = self.availability.require_tutor(request.tutor_id).await?;
        self.availability.require_account(request.student_id).await?;
        let range = self.requested_range(&request)?;

        let now = self.clock.now();
        if to_utc(request.date.and_time(range.start), &self.offset) <= now {
            return Err(AppError::BadRequest("Cannot book a session in the past".to_string()));
        }

        let key = SlotLockKey::new(request.tutor_id, request.date, range.start);
        let guard = self.locks.lock(key, request.student_id).await?;

        match self.reserve(&tutor, &request, range, now).await {
            Ok((session, purchase)) => {
                guard.keep();
                tracing::info!(
                    session = %session.id,
                    tutor = %session.tutor_id,
                    student = %session.student_id,
                    date = %session.session_date,
                    start = %session.start_time,
                    order = %purchase.order_number,
                    "slot reserved, awaiting payment"
                );
                let hold = Duration::from_std(self.locks.ttl()).unwrap_or_else(|_| Duration::zero());
                Ok(BookingReceipt {
                    session,
                    purchase,
                    hold_expires_at: now + hold,
                })
            }
            Err(e) => {
                guard.release().await;
                tracing::warn!(tutor = %request.tutor_id, date = %request.date, error = %e, "booking rejected");
                Err(e)
            }
        }
    }

    async fn reserve(
        &self,
        tutor: &Tutor,
        request: &BookingRequest,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<(Session, Purchase)> {
        self.availability
            .ensure_within_availability(request.tutor_id, request.date, range)
            .await?;

        let duration_minutes = range.duration_minutes();
        let amount_cents = price_cents(tutor.hourly_rate_cents, duration_minutes);

        let session = Session {
            id: Uuid::new_v4(),
            student_id: request.student_id,
            tutor_id: request.tutor_id,
            session_date: request.date,
            start_time: range.start,
            end_time: range.end,
            duration_minutes,
            amount_cents,
            purchase_id: None,
            status: SessionStatus::Pending,
            notes: request.notes.clone(),
            kind: request.kind,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            reminder_stage: ReminderStage::None,
            meeting: None,
            created_at: now,
            updated_at: now,
        };

        let purchase_id = Uuid::new_v4();
        let purchase = Purchase {
            id: purchase_id,
            payer_id: request.student_id,
            session_id: Some(session.id),
            category: PurchaseCategory::Session,
            amount_cents,
            original_amount_cents: amount_cents,
            order_number: generate_order_number(now, purchase_id),
            payment_status: PaymentStatus::Pending,
            transaction_ref: None,
            paid_at: None,
            created_at: now,
        };

        self.store.create_booking(session, purchase).await
    }
}
