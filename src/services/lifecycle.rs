use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::LifecyclePolicy;
use crate::error::{AppError, Result};
use crate::locks::{SlotLockKey, SlotLockManager};
use crate::models::purchase::{PaymentStatus, Purchase};
use crate::models::session::Session;
use crate::models::slot::TimeRange;
use crate::scheduling::lifecycle::{self, Actor, CancellationPolicy, PolicyContext, ReschedulePolicy, Transition};
use crate::services::availability::AvailabilityService;
use crate::services::effects::EffectDispatcher;
use crate::store::BookingStore;

pub const HOLD_EXPIRED: &str = "Slot reservation expired, please retry booking";

/// Settlement signal from the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed { reference: String },
    Failed { reason: String },
}

/// Reads sessions and drives them through their state machine.
#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn BookingStore>,
    availability: AvailabilityService,
    locks: SlotLockManager,
    dispatcher: EffectDispatcher,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
    offset: FixedOffset,
}

fn hold_key(session: &Session) -> SlotLockKey {
    SlotLockKey::new(session.tutor_id, session.session_date, session.start_time)
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        availability: AvailabilityService,
        locks: SlotLockManager,
        dispatcher: EffectDispatcher,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            availability,
            locks,
            dispatcher,
            clock,
            policy,
            offset,
        }
    }

    fn context(&self) -> PolicyContext {
        PolicyContext {
            now: self.clock.now(),
            offset: self.offset,
            policy: self.policy,
        }
    }

    async fn load(&self, session_id: Uuid) -> Result<Session> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session".to_string()))
    }

    async fn purchase_of(&self, session: &Session) -> Result<Option<Purchase>> {
        match session.purchase_id {
            Some(id) => self.store.find_purchase(id).await,
            None => Ok(None),
        }
    }

    /// Persists a transition, then hands its effects to the dispatcher.
    async fn commit(&self, transition: Transition) -> Result<Session> {
        let stored = self.store.apply_transition(&transition).await?;
        tracing::info!(
            session = %stored.id,
            from = transition.expected_status.as_str(),
            to = stored.status.as_str(),
            "session transition committed"
        );
        self.dispatcher.dispatch(transition.effects).await;
        Ok(stored)
    }

    pub async fn get_session(&self, session_id: Uuid, actor: &Actor) -> Result<Session> {
        let session = self.load(session_id).await?;
        lifecycle::authorize(&session, actor)?;
        Ok(session)
    }

    pub async fn list_sessions(&self, account_id: Uuid) -> Result<Vec<Session>> {
        self.store.sessions_for_account(account_id).await
    }

    pub async fn cancellation_policy(&self, session_id: Uuid, actor: &Actor) -> Result<CancellationPolicy> {
        let session = self.get_session(session_id, actor).await?;
        let purchase = self.purchase_of(&session).await?;
        Ok(lifecycle::cancellation_policy(&session, purchase.as_ref(), &self.context()))
    }

    pub async fn reschedule_policy(&self, session_id: Uuid, actor: &Actor) -> Result<ReschedulePolicy> {
        let session = self.get_session(session_id, actor).await?;
        Ok(lifecycle::reschedule_policy(&session, &self.context()))
    }

    /// Settles a reservation paid for by `requester_id`.
    ///
    /// The reservation hold must still belong to the requester; a lapsed or
    /// stolen hold fails with a conflict and nothing is written.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The pending session.
    /// * `requester_id` - The student who holds the reservation.
    /// * `payment_ref` - The payment provider's reference.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `scheduled` session.
    pub async fn confirm_payment(&self, session_id: Uuid, requester_id: Uuid, payment_ref: &str) -> Result<Session> {
        let session = self.load(session_id).await?;
        if session.student_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the booking student can confirm payment".to_string(),
            ));
        }

        let purchase = self.purchase_of(&session).await?;
        self.settle(&session, purchase.as_ref(), requester_id, payment_ref).await
    }

    async fn settle(
        &self,
        session: &Session,
        purchase: Option<&Purchase>,
        requester_id: Uuid,
        payment_ref: &str,
    ) -> Result<Session> {
        let transition = lifecycle::confirm_payment(session, purchase, payment_ref, &self.context())?;

        let key = hold_key(session);
        if !self.locks.verify_held_by(&key, requester_id).await? {
            tracing::warn!(session = %session.id, slot = %key, "payment confirmation against a lapsed hold");
            return Err(AppError::Conflict(HOLD_EXPIRED.to_string()));
        }

        let stored = self.commit(transition).await?;
        self.locks.release_quietly(&key).await;
        Ok(stored)
    }

    /// Applies the payment provider's verdict on a purchase.
    pub async fn record_payment_outcome(&self, purchase_id: Uuid, outcome: PaymentOutcome) -> Result<Session> {
        let purchase = self
            .store
            .find_purchase(purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        if purchase.payment_status != PaymentStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "Purchase {} is already settled",
                purchase.order_number
            )));
        }

        let session_id = purchase
            .session_id
            .ok_or_else(|| AppError::BadRequest("Purchase is not linked to a session".to_string()))?;
        let session = self.load(session_id).await?;

        match outcome {
            PaymentOutcome::Completed { reference } => {
                self.settle(&session, Some(&purchase), purchase.payer_id, &reference).await
            }
            PaymentOutcome::Failed { reason } => self.abandon(&session, Some(&purchase), &reason).await,
        }
    }

    async fn abandon(&self, session: &Session, purchase: Option<&Purchase>, reason: &str) -> Result<Session> {
        let transition = lifecycle::abandon_reservation(session, purchase, reason, &self.context())?;
        let stored = self.commit(transition).await?;
        self.locks.release_quietly(&hold_key(session)).await;
        Ok(stored)
    }

    /// Releases a pending reservation whose hold has lapsed.
    pub async fn expire_reservation(&self, session: &Session) -> Result<Session> {
        let purchase = self.purchase_of(session).await?;
        self.abandon(session, purchase.as_ref(), "payment was not completed in time").await
    }

    pub async fn cancel(&self, session_id: Uuid, actor: Actor, reason: Option<String>) -> Result<Session> {
        let session = self.load(session_id).await?;
        let purchase = self.purchase_of(&session).await?;
        let transition = lifecycle::cancel(&session, purchase.as_ref(), &actor, reason, &self.context())?;
        self.commit(transition).await
    }

    /// Moves a scheduled session, keeping its identity.
    ///
    /// Participants may only move into a slot the tutor currently offers.
    /// Admins skip that check and the notice floor; the overlap re-check
    /// inside the write still applies to both.
    pub async fn reschedule(
        &self,
        session_id: Uuid,
        actor: Actor,
        new_date: NaiveDate,
        new_start: NaiveTime,
        new_end: NaiveTime,
    ) -> Result<Session> {
        let session = self.load(session_id).await?;
        let new_range = TimeRange::new(new_start, new_end);
        let transition = lifecycle::reschedule(&session, &actor, new_date, new_range, &self.context())?;

        if !actor.is_admin() {
            let offered = self
                .availability
                .bookable_slots_excluding(session.tutor_id, new_date, Some(session.id))
                .await?;
            if !offered.iter().any(|slot| slot.range() == new_range) {
                return Err(AppError::Conflict(
                    "The requested time slot is no longer available".to_string(),
                ));
            }
        }

        let key = SlotLockKey::new(session.tutor_id, new_date, new_start);
        let guard = self.locks.lock(key, actor.account_id()).await?;
        let result = self.commit(transition).await;
        guard.release().await;
        result
    }

    pub async fn complete(&self, session_id: Uuid, actor: Actor) -> Result<Session> {
        let session = self.load(session_id).await?;
        let transition = lifecycle::complete(&session, &actor, &self.context())?;
        self.commit(transition).await
    }

    pub async fn mark_no_show(&self, session_id: Uuid, actor: Actor) -> Result<Session> {
        let session = self.load(session_id).await?;
        let transition = lifecycle::mark_no_show(&session, &actor, &self.context())?;
        self.commit(transition).await
    }
}
