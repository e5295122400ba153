use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::config::LifecyclePolicy;
use crate::error::{AppError, Result};
use crate::models::session::{to_local, ReminderStage};
use crate::scheduling::lifecycle::{self, PolicyContext};
use crate::services::effects::EffectDispatcher;
use crate::services::lifecycle::LifecycleService;
use crate::store::BookingStore;

/// Widest reminder horizon.
const DAY_HORIZON_HOURS: i64 = 24;

/// What one sweep tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub day_reminders: usize,
    pub hour_reminders: usize,
    pub expired_reservations: usize,
    pub failures: usize,
}

/// Periodic job: reminders for upcoming sessions and expiry of unpaid holds.
#[derive(Clone)]
pub struct ReminderSweep {
    store: Arc<dyn BookingStore>,
    lifecycle: LifecycleService,
    dispatcher: EffectDispatcher,
    policy: LifecyclePolicy,
    offset: FixedOffset,
    hold: Duration,
}

impl ReminderSweep {
    pub fn new(
        store: Arc<dyn BookingStore>,
        lifecycle: LifecycleService,
        dispatcher: EffectDispatcher,
        policy: LifecyclePolicy,
        offset: FixedOffset,
        hold: Duration,
    ) -> Self {
        Self {
            store,
            lifecycle,
            dispatcher,
            policy,
            offset,
            hold,
        }
    }

    /// Sends due reminders and expires lapsed reservations.
    ///
    /// # Arguments
    ///
    /// * `now` - The sweep instant.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `SweepReport` for this tick.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        self.send_reminders(now, &mut report).await?;
        self.expire_holds(now, &mut report).await?;

        if report != SweepReport::default() {
            tracing::info!(
                day = report.day_reminders,
                hour = report.hour_reminders,
                expired = report.expired_reservations,
                failures = report.failures,
                "reminder sweep finished"
            );
        }
        Ok(report)
    }

    async fn send_reminders(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Result<()> {
        let ctx = PolicyContext {
            now,
            offset: self.offset,
            policy: self.policy,
        };
        let from = to_local(now, &self.offset);
        let to = to_local(now + Duration::hours(DAY_HORIZON_HOURS), &self.offset);

        for session in self.store.scheduled_between(from, to).await? {
            let Some(stage) = lifecycle::due_reminder(&session, &ctx) else {
                continue;
            };

            // Only the sweep that moves the stage forward sends.
            match self.store.claim_reminder(session.id, stage).await {
                Ok(true) => {
                    self.dispatcher
                        .dispatch(lifecycle::reminder_effects(&session, stage))
                        .await;
                    match stage {
                        ReminderStage::Hour => report.hour_reminders += 1,
                        _ => report.day_reminders += 1,
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(session = %session.id, error = %e, "failed to claim reminder");
                }
            }
        }
        Ok(())
    }

    async fn expire_holds(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Result<()> {
        for session in self.store.pending_created_before(now - self.hold).await? {
            match self.lifecycle.expire_reservation(&session).await {
                Ok(_) => report.expired_reservations += 1,
                // Settled or released since it was listed.
                Err(AppError::Conflict(_)) | Err(AppError::BadRequest(_)) => {
                    tracing::debug!(session = %session.id, "reservation changed before expiry");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(session = %session.id, error = %e, "failed to expire reservation");
                }
            }
        }
        Ok(())
    }
}
