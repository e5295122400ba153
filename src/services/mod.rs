pub mod availability;
pub mod booking;
pub mod effects;
pub mod lifecycle;
pub mod reminders;

use std::sync::Arc;

use chrono::{Duration, FixedOffset};

use crate::clock::Clock;
use crate::config::{LifecyclePolicy, SlotSettings};
use crate::integrations::accounts::AccountDirectory;
use crate::integrations::email::Mailer;
use crate::integrations::meetings::MeetingService;
use crate::integrations::notifications::Notifier;
use crate::locks::SlotLockManager;
use crate::store::BookingStore;

use self::availability::AvailabilityService;
use self::booking::BookingService;
use self::effects::{DispatchMode, EffectDispatcher};
use self::lifecycle::LifecycleService;
use self::reminders::ReminderSweep;

/// Everything the engine is assembled from.
pub struct EngineParts {
    pub store: Arc<dyn BookingStore>,
    pub directory: Arc<dyn AccountDirectory>,
    pub locks: SlotLockManager,
    pub meetings: Arc<dyn MeetingService>,
    pub notifier: Arc<dyn Notifier>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
    pub slots: SlotSettings,
    pub policy: LifecyclePolicy,
    pub offset: FixedOffset,
    pub dispatch: DispatchMode,
}

/// The booking engine's services, wired to one set of collaborators.
#[derive(Clone)]
pub struct BookingEngine {
    pub availability: AvailabilityService,
    pub booking: BookingService,
    pub lifecycle: LifecycleService,
    pub reminders: ReminderSweep,
}

impl BookingEngine {
    pub fn new(parts: EngineParts) -> Self {
        let dispatcher = EffectDispatcher::new(
            parts.store.clone(),
            parts.directory.clone(),
            parts.meetings,
            parts.notifier,
            parts.mailer,
            parts.offset,
            parts.dispatch,
        );

        let availability = AvailabilityService::new(
            parts.store.clone(),
            parts.directory,
            parts.clock.clone(),
            parts.slots,
            parts.offset,
        );

        let booking = BookingService::new(
            parts.store.clone(),
            availability.clone(),
            parts.locks.clone(),
            parts.clock.clone(),
            parts.offset,
        );

        let hold = Duration::from_std(parts.locks.ttl()).unwrap_or_else(|_| Duration::minutes(5));

        let lifecycle = LifecycleService::new(
            parts.store.clone(),
            availability.clone(),
            parts.locks,
            dispatcher.clone(),
            parts.clock,
            parts.policy,
            parts.offset,
        );

        let reminders = ReminderSweep::new(
            parts.store,
            lifecycle.clone(),
            dispatcher,
            parts.policy,
            parts.offset,
            hold,
        );

        Self {
            availability,
            booking,
            lifecycle,
            reminders,
        }
    }
}
