use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Offset, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{LifecyclePolicy, SlotSettings};
use crate::error::{AppError, Result};
use crate::integrations::accounts::AccountDirectory;
use crate::integrations::email::Mailer;
use crate::integrations::meetings::{MeetingRequest, MeetingService};
use crate::integrations::notifications::Notifier;
use crate::locks::{InMemorySlotLockStore, SlotLockManager};
use crate::models::account::{Account, AccountRole, Tutor};
use crate::models::session::MeetingRoom;
use crate::scheduling::effects::{EmailTemplate, NotificationKind};
use crate::services::effects::DispatchMode;
use crate::services::{BookingEngine, EngineParts};
use crate::store::InMemoryBookingStore;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *locked(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = locked(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *locked(&self.now)
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    accounts: Mutex<HashMap<Uuid, Account>>,
    tutors: Mutex<HashMap<Uuid, Tutor>>,
}

impl InMemoryDirectory {
    pub fn add_account(&self, name: &str, role: AccountRole) -> Uuid {
        let id = Uuid::new_v4();
        locked(&self.accounts).insert(
            id,
            Account {
                id,
                name: name.to_string(),
                email: Some(format!("{}@example.test", name.to_lowercase().replace(' ', "."))),
                role,
            },
        );
        id
    }

    pub fn add_tutor(&self, name: &str, hourly_rate_cents: i64) -> Uuid {
        let id = self.add_account(name, AccountRole::Tutor);
        locked(&self.tutors).insert(
            id,
            Tutor {
                account_id: id,
                display_name: name.to_string(),
                hourly_rate_cents,
            },
        );
        id
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn find_tutor(&self, account_id: Uuid) -> Result<Option<Tutor>> {
        Ok(locked(&self.tutors).get(&account_id).cloned())
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>> {
        Ok(locked(&self.accounts).get(&account_id).cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub account_id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        locked(&self.sent).clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        locked(&self.sent).iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, account_id: Uuid, title: &str, body: &str, kind: NotificationKind) -> Result<()> {
        locked(&self.sent).push(SentNotification {
            account_id,
            title: title.to_string(),
            body: body.to_string(),
            kind,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub template: EmailTemplate,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        locked(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, account_id: Uuid, session_id: Uuid, template: &EmailTemplate) -> Result<()> {
        locked(&self.sent).push(SentEmail {
            account_id,
            session_id,
            template: template.clone(),
        });
        Ok(())
    }
}

/// Hands out predictable rooms, or fails every call when told to.
#[derive(Default)]
pub struct RecordingMeetings {
    requests: Mutex<Vec<MeetingRequest>>,
    failing: Mutex<bool>,
}

impl RecordingMeetings {
    pub fn fail_all(&self) {
        *locked(&self.failing) = true;
    }

    pub fn requests(&self) -> Vec<MeetingRequest> {
        locked(&self.requests).clone()
    }
}

#[async_trait]
impl MeetingService for RecordingMeetings {
    async fn create_meeting_for_session(&self, request: &MeetingRequest) -> Result<MeetingRoom> {
        locked(&self.requests).push(request.clone());
        if *locked(&self.failing) {
            return Err(AppError::Integration("meeting service down".to_string()));
        }

        Ok(MeetingRoom {
            meeting_id: format!("mtg-{}", request.session_id.simple()),
            join_url: format!("https://meet.example.test/j/{}", request.session_id.simple()),
            start_url: format!("https://meet.example.test/s/{}", request.session_id.simple()),
            passcode: Some("123456".to_string()),
        })
    }
}

/// An engine over in-memory storage and recording collaborators.
///
/// Effects run inline so assertions can follow the call directly.
pub struct TestHarness {
    pub engine: BookingEngine,
    pub store: Arc<InMemoryBookingStore>,
    pub lock_store: Arc<InMemorySlotLockStore>,
    pub locks: SlotLockManager,
    pub directory: Arc<InMemoryDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub mailer: Arc<RecordingMailer>,
    pub meetings: Arc<RecordingMeetings>,
    pub clock: Arc<FixedClock>,
}

impl TestHarness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_lock_ttl(now, StdDuration::from_secs(300))
    }

    pub fn with_lock_ttl(now: DateTime<Utc>, lock_ttl: StdDuration) -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let lock_store = Arc::new(InMemorySlotLockStore::new());
        let locks = SlotLockManager::new(lock_store.clone(), lock_ttl);
        let directory = Arc::new(InMemoryDirectory::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mailer = Arc::new(RecordingMailer::default());
        let meetings = Arc::new(RecordingMeetings::default());
        let clock = Arc::new(FixedClock::new(now));

        let engine = BookingEngine::new(EngineParts {
            store: store.clone(),
            directory: directory.clone(),
            locks: locks.clone(),
            meetings: meetings.clone(),
            notifier: notifier.clone(),
            mailer: mailer.clone(),
            clock: clock.clone(),
            slots: SlotSettings::default(),
            policy: LifecyclePolicy::default(),
            offset: Utc.fix(),
            dispatch: DispatchMode::Inline,
        });

        Self {
            engine,
            store,
            lock_store,
            locks,
            directory,
            notifier,
            mailer,
            meetings,
            clock,
        }
    }
}
