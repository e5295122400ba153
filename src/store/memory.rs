use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use uuid::Uuid;

use super::{BookingStore, OVERLAP_CONFLICT, STALE_TRANSITION};
use crate::error::{AppError, Result};
use crate::models::availability::{AvailabilityWindow, Block, RecordStatus};
use crate::models::purchase::Purchase;
use crate::models::session::{MeetingRoom, ReminderStage, Session, SessionStatus};
use crate::scheduling::lifecycle::Transition;

#[derive(Default)]
struct Tables {
    windows: HashMap<Uuid, AvailabilityWindow>,
    blocks: HashMap<Uuid, Block>,
    sessions: HashMap<Uuid, Session>,
    purchases: HashMap<Uuid, Purchase>,
}

impl Tables {
    fn overlaps(&self, candidate: &Session, exclude: Option<Uuid>) -> bool {
        self.sessions.values().any(|existing| {
            Some(existing.id) != exclude
                && existing.tutor_id == candidate.tutor_id
                && existing.session_date == candidate.session_date
                && existing.status.occupies_slot()
                && existing.interval().overlaps(&candidate.interval())
        })
    }
}

/// `BookingStore` kept in process memory.
///
/// One mutex guards every table, so each call is atomic with respect to the
/// others. Used by the test suite and for running without a database.
#[derive(Default)]
pub struct InMemoryBookingStore {
    tables: Mutex<Tables>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores a session as-is, bypassing every check.
    pub fn seed_session(&self, session: Session) {
        self.tables().sessions.insert(session.id, session);
    }

    pub fn seed_purchase(&self, purchase: Purchase) {
        self.tables().purchases.insert(purchase.id, purchase);
    }

    /// Every stored session, in no particular order.
    pub fn all_sessions(&self) -> Vec<Session> {
        self.tables().sessions.values().cloned().collect()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn windows_for_day(&self, tutor_id: Uuid, day: Weekday) -> Result<Vec<AvailabilityWindow>> {
        let mut windows: Vec<_> = self
            .tables()
            .windows
            .values()
            .filter(|w| w.tutor_id == tutor_id && w.day_of_week == day && w.status == RecordStatus::Active)
            .cloned()
            .collect();
        windows.sort_by_key(|w| w.start_time);
        Ok(windows)
    }

    async fn windows_for_tutor(&self, tutor_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let mut windows: Vec<_> = self
            .tables()
            .windows
            .values()
            .filter(|w| w.tutor_id == tutor_id && w.status == RecordStatus::Active)
            .cloned()
            .collect();
        windows.sort_by_key(|w| (w.day_of_week.number_from_monday(), w.start_time));
        Ok(windows)
    }

    async fn insert_window(&self, window: AvailabilityWindow) -> Result<AvailabilityWindow> {
        let mut tables = self.tables();
        let clash = tables.windows.values().any(|w| {
            w.tutor_id == window.tutor_id
                && w.day_of_week == window.day_of_week
                && w.status == RecordStatus::Active
                && w.range().overlaps(&window.range())
        });
        if clash {
            return Err(AppError::Conflict(
                "Availability window overlaps an existing window".to_string(),
            ));
        }

        tables.windows.insert(window.id, window.clone());
        Ok(window)
    }

    async fn delete_window(&self, tutor_id: Uuid, window_id: Uuid) -> Result<()> {
        match self.tables().windows.get_mut(&window_id) {
            Some(w) if w.tutor_id == tutor_id && w.status == RecordStatus::Active => {
                w.status = RecordStatus::Deleted;
                Ok(())
            }
            _ => Err(AppError::NotFound("Availability window".to_string())),
        }
    }

    async fn blocks_for_date(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Block>> {
        let mut blocks: Vec<_> = self
            .tables()
            .blocks
            .values()
            .filter(|b| b.tutor_id == tutor_id && b.block_date == date && b.status == RecordStatus::Active)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| b.start_time);
        Ok(blocks)
    }

    async fn insert_block(&self, block: Block) -> Result<Block> {
        self.tables().blocks.insert(block.id, block.clone());
        Ok(block)
    }

    async fn delete_block(&self, tutor_id: Uuid, block_id: Uuid) -> Result<()> {
        match self.tables().blocks.get_mut(&block_id) {
            Some(b) if b.tutor_id == tutor_id && b.status == RecordStatus::Active => {
                b.status = RecordStatus::Deleted;
                Ok(())
            }
            _ => Err(AppError::NotFound("Block".to_string())),
        }
    }

    async fn occupying_sessions(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Session>> {
        let mut sessions: Vec<_> = self
            .tables()
            .sessions
            .values()
            .filter(|s| s.tutor_id == tutor_id && s.session_date == date && s.status.occupies_slot())
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    async fn create_booking(&self, session: Session, purchase: Purchase) -> Result<(Session, Purchase)> {
        let mut tables = self.tables();
        if tables.overlaps(&session, None) {
            return Err(AppError::Conflict(OVERLAP_CONFLICT.to_string()));
        }

        let session = Session { purchase_id: Some(purchase.id), ..session };
        let purchase = Purchase { session_id: Some(session.id), ..purchase };
        tables.sessions.insert(session.id, session.clone());
        tables.purchases.insert(purchase.id, purchase.clone());
        Ok((session, purchase))
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.tables().sessions.get(&session_id).cloned())
    }

    async fn find_purchase(&self, purchase_id: Uuid) -> Result<Option<Purchase>> {
        Ok(self.tables().purchases.get(&purchase_id).cloned())
    }

    async fn sessions_for_account(&self, account_id: Uuid) -> Result<Vec<Session>> {
        let mut sessions: Vec<_> = self
            .tables()
            .sessions
            .values()
            .filter(|s| s.is_participant(account_id))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| (b.session_date, b.start_time).cmp(&(a.session_date, a.start_time)));
        Ok(sessions)
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<Session> {
        let next = &transition.session;
        let mut tables = self.tables();

        // Validate everything before the first write so a rejection leaves no trace.
        let current_status = tables
            .sessions
            .get(&next.id)
            .map(|s| s.status)
            .ok_or_else(|| AppError::NotFound("Session".to_string()))?;
        if current_status != transition.expected_status {
            return Err(AppError::Conflict(STALE_TRANSITION.to_string()));
        }

        if transition.recheck_overlap && tables.overlaps(next, Some(next.id)) {
            return Err(AppError::Conflict(OVERLAP_CONFLICT.to_string()));
        }

        if let Some(update) = &transition.purchase {
            let matches = tables
                .purchases
                .get(&update.purchase_id)
                .is_some_and(|p| p.payment_status == update.expected_status);
            if !matches {
                return Err(AppError::Conflict(STALE_TRANSITION.to_string()));
            }
        }

        if let Some(update) = &transition.purchase {
            if let Some(purchase) = tables.purchases.get_mut(&update.purchase_id) {
                purchase.payment_status = update.new_status;
                purchase.transaction_ref = update.transaction_ref.clone();
                purchase.paid_at = update.paid_at;
            }
        }

        // The meeting may have been attached since the transition was computed.
        let meeting = tables.sessions.get(&next.id).and_then(|s| s.meeting.clone());
        let stored = Session { meeting: next.meeting.clone().or(meeting), ..next.clone() };
        tables.sessions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn attach_meeting(&self, session_id: Uuid, meeting: &MeetingRoom) -> Result<()> {
        match self.tables().sessions.get_mut(&session_id) {
            Some(session) => {
                session.meeting = Some(meeting.clone());
                Ok(())
            }
            None => Err(AppError::NotFound("Session".to_string())),
        }
    }

    async fn scheduled_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<Session>> {
        let mut sessions: Vec<_> = self
            .tables()
            .sessions
            .values()
            .filter(|s| {
                let start = s.session_date.and_time(s.start_time);
                s.status == SessionStatus::Scheduled && start > from && start <= to
            })
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.session_date, s.start_time));
        Ok(sessions)
    }

    async fn claim_reminder(&self, session_id: Uuid, stage: ReminderStage) -> Result<bool> {
        let mut tables = self.tables();
        match tables.sessions.get_mut(&session_id) {
            Some(s) if s.status == SessionStatus::Scheduled && s.reminder_stage < stage => {
                s.reminder_stage = stage;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut sessions: Vec<_> = self
            .tables()
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Pending && s.created_at < cutoff)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}
