mod memory;
mod postgres;

pub use self::memory::InMemoryBookingStore;
pub use self::postgres::PgBookingStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use uuid::Uuid;

use crate::error::Result;
use crate::models::availability::{AvailabilityWindow, Block};
use crate::models::purchase::Purchase;
use crate::models::session::{MeetingRoom, ReminderStage, Session};
use crate::scheduling::lifecycle::Transition;

pub const OVERLAP_CONFLICT: &str = "This time slot conflicts with an existing booking";
pub const STALE_TRANSITION: &str = "The session was changed by another request, please reload and retry";

/// Durable booking state. Each method is one atomic unit: multi-row writes
/// run in a single transaction and apply all of their rows or none.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Active windows for one tutor and weekday, ordered by start.
    async fn windows_for_day(&self, tutor_id: Uuid, day: Weekday) -> Result<Vec<AvailabilityWindow>>;

    /// Every active window of a tutor.
    async fn windows_for_tutor(&self, tutor_id: Uuid) -> Result<Vec<AvailabilityWindow>>;

    /// Inserts a window unless it overlaps an active one on the same weekday (Conflict).
    async fn insert_window(&self, window: AvailabilityWindow) -> Result<AvailabilityWindow>;

    /// Soft-deletes a tutor's window (NotFound if absent).
    async fn delete_window(&self, tutor_id: Uuid, window_id: Uuid) -> Result<()>;

    async fn blocks_for_date(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Block>>;

    async fn insert_block(&self, block: Block) -> Result<Block>;

    /// Soft-deletes a tutor's block (NotFound if absent).
    async fn delete_block(&self, tutor_id: Uuid, block_id: Uuid) -> Result<()>;

    /// Pending and scheduled sessions of a tutor on a date.
    async fn occupying_sessions(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Session>>;

    /// Re-checks overlap, inserts the session and its purchase and links them.
    ///
    /// Fails with Conflict when an occupying session overlaps the interval.
    async fn create_booking(&self, session: Session, purchase: Purchase) -> Result<(Session, Purchase)>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>>;

    async fn find_purchase(&self, purchase_id: Uuid) -> Result<Option<Purchase>>;

    /// Sessions where the account is student or tutor, newest first.
    async fn sessions_for_account(&self, account_id: Uuid) -> Result<Vec<Session>>;

    /// Writes a lifecycle transition.
    ///
    /// The session must still be in `expected_status` and any purchase in its
    /// expected status, otherwise Conflict. With `recheck_overlap` the new
    /// interval is checked against other occupying sessions first.
    async fn apply_transition(&self, transition: &Transition) -> Result<Session>;

    async fn attach_meeting(&self, session_id: Uuid, meeting: &MeetingRoom) -> Result<()>;

    /// Scheduled sessions whose local start lies in `(from, to]`.
    async fn scheduled_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<Session>>;

    /// Moves the reminder stage forward; true only for the caller that moved it.
    async fn claim_reminder(&self, session_id: Uuid, stage: ReminderStage) -> Result<bool>;

    /// Pending reservations created before `cutoff`.
    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>>;
}
