use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use deadpool_postgres::Pool;
use tokio_postgres::GenericClient;
use uuid::Uuid;

use super::{BookingStore, OVERLAP_CONFLICT, STALE_TRANSITION};
use crate::error::{AppError, Result};
use crate::models::availability::{weekday_to_i16, AvailabilityWindow, Block};
use crate::models::purchase::Purchase;
use crate::models::session::{MeetingRoom, ReminderStage, Session};
use crate::repositories::{availability as availability_repo, purchase as purchase_repo, session as session_repo};
use crate::scheduling::lifecycle::Transition;

/// Serialises writers touching the same tutor and day until the transaction ends.
async fn lock_tutor_day<C: GenericClient + Sync>(client: &C, tutor_id: &Uuid, day_key: &str) -> Result<()> {
    let key = format!("{}:{}", tutor_id, day_key);
    client
        .execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&key])
        .await?;
    Ok(())
}

/// `BookingStore` over PostgreSQL.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: Pool,
}

impl PgBookingStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn windows_for_day(&self, tutor_id: Uuid, day: Weekday) -> Result<Vec<AvailabilityWindow>> {
        let client = self.pool.get().await?;
        availability_repo::windows_for_day(&**client, &tutor_id, day).await
    }

    async fn windows_for_tutor(&self, tutor_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let client = self.pool.get().await?;
        availability_repo::windows_for_tutor(&**client, &tutor_id).await
    }

    async fn insert_window(&self, window: AvailabilityWindow) -> Result<AvailabilityWindow> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let day_key = format!("dow{}", weekday_to_i16(window.day_of_week));
        lock_tutor_day(&*tx, &window.tutor_id, &day_key).await?;

        if availability_repo::window_overlaps(
            &*tx,
            &window.tutor_id,
            window.day_of_week,
            &window.start_time,
            &window.end_time,
        )
        .await?
        {
            return Err(AppError::Conflict(
                "Availability window overlaps an existing window".to_string(),
            ));
        }

        let inserted = availability_repo::insert_window(&*tx, &window).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn delete_window(&self, tutor_id: Uuid, window_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        match availability_repo::soft_delete_window(&**client, &tutor_id, &window_id).await? {
            0 => Err(AppError::NotFound("Availability window".to_string())),
            _ => Ok(()),
        }
    }

    async fn blocks_for_date(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Block>> {
        let client = self.pool.get().await?;
        availability_repo::blocks_for_date(&**client, &tutor_id, &date).await
    }

    async fn insert_block(&self, block: Block) -> Result<Block> {
        let client = self.pool.get().await?;
        availability_repo::insert_block(&**client, &block).await
    }

    async fn delete_block(&self, tutor_id: Uuid, block_id: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        match availability_repo::soft_delete_block(&**client, &tutor_id, &block_id).await? {
            0 => Err(AppError::NotFound("Block".to_string())),
            _ => Ok(()),
        }
    }

    async fn occupying_sessions(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        session_repo::occupying_for_date(&**client, &tutor_id, &date).await
    }

    async fn create_booking(&self, session: Session, purchase: Purchase) -> Result<(Session, Purchase)> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        lock_tutor_day(&*tx, &session.tutor_id, &session.session_date.to_string()).await?;

        if session_repo::has_overlap(
            &*tx,
            &session.tutor_id,
            &session.session_date,
            &session.start_time,
            &session.end_time,
            None,
        )
        .await?
        {
            // Dropping the transaction rolls it back.
            tracing::warn!(
                tutor = %session.tutor_id,
                date = %session.session_date,
                "Overlapping session found inside booking transaction"
            );
            return Err(AppError::Conflict(OVERLAP_CONFLICT.to_string()));
        }

        let mut inserted = session_repo::insert(&*tx, &Session { purchase_id: None, ..session }).await?;
        let purchase = purchase_repo::insert(&*tx, &Purchase { session_id: Some(inserted.id), ..purchase }).await?;
        session_repo::link_purchase(&*tx, &inserted.id, &purchase.id).await?;
        inserted.purchase_id = Some(purchase.id);

        tx.commit().await?;
        Ok((inserted, purchase))
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        session_repo::find_by_id(&**client, &session_id).await
    }

    async fn find_purchase(&self, purchase_id: Uuid) -> Result<Option<Purchase>> {
        let client = self.pool.get().await?;
        purchase_repo::find_by_id(&**client, &purchase_id).await
    }

    async fn sessions_for_account(&self, account_id: Uuid) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        session_repo::list_for_account(&**client, &account_id).await
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<Session> {
        let next = &transition.session;
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        if transition.recheck_overlap {
            lock_tutor_day(&*tx, &next.tutor_id, &next.session_date.to_string()).await?;
            if session_repo::has_overlap(
                &*tx,
                &next.tutor_id,
                &next.session_date,
                &next.start_time,
                &next.end_time,
                Some(next.id),
            )
            .await?
            {
                return Err(AppError::Conflict(OVERLAP_CONFLICT.to_string()));
            }
        }

        if session_repo::update_if_status(&*tx, next, transition.expected_status).await? == 0 {
            return Err(AppError::Conflict(STALE_TRANSITION.to_string()));
        }

        if let Some(update) = &transition.purchase {
            if purchase_repo::update_status_if(&*tx, update).await? == 0 {
                return Err(AppError::Conflict(STALE_TRANSITION.to_string()));
            }
        }

        tx.commit().await?;
        Ok(next.clone())
    }

    async fn attach_meeting(&self, session_id: Uuid, meeting: &MeetingRoom) -> Result<()> {
        let client = self.pool.get().await?;
        match session_repo::attach_meeting(&**client, &session_id, meeting).await? {
            0 => Err(AppError::NotFound("Session".to_string())),
            _ => Ok(()),
        }
    }

    async fn scheduled_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        session_repo::scheduled_between(&**client, &from, &to).await
    }

    async fn claim_reminder(&self, session_id: Uuid, stage: ReminderStage) -> Result<bool> {
        let client = self.pool.get().await?;
        session_repo::claim_reminder(&**client, &session_id, stage).await
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let client = self.pool.get().await?;
        session_repo::pending_created_before(&**client, &cutoff).await
    }
}
