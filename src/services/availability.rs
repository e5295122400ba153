use std::sync::Arc;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveTime, Weekday};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SlotSettings;
use crate::error::{AppError, Result};
use crate::integrations::accounts::AccountDirectory;
use crate::models::account::{Account, Tutor};
use crate::models::availability::{AvailabilityWindow, Block, RecordStatus};
use crate::models::session::to_local;
use crate::models::slot::{is_whole_minute, BookableSlot, TimeRange};
use crate::scheduling::slots;
use crate::store::BookingStore;

/// Tutor availability and the slot query built on it.
#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn BookingStore>,
    directory: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
    settings: SlotSettings,
    offset: FixedOffset,
}

fn require_ordered(start: NaiveTime, end: NaiveTime) -> Result<TimeRange> {
    if !is_whole_minute(start) || !is_whole_minute(end) {
        return Err(AppError::BadRequest("Times must be whole minutes".to_string()));
    }
    if start >= end {
        return Err(AppError::BadRequest("Start time must be before end time".to_string()));
    }
    Ok(TimeRange::new(start, end))
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        directory: Arc<dyn AccountDirectory>,
        clock: Arc<dyn Clock>,
        settings: SlotSettings,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            settings,
            offset,
        }
    }

    pub fn settings(&self) -> &SlotSettings {
        &self.settings
    }

    pub async fn require_tutor(&self, tutor_id: Uuid) -> Result<Tutor> {
        self.directory
            .find_tutor(tutor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Tutor".to_string()))
    }

    pub async fn require_account(&self, account_id: Uuid) -> Result<Account> {
        self.directory
            .find_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account".to_string()))
    }

    /// Slots a student can book with the tutor on `date`, in start order.
    ///
    /// Past dates yield nothing; for today only slots that have not started are kept.
    pub async fn bookable_slots(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<BookableSlot>> {
        self.bookable_slots_excluding(tutor_id, date, None).await
    }

    /// Like [`bookable_slots`](Self::bookable_slots), ignoring one session's own interval.
    ///
    /// Used when a session moves: the interval it is leaving must not count against it.
    pub async fn bookable_slots_excluding(
        &self,
        tutor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Vec<BookableSlot>> {
        let tutor = self.require_tutor(tutor_id).await?;

        let now = to_local(self.clock.now(), &self.offset);
        if date < now.date() {
            return Ok(Vec::new());
        }

        let windows: Vec<TimeRange> = self
            .store
            .windows_for_day(tutor_id, date.weekday())
            .await?
            .iter()
            .map(AvailabilityWindow::range)
            .collect();
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let occupied: Vec<TimeRange> = self
            .store
            .occupying_sessions(tutor_id, date)
            .await?
            .iter()
            .filter(|s| Some(s.id) != exclude)
            .map(|s| s.interval())
            .collect();

        let blocks: Vec<TimeRange> = self
            .store
            .blocks_for_date(tutor_id, date)
            .await?
            .iter()
            .map(Block::range)
            .collect();

        let mut offered = slots::bookable_slots(&windows, &occupied, &blocks, &self.settings, tutor.hourly_rate_cents);
        if date == now.date() {
            offered.retain(|slot| slot.start > now.time());
        }

        tracing::debug!(tutor = %tutor_id, %date, count = offered.len(), "bookable slots computed");
        Ok(offered)
    }

    /// Whether `range` sits inside an active window and clear of every active block.
    pub async fn ensure_within_availability(&self, tutor_id: Uuid, date: NaiveDate, range: TimeRange) -> Result<()> {
        let windows = self.store.windows_for_day(tutor_id, date.weekday()).await?;
        if !windows.iter().any(|w| w.range().contains(&range)) {
            return Err(AppError::Conflict(
                "The requested time is outside the tutor's availability".to_string(),
            ));
        }

        let blocks = self.store.blocks_for_date(tutor_id, date).await?;
        if blocks.iter().any(|b| b.range().overlaps(&range)) {
            return Err(AppError::Conflict(
                "The tutor is unavailable at the requested time".to_string(),
            ));
        }

        Ok(())
    }

    pub async fn list_windows(&self, tutor_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        self.store.windows_for_tutor(tutor_id).await
    }

    /// Opens a weekly window for a tutor.
    ///
    /// # Arguments
    ///
    /// * `tutor_id` - The tutor who owns the window.
    /// * `day_of_week` - The weekday it repeats on.
    /// * `start` - The window start, in whole minutes.
    /// * `end` - The window end, in whole minutes.
    ///
    /// # Returns
    ///
    /// A `Result` containing the stored `AvailabilityWindow`.
    pub async fn add_window(
        &self,
        tutor_id: Uuid,
        day_of_week: Weekday,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<AvailabilityWindow> {
        require_ordered(start, end)?;
        self.require_tutor(tutor_id).await?;

        let window = self
            .store
            .insert_window(AvailabilityWindow {
                id: Uuid::new_v4(),
                tutor_id,
                day_of_week,
                start_time: start,
                end_time: end,
                status: RecordStatus::Active,
            })
            .await?;

        tracing::info!(tutor = %tutor_id, window = %window.id, day = ?day_of_week, "availability window added");
        Ok(window)
    }

    pub async fn remove_window(&self, tutor_id: Uuid, window_id: Uuid) -> Result<()> {
        self.store.delete_window(tutor_id, window_id).await?;
        tracing::info!(tutor = %tutor_id, window = %window_id, "availability window removed");
        Ok(())
    }

    pub async fn blocks_for_date(&self, tutor_id: Uuid, date: NaiveDate) -> Result<Vec<Block>> {
        self.store.blocks_for_date(tutor_id, date).await
    }

    pub async fn add_block(
        &self,
        tutor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        reason: Option<String>,
    ) -> Result<Block> {
        require_ordered(start, end)?;
        self.require_tutor(tutor_id).await?;

        let block = self
            .store
            .insert_block(Block {
                id: Uuid::new_v4(),
                tutor_id,
                block_date: date,
                start_time: start,
                end_time: end,
                reason,
                status: RecordStatus::Active,
            })
            .await?;

        tracing::info!(tutor = %tutor_id, block = %block.id, %date, "availability block added");
        Ok(block)
    }

    pub async fn remove_block(&self, tutor_id: Uuid, block_id: Uuid) -> Result<()> {
        self.store.delete_block(tutor_id, block_id).await?;
        tracing::info!(tutor = %tutor_id, block = %block_id, "availability block removed");
        Ok(())
    }
}
