use chrono::{NaiveDate, NaiveTime, Weekday};
use tokio_postgres::{GenericClient, Row};
use uuid::Uuid;

use crate::{
    db::column,
    error::{AppError, Result},
    models::availability::{weekday_from_i16, weekday_to_i16, AvailabilityWindow, Block},
};

fn row_to_window(row: &Row) -> Result<AvailabilityWindow> {
    let day: i16 = column(row, "day_of_week")?;
    Ok(AvailabilityWindow {
        id: column(row, "id")?,
        tutor_id: column(row, "tutor_id")?,
        day_of_week: weekday_from_i16(day)
            .ok_or_else(|| AppError::MissingData("day_of_week".to_string()))?,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        status: column(row, "status")?,
    })
}

fn row_to_block(row: &Row) -> Result<Block> {
    Ok(Block {
        id: column(row, "id")?,
        tutor_id: column(row, "tutor_id")?,
        block_date: column(row, "block_date")?,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        reason: column(row, "reason")?,
        status: column(row, "status")?,
    })
}

/// Active windows for one tutor and weekday, ordered by start.
pub async fn windows_for_day<C: GenericClient + Sync>(client: &C, tutor_id: &Uuid, day: Weekday) -> Result<Vec<AvailabilityWindow>> {
    let rows = client
        .query(
            r#"
            SELECT id, tutor_id, day_of_week, start_time, end_time, status
            FROM availability_windows
            WHERE tutor_id = $1 AND day_of_week = $2 AND status = 'active'
            ORDER BY start_time ASC
            "#,
            &[tutor_id, &weekday_to_i16(day)],
        )
        .await?;
    rows.iter().map(row_to_window).collect()
}

/// Every active window of a tutor.
pub async fn windows_for_tutor<C: GenericClient + Sync>(client: &C, tutor_id: &Uuid) -> Result<Vec<AvailabilityWindow>> {
    let rows = client
        .query(
            r#"
            SELECT id, tutor_id, day_of_week, start_time, end_time, status
            FROM availability_windows
            WHERE tutor_id = $1 AND status = 'active'
            ORDER BY day_of_week ASC, start_time ASC
            "#,
            &[tutor_id],
        )
        .await?;
    rows.iter().map(row_to_window).collect()
}

/// Whether an active window of that weekday overlaps `[start, end)`.
pub async fn window_overlaps<C: GenericClient + Sync>(
    client: &C,
    tutor_id: &Uuid,
    day: Weekday,
    start: &NaiveTime,
    end: &NaiveTime,
) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM availability_windows
                WHERE tutor_id = $1 AND day_of_week = $2 AND status = 'active'
                  AND start_time < $4 AND end_time > $3
            ) AS overlapping
            "#,
            &[tutor_id, &weekday_to_i16(day), start, end],
        )
        .await?;
    column(&row, "overlapping")
}

/// Inserts an availability window.
///
/// # Arguments
///
/// * `client` - The client or open transaction to write with.
/// * `window` - The window to store.
///
/// # Returns
///
/// A `Result` containing the stored `AvailabilityWindow`.
pub async fn insert_window<C: GenericClient + Sync>(client: &C, window: &AvailabilityWindow) -> Result<AvailabilityWindow> {
    let row = client
        .query_one(
            r#"
            INSERT INTO availability_windows (id, tutor_id, day_of_week, start_time, end_time, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tutor_id, day_of_week, start_time, end_time, status
            "#,
            &[
                &window.id,
                &window.tutor_id,
                &weekday_to_i16(window.day_of_week),
                &window.start_time,
                &window.end_time,
                &window.status,
            ],
        )
        .await?;
    row_to_window(&row)
}

/// Marks a tutor's window deleted. Returns rows updated.
pub async fn soft_delete_window<C: GenericClient + Sync>(client: &C, tutor_id: &Uuid, window_id: &Uuid) -> Result<u64> {
    let updated = client
        .execute(
            r#"
            UPDATE availability_windows SET status = 'deleted'
            WHERE id = $1 AND tutor_id = $2 AND status = 'active'
            "#,
            &[window_id, tutor_id],
        )
        .await?;
    Ok(updated)
}

/// Active blocks on one tutor's date.
pub async fn blocks_for_date<C: GenericClient + Sync>(client: &C, tutor_id: &Uuid, date: &NaiveDate) -> Result<Vec<Block>> {
    let rows = client
        .query(
            r#"
            SELECT id, tutor_id, block_date, start_time, end_time, reason, status
            FROM availability_blocks
            WHERE tutor_id = $1 AND block_date = $2 AND status = 'active'
            ORDER BY start_time ASC
            "#,
            &[tutor_id, date],
        )
        .await?;
    rows.iter().map(row_to_block).collect()
}

pub async fn insert_block<C: GenericClient + Sync>(client: &C, block: &Block) -> Result<Block> {
    let row = client
        .query_one(
            r#"
            INSERT INTO availability_blocks (id, tutor_id, block_date, start_time, end_time, reason, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, tutor_id, block_date, start_time, end_time, reason, status
            "#,
            &[
                &block.id,
                &block.tutor_id,
                &block.block_date,
                &block.start_time,
                &block.end_time,
                &block.reason,
                &block.status,
            ],
        )
        .await?;
    row_to_block(&row)
}

/// Marks a tutor's block deleted. Returns rows updated.
pub async fn soft_delete_block<C: GenericClient + Sync>(client: &C, tutor_id: &Uuid, block_id: &Uuid) -> Result<u64> {
    let updated = client
        .execute(
            r#"
            UPDATE availability_blocks SET status = 'deleted'
            WHERE id = $1 AND tutor_id = $2 AND status = 'active'
            "#,
            &[block_id, tutor_id],
        )
        .await?;
    Ok(updated)
}
