use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::{GenericClient, Row};
use uuid::Uuid;

use crate::{
    db::column,
    error::Result,
    models::session::{MeetingRoom, ReminderStage, Session, SessionStatus},
};

const SESSION_COLUMNS: &str = r#"
    id, student_id, tutor_id, session_date, start_time, end_time, duration_minutes,
    amount_cents, purchase_id, status, notes, kind, cancelled_at, cancelled_by,
    cancellation_reason, reminder_stage, meeting_id, meeting_join_url, meeting_start_url,
    meeting_passcode, created_at, updated_at
"#;

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    let meeting_id: Option<String> = column(row, "meeting_id")?;
    let meeting = match meeting_id {
        Some(meeting_id) => Some(MeetingRoom {
            meeting_id,
            join_url: column::<Option<String>>(row, "meeting_join_url")?.unwrap_or_default(),
            start_url: column::<Option<String>>(row, "meeting_start_url")?.unwrap_or_default(),
            passcode: column(row, "meeting_passcode")?,
        }),
        None => None,
    };

    Ok(Session {
        id: column(row, "id")?,
        student_id: column(row, "student_id")?,
        tutor_id: column(row, "tutor_id")?,
        session_date: column(row, "session_date")?,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        duration_minutes: column(row, "duration_minutes")?,
        amount_cents: column(row, "amount_cents")?,
        purchase_id: column(row, "purchase_id")?,
        status: column(row, "status")?,
        notes: column(row, "notes")?,
        kind: column(row, "kind")?,
        cancelled_at: column(row, "cancelled_at")?,
        cancelled_by: column(row, "cancelled_by")?,
        cancellation_reason: column(row, "cancellation_reason")?,
        reminder_stage: ReminderStage::from_i16(column(row, "reminder_stage")?),
        meeting,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn rows_to_sessions(rows: Vec<Row>) -> Result<Vec<Session>> {
    rows.iter().map(row_to_session).collect()
}

/// Inserts a session row.
///
/// # Arguments
///
/// * `client` - The client or open transaction to write with.
/// * `session` - The session to store.
///
/// # Returns
///
/// A `Result` containing the stored `Session`.
pub async fn insert<C: GenericClient + Sync>(client: &C, session: &Session) -> Result<Session> {
    let row = client
        .query_one(
            &*format!(
                r#"
                INSERT INTO sessions (
                    id, student_id, tutor_id, session_date, start_time, end_time,
                    duration_minutes, amount_cents, purchase_id, status, notes, kind,
                    reminder_stage, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                RETURNING {SESSION_COLUMNS}
                "#
            ),
            &[
                &session.id,
                &session.student_id,
                &session.tutor_id,
                &session.session_date,
                &session.start_time,
                &session.end_time,
                &session.duration_minutes,
                &session.amount_cents,
                &session.purchase_id,
                &session.status,
                &session.notes,
                &session.kind,
                &session.reminder_stage.as_i16(),
                &session.created_at,
                &session.updated_at,
            ],
        )
        .await?;
    row_to_session(&row)
}

/// Finds a session by its ID.
pub async fn find_by_id<C: GenericClient + Sync>(client: &C, session_id: &Uuid) -> Result<Option<Session>> {
    let row = client
        .query_opt(
            &*format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"),
            &[session_id],
        )
        .await?;
    row.map(|r| row_to_session(&r)).transpose()
}

/// Sessions that hold their interval (pending or scheduled) on a tutor's date.
pub async fn occupying_for_date<C: GenericClient + Sync>(
    client: &C,
    tutor_id: &Uuid,
    date: &NaiveDate,
) -> Result<Vec<Session>> {
    let rows = client
        .query(
            &*format!(
                r#"
                SELECT {SESSION_COLUMNS}
                FROM sessions
                WHERE tutor_id = $1 AND session_date = $2 AND status IN ('pending', 'scheduled')
                ORDER BY start_time ASC
                "#
            ),
            &[tutor_id, date],
        )
        .await?;
    rows_to_sessions(rows)
}

/// Whether any occupying session overlaps `[start, end)` on the tutor's date.
///
/// # Arguments
///
/// * `client` - The client or open transaction to query with.
/// * `tutor_id` - The tutor whose day is checked.
/// * `date` - The session date.
/// * `start` - The start of the requested interval.
/// * `end` - The end of the requested interval.
/// * `exclude` - A session to ignore, used when that session is moving.
///
/// # Returns
///
/// A `Result` containing `true` when the interval is taken.
pub async fn has_overlap<C: GenericClient + Sync>(
    client: &C,
    tutor_id: &Uuid,
    date: &NaiveDate,
    start: &NaiveTime,
    end: &NaiveTime,
    exclude: Option<Uuid>,
) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE tutor_id = $1
                  AND session_date = $2
                  AND status IN ('pending', 'scheduled')
                  AND start_time < $4
                  AND end_time > $3
                  AND ($5::uuid IS NULL OR id <> $5)
            ) AS taken
            "#,
            &[tutor_id, date, start, end, &exclude],
        )
        .await?;
    column(&row, "taken")
}

/// Points a session at its purchase.
pub async fn link_purchase<C: GenericClient + Sync>(client: &C, session_id: &Uuid, purchase_id: &Uuid) -> Result<()> {
    client
        .execute(
            "UPDATE sessions SET purchase_id = $1 WHERE id = $2",
            &[purchase_id, session_id],
        )
        .await?;
    Ok(())
}

/// Writes the mutable fields of `session` if the stored status is still `expected`.
///
/// Returns the number of rows updated (0 or 1).
pub async fn update_if_status<C: GenericClient + Sync>(
    client: &C,
    session: &Session,
    expected: SessionStatus,
) -> Result<u64> {
    let updated = client
        .execute(
            r#"
            UPDATE sessions
            SET
                session_date = $3,
                start_time = $4,
                end_time = $5,
                duration_minutes = $6,
                status = $7,
                cancelled_at = $8,
                cancelled_by = $9,
                cancellation_reason = $10,
                reminder_stage = $11,
                updated_at = $12
            WHERE id = $1 AND status = $2
            "#,
            &[
                &session.id,
                &expected,
                &session.session_date,
                &session.start_time,
                &session.end_time,
                &session.duration_minutes,
                &session.status,
                &session.cancelled_at,
                &session.cancelled_by,
                &session.cancellation_reason,
                &session.reminder_stage.as_i16(),
                &session.updated_at,
            ],
        )
        .await?;
    Ok(updated)
}

/// Stores the meeting room returned by the meeting service.
pub async fn attach_meeting<C: GenericClient + Sync>(client: &C, session_id: &Uuid, meeting: &MeetingRoom) -> Result<u64> {
    let updated = client
        .execute(
            r#"
            UPDATE sessions
            SET meeting_id = $2, meeting_join_url = $3, meeting_start_url = $4,
                meeting_passcode = $5, updated_at = NOW()
            WHERE id = $1
            "#,
            &[
                session_id,
                &meeting.meeting_id,
                &meeting.join_url,
                &meeting.start_url,
                &meeting.passcode,
            ],
        )
        .await?;
    Ok(updated)
}

/// Sessions an account takes part in, newest first.
pub async fn list_for_account<C: GenericClient + Sync>(client: &C, account_id: &Uuid) -> Result<Vec<Session>> {
    let rows = client
        .query(
            &*format!(
                r#"
                SELECT {SESSION_COLUMNS}
                FROM sessions
                WHERE student_id = $1 OR tutor_id = $1
                ORDER BY session_date DESC, start_time DESC
                "#
            ),
            &[account_id],
        )
        .await?;
    rows_to_sessions(rows)
}

/// Scheduled sessions whose local start lies in `(from, to]`.
pub async fn scheduled_between<C: GenericClient + Sync>(
    client: &C,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> Result<Vec<Session>> {
    let rows = client
        .query(
            &*format!(
                r#"
                SELECT {SESSION_COLUMNS}
                FROM sessions
                WHERE status = 'scheduled'
                  AND (session_date + start_time) > $1
                  AND (session_date + start_time) <= $2
                ORDER BY session_date ASC, start_time ASC
                "#
            ),
            &[from, to],
        )
        .await?;
    rows_to_sessions(rows)
}

/// Advances the reminder stage; true only for the caller that moved it.
pub async fn claim_reminder<C: GenericClient + Sync>(client: &C, session_id: &Uuid, stage: ReminderStage) -> Result<bool> {
    let updated = client
        .execute(
            r#"
            UPDATE sessions
            SET reminder_stage = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'scheduled' AND reminder_stage < $2
            "#,
            &[session_id, &stage.as_i16()],
        )
        .await?;
    Ok(updated == 1)
}

/// Pending reservations created before `cutoff`.
pub async fn pending_created_before<C: GenericClient + Sync>(client: &C, cutoff: &DateTime<Utc>) -> Result<Vec<Session>> {
    let rows = client
        .query(
            &*format!(
                r#"
                SELECT {SESSION_COLUMNS}
                FROM sessions
                WHERE status = 'pending' AND created_at < $1
                ORDER BY created_at ASC
                "#
            ),
            &[cutoff],
        )
        .await?;
    rows_to_sessions(rows)
}
