use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::LifecyclePolicy;
use crate::error::{AppError, Result};
use crate::models::purchase::{PaymentStatus, Purchase, PurchaseUpdate};
use crate::models::session::{ReminderStage, Session, SessionStatus};
use crate::models::slot::TimeRange;
use crate::scheduling::effects::{EmailTemplate, NotificationKind, ScheduleSnapshot, SideEffect};

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A student or tutor acting through the regular flow.
    Participant(Uuid),
    /// An administrator; bypasses elapsed-time floors.
    Admin(Uuid),
}

impl Actor {
    pub fn account_id(&self) -> Uuid {
        match self {
            Actor::Participant(id) | Actor::Admin(id) => *id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

/// The instant and rules a transition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext {
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
    pub policy: LifecyclePolicy,
}

impl PolicyContext {
    pub fn until_start(&self, session: &Session) -> Duration {
        session.starts_at(&self.offset) - self.now
    }
}

/// A computed, not yet persisted, change to one session, with the side
/// effects to run once it is committed.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The record as it must look after commit.
    pub session: Session,
    /// The status the stored record must still have for the write to apply.
    pub expected_status: SessionStatus,
    pub purchase: Option<PurchaseUpdate>,
    /// Re-run the overlap check inside the write transaction.
    pub recheck_overlap: bool,
    pub effects: Vec<SideEffect>,
}

/// Read-only view of whether a session may be cancelled right now.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationPolicy {
    pub session_id: Uuid,
    pub hours_until_start: f64,
    pub can_cancel: bool,
    pub refund_eligible: bool,
    pub minimum_notice_hours: i64,
    pub refund_notice_hours: i64,
    pub reason: Option<String>,
}

/// Read-only view of whether a session may be rescheduled right now.
#[derive(Debug, Clone, Serialize)]
pub struct ReschedulePolicy {
    pub session_id: Uuid,
    pub hours_until_start: f64,
    pub can_reschedule: bool,
    pub minimum_notice_hours: i64,
    pub reason: Option<String>,
}

fn hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

/// Participants may look at and act on their own sessions; admins on any.
pub fn authorize(session: &Session, actor: &Actor) -> Result<()> {
    match actor {
        Actor::Admin(_) => Ok(()),
        Actor::Participant(id) if session.is_participant(*id) => Ok(()),
        Actor::Participant(_) => Err(AppError::Forbidden(
            "You are not a participant of this session".to_string(),
        )),
    }
}

fn require_status(session: &Session, expected: SessionStatus, action: &str) -> Result<()> {
    if session.status != expected {
        return Err(AppError::BadRequest(format!(
            "Only {} sessions can be {} (current status: {})",
            expected.as_str(),
            action,
            session.status.as_str()
        )));
    }
    Ok(())
}

fn refund_eligible(purchase: Option<&Purchase>, until_start: Duration, actor: &Actor, policy: &LifecyclePolicy) -> bool {
    let completed = purchase.is_some_and(|p| p.payment_status == PaymentStatus::Completed);
    completed && (actor.is_admin() || until_start >= policy.refund_threshold)
}

pub fn cancellation_policy(session: &Session, purchase: Option<&Purchase>, ctx: &PolicyContext) -> CancellationPolicy {
    let until_start = ctx.until_start(session);
    let reason = if session.status != SessionStatus::Scheduled {
        Some(format!("Session is {}", session.status.as_str()))
    } else if until_start < ctx.policy.cancel_floor {
        Some(format!(
            "Sessions cannot be cancelled less than {} hours before they start",
            ctx.policy.cancel_floor.num_hours()
        ))
    } else {
        None
    };
    let can_cancel = reason.is_none();

    CancellationPolicy {
        session_id: session.id,
        hours_until_start: hours(until_start),
        can_cancel,
        refund_eligible: can_cancel
            && refund_eligible(purchase, until_start, &Actor::Participant(session.student_id), &ctx.policy),
        minimum_notice_hours: ctx.policy.cancel_floor.num_hours(),
        refund_notice_hours: ctx.policy.refund_threshold.num_hours(),
        reason,
    }
}

pub fn reschedule_policy(session: &Session, ctx: &PolicyContext) -> ReschedulePolicy {
    let until_start = ctx.until_start(session);
    let reason = if session.status != SessionStatus::Scheduled {
        Some(format!("Session is {}", session.status.as_str()))
    } else if until_start < ctx.policy.reschedule_floor {
        Some(format!(
            "Sessions cannot be rescheduled less than {} hours before they start",
            ctx.policy.reschedule_floor.num_hours()
        ))
    } else {
        None
    };

    ReschedulePolicy {
        session_id: session.id,
        hours_until_start: hours(until_start),
        can_reschedule: reason.is_none(),
        minimum_notice_hours: ctx.policy.reschedule_floor.num_hours(),
        reason,
    }
}

fn notify_both(session: &Session, title: &str, body: String, kind: NotificationKind) -> Vec<SideEffect> {
    vec![
        SideEffect::notify(session.student_id, title, body.clone(), kind),
        SideEffect::notify(session.tutor_id, title, body, kind),
    ]
}

fn email_both(session: &Session, template: EmailTemplate) -> Vec<SideEffect> {
    vec![
        SideEffect::email(session.student_id, session.id, template.clone()),
        SideEffect::email(session.tutor_id, session.id, template),
    ]
}

/// Cancels a scheduled session.
///
/// Participants are held to the cancellation floor and only get a refund
/// when cancelling at least the refund threshold ahead. Admins bypass the
/// floor and always refund a completed purchase.
pub fn cancel(
    session: &Session,
    purchase: Option<&Purchase>,
    actor: &Actor,
    reason: Option<String>,
    ctx: &PolicyContext,
) -> Result<Transition> {
    authorize(session, actor)?;
    require_status(session, SessionStatus::Scheduled, "cancelled")?;

    let until_start = ctx.until_start(session);
    if !actor.is_admin() && until_start < ctx.policy.cancel_floor {
        return Err(AppError::BadRequest(format!(
            "Sessions cannot be cancelled less than {} hours before they start",
            ctx.policy.cancel_floor.num_hours()
        )));
    }

    let refund = refund_eligible(purchase, until_start, actor, &ctx.policy);
    let purchase_update = match purchase {
        Some(p) if refund => Some(PurchaseUpdate {
            purchase_id: p.id,
            expected_status: PaymentStatus::Completed,
            new_status: PaymentStatus::Refunded,
            transaction_ref: p.transaction_ref.clone(),
            paid_at: p.paid_at,
        }),
        _ => None,
    };

    let mut next = session.clone();
    next.status = SessionStatus::Cancelled;
    next.cancelled_at = Some(ctx.now);
    next.cancelled_by = Some(actor.account_id());
    next.cancellation_reason = reason;
    next.updated_at = ctx.now;

    let schedule = ScheduleSnapshot::of(session);
    let refund_note = if refund {
        "A full refund has been issued."
    } else {
        "This cancellation is not eligible for a refund."
    };
    let mut effects = notify_both(
        session,
        "Session cancelled",
        format!("The session on {} was cancelled. {}", schedule, refund_note),
        NotificationKind::Cancellation,
    );
    effects.extend(email_both(
        session,
        EmailTemplate::Cancellation { schedule, refund_issued: refund },
    ));

    Ok(Transition {
        session: next,
        expected_status: SessionStatus::Scheduled,
        purchase: purchase_update,
        recheck_overlap: false,
        effects,
    })
}

/// Moves a scheduled session to a new date and interval, keeping its identity.
///
/// Whether the new interval is offered by the tutor is checked by the caller;
/// the write itself re-checks overlaps.
pub fn reschedule(
    session: &Session,
    actor: &Actor,
    new_date: NaiveDate,
    new_range: TimeRange,
    ctx: &PolicyContext,
) -> Result<Transition> {
    authorize(session, actor)?;
    require_status(session, SessionStatus::Scheduled, "rescheduled")?;

    if new_range.start >= new_range.end {
        return Err(AppError::BadRequest("Start time must be before end time".to_string()));
    }

    if !actor.is_admin() && ctx.until_start(session) < ctx.policy.reschedule_floor {
        return Err(AppError::BadRequest(format!(
            "Sessions cannot be rescheduled less than {} hours before they start",
            ctx.policy.reschedule_floor.num_hours()
        )));
    }

    let mut next = session.clone();
    next.session_date = new_date;
    next.start_time = new_range.start;
    next.end_time = new_range.end;
    next.duration_minutes = new_range.duration_minutes();
    next.reminder_stage = ReminderStage::None;
    next.updated_at = ctx.now;

    if next.starts_at(&ctx.offset) <= ctx.now {
        return Err(AppError::BadRequest("Cannot reschedule into the past".to_string()));
    }

    let previous = ScheduleSnapshot::of(session);
    let current = ScheduleSnapshot::of(&next);
    let mut effects = notify_both(
        session,
        "Session rescheduled",
        format!("The session on {} moved to {}.", previous, current),
        NotificationKind::Reschedule,
    );
    effects.extend(email_both(session, EmailTemplate::Reschedule { previous, current }));

    Ok(Transition {
        session: next,
        expected_status: SessionStatus::Scheduled,
        purchase: None,
        recheck_overlap: true,
        effects,
    })
}

/// Settles a pending reservation as paid.
pub fn confirm_payment(
    session: &Session,
    purchase: Option<&Purchase>,
    payment_ref: &str,
    ctx: &PolicyContext,
) -> Result<Transition> {
    require_status(session, SessionStatus::Pending, "confirmed")?;

    let purchase = purchase
        .ok_or_else(|| AppError::BadRequest("Session has no purchase to settle".to_string()))?;
    if purchase.payment_status != PaymentStatus::Pending {
        return Err(AppError::BadRequest(format!(
            "Purchase {} is already settled",
            purchase.order_number
        )));
    }

    let mut next = session.clone();
    next.status = SessionStatus::Scheduled;
    next.updated_at = ctx.now;

    let schedule = ScheduleSnapshot::of(session);
    let mut effects = vec![SideEffect::CreateMeeting {
        session_id: session.id,
        tutor_id: session.tutor_id,
        date: session.session_date,
        start_time: session.start_time,
        duration_minutes: session.duration_minutes,
    }];
    effects.extend(notify_both(
        session,
        "Session booked",
        format!("Your session on {} is confirmed.", schedule),
        NotificationKind::Booking,
    ));
    effects.extend(email_both(session, EmailTemplate::BookingConfirmation { schedule }));

    Ok(Transition {
        session: next,
        expected_status: SessionStatus::Pending,
        purchase: Some(PurchaseUpdate {
            purchase_id: purchase.id,
            expected_status: PaymentStatus::Pending,
            new_status: PaymentStatus::Completed,
            transaction_ref: Some(payment_ref.to_string()),
            paid_at: Some(ctx.now),
        }),
        recheck_overlap: false,
        effects,
    })
}

/// Releases a pending reservation whose payment did not go through.
///
/// Used both for provider failures and for reservations that outlived their hold.
pub fn abandon_reservation(
    session: &Session,
    purchase: Option<&Purchase>,
    reason: &str,
    ctx: &PolicyContext,
) -> Result<Transition> {
    require_status(session, SessionStatus::Pending, "abandoned")?;

    let mut next = session.clone();
    next.status = SessionStatus::Cancelled;
    next.cancelled_at = Some(ctx.now);
    next.cancelled_by = None;
    next.cancellation_reason = Some(reason.to_string());
    next.updated_at = ctx.now;

    let purchase_update = purchase
        .filter(|p| p.payment_status == PaymentStatus::Pending)
        .map(|p| PurchaseUpdate {
            purchase_id: p.id,
            expected_status: PaymentStatus::Pending,
            new_status: PaymentStatus::Failed,
            transaction_ref: p.transaction_ref.clone(),
            paid_at: None,
        });

    let schedule = ScheduleSnapshot::of(session);
    let effects = vec![
        SideEffect::notify(
            session.student_id,
            "Booking not completed",
            format!("Your reservation for {} was released: {}.", schedule, reason),
            NotificationKind::Payment,
        ),
        SideEffect::email(session.student_id, session.id, EmailTemplate::PaymentFailed { schedule }),
    ];

    Ok(Transition {
        session: next,
        expected_status: SessionStatus::Pending,
        purchase: purchase_update,
        recheck_overlap: false,
        effects,
    })
}

fn require_tutor_or_admin(session: &Session, actor: &Actor) -> Result<()> {
    match actor {
        Actor::Admin(_) => Ok(()),
        Actor::Participant(id) if *id == session.tutor_id => Ok(()),
        Actor::Participant(_) => Err(AppError::Forbidden(
            "Only the tutor can close out a session".to_string(),
        )),
    }
}

/// Marks a session as taught, once it has ended.
pub fn complete(session: &Session, actor: &Actor, ctx: &PolicyContext) -> Result<Transition> {
    require_tutor_or_admin(session, actor)?;
    require_status(session, SessionStatus::Scheduled, "completed")?;

    if ctx.now < session.ends_at(&ctx.offset) {
        return Err(AppError::BadRequest("Session has not ended yet".to_string()));
    }

    close_out(session, SessionStatus::Completed, "Session completed", ctx)
}

/// Marks a session as missed by the student, once it has started.
pub fn mark_no_show(session: &Session, actor: &Actor, ctx: &PolicyContext) -> Result<Transition> {
    require_tutor_or_admin(session, actor)?;
    require_status(session, SessionStatus::Scheduled, "marked as no-show")?;

    if ctx.now < session.starts_at(&ctx.offset) {
        return Err(AppError::BadRequest("Session has not started yet".to_string()));
    }

    close_out(session, SessionStatus::NoShow, "Session marked as no-show", ctx)
}

fn close_out(session: &Session, status: SessionStatus, title: &str, ctx: &PolicyContext) -> Result<Transition> {
    let mut next = session.clone();
    next.status = status;
    next.updated_at = ctx.now;

    let effects = vec![SideEffect::notify(
        session.student_id,
        title,
        format!("Your session on {} is now {}.", ScheduleSnapshot::of(session), status.as_str()),
        NotificationKind::SessionUpdate,
    )];

    Ok(Transition {
        session: next,
        expected_status: SessionStatus::Scheduled,
        purchase: None,
        recheck_overlap: false,
        effects,
    })
}

/// Which reminder a scheduled session is due for, if any.
///
/// A session first seen inside the hour horizon skips the day reminder.
pub fn due_reminder(session: &Session, ctx: &PolicyContext) -> Option<ReminderStage> {
    if session.status != SessionStatus::Scheduled {
        return None;
    }

    let until_start = ctx.until_start(session);
    if until_start <= Duration::zero() {
        return None;
    }

    let due = if until_start <= Duration::hours(1) {
        ReminderStage::Hour
    } else if until_start <= Duration::hours(24) {
        ReminderStage::Day
    } else {
        return None;
    };

    (due > session.reminder_stage).then_some(due)
}

pub fn reminder_effects(session: &Session, stage: ReminderStage) -> Vec<SideEffect> {
    let schedule = ScheduleSnapshot::of(session);
    let when = match stage {
        ReminderStage::Hour => "in less than an hour",
        _ => "within the next 24 hours",
    };

    vec![
        SideEffect::email(session.student_id, session.id, EmailTemplate::Reminder { schedule, stage }),
        SideEffect::notify(
            session.student_id,
            "Upcoming session",
            format!("Your session on {} starts {}.", schedule, when),
            NotificationKind::Reminder,
        ),
    ]
}
