use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday};
use uuid::Uuid;

use tutorbook::error::AppError;
use tutorbook::locks::SlotLockKey;
use tutorbook::models::account::AccountRole;
use tutorbook::models::purchase::{PaymentStatus, Purchase};
use tutorbook::models::session::{ReminderStage, Session, SessionKind, SessionStatus};
use tutorbook::scheduling::effects::{EmailTemplate, NotificationKind};
use tutorbook::scheduling::lifecycle::Actor;
use tutorbook::scheduling::slots::price_cents;
use tutorbook::services::booking::{BookingReceipt, BookingRequest};
use tutorbook::services::lifecycle::PaymentOutcome;
use tutorbook::store::BookingStore;
use tutorbook::testing::TestHarness;

const RATE_CENTS: i64 = 6_000;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Monday 2026-10-19, 08:00 UTC.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

/// The following Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 26).unwrap()
}

fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(t(h, m)))
}

struct World {
    harness: TestHarness,
    tutor: Uuid,
    student: Uuid,
}

async fn world_with(harness: TestHarness) -> World {
    let tutor = harness.directory.add_tutor("Ada Tutor", RATE_CENTS);
    let student = harness.directory.add_account("Sam Student", AccountRole::Student);
    harness
        .engine
        .availability
        .add_window(tutor, Weekday::Mon, t(9, 0), t(12, 0))
        .await
        .unwrap();

    World { harness, tutor, student }
}

async fn world() -> World {
    world_with(TestHarness::new(now())).await
}

fn request(world: &World, student: Uuid, start: NaiveTime, end: NaiveTime) -> BookingRequest {
    BookingRequest {
        tutor_id: world.tutor,
        student_id: student,
        date: monday(),
        start_time: start,
        end_time: end,
        kind: SessionKind::Regular,
        notes: None,
    }
}

async fn book(world: &World, start: NaiveTime, end: NaiveTime) -> BookingReceipt {
    world
        .harness
        .engine
        .booking
        .book(request(world, world.student, start, end))
        .await
        .unwrap()
}

async fn book_and_pay(world: &World, start: NaiveTime, end: NaiveTime) -> Session {
    let receipt = book(world, start, end).await;
    world
        .harness
        .engine
        .lifecycle
        .confirm_payment(receipt.session.id, world.student, "pay_123")
        .await
        .unwrap()
}

async fn stored_purchase(world: &World, session: &Session) -> Purchase {
    world
        .harness
        .store
        .find_purchase(session.purchase_id.unwrap())
        .await
        .unwrap()
        .unwrap()
}

fn starts(slots: &[tutorbook::models::slot::BookableSlot]) -> Vec<NaiveTime> {
    slots.iter().map(|s| s.start).collect()
}

#[tokio::test]
async fn test_monday_slots_then_booking_excludes_exactly_that_slot() {
    let world = world().await;
    let engine = &world.harness.engine;

    let slots = engine.availability.bookable_slots(world.tutor, monday()).await.unwrap();
    let expected = [(9, 0), (9, 30), (10, 0), (10, 30), (11, 0), (11, 30)];
    assert_eq!(slots.len(), expected.len());
    for (slot, (h, m)) in slots.iter().zip(expected) {
        assert_eq!(slot.start, t(h, m));
        assert_eq!(slot.end, t(h, m) + Duration::minutes(25));
        assert_eq!(slot.duration_minutes, 25);
        assert_eq!(slot.amount_cents, price_cents(RATE_CENTS, 25));
    }

    let receipt = book(&world, t(10, 0), t(10, 25)).await;
    assert_eq!(receipt.session.status, SessionStatus::Pending);
    assert_eq!(receipt.purchase.payment_status, PaymentStatus::Pending);
    assert_eq!(receipt.session.purchase_id, Some(receipt.purchase.id));
    assert_eq!(receipt.purchase.session_id, Some(receipt.session.id));
    assert_eq!(receipt.session.amount_cents, price_cents(RATE_CENTS, 25));
    assert_eq!(receipt.hold_expires_at, now() + Duration::minutes(5));

    let after = engine.availability.bookable_slots(world.tutor, monday()).await.unwrap();
    assert_eq!(
        starts(&after),
        vec![t(9, 0), t(9, 30), t(10, 30), t(11, 0), t(11, 30)]
    );
}

#[tokio::test]
async fn test_slots_for_unknown_tutor_and_past_dates() {
    let world = world().await;
    let engine = &world.harness.engine;

    let missing = engine.availability.bookable_slots(Uuid::new_v4(), monday()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let last_monday = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
    assert!(engine.availability.bookable_slots(world.tutor, last_monday).await.unwrap().is_empty());

    // Today at 08:00 UTC: every slot is still ahead.
    let today = engine
        .availability
        .bookable_slots(world.tutor, now().date_naive())
        .await
        .unwrap();
    assert_eq!(today.len(), 6);

    world.harness.clock.set(at(now().date_naive(), 10, 5));
    let later_today = engine
        .availability
        .bookable_slots(world.tutor, now().date_naive())
        .await
        .unwrap();
    assert_eq!(starts(&later_today), vec![t(10, 30), t(11, 0), t(11, 30)]);
}

#[tokio::test]
async fn test_blocks_remove_slots_and_reject_bookings() {
    let world = world().await;
    let engine = &world.harness.engine;

    let block = engine
        .availability
        .add_block(world.tutor, monday(), t(9, 45), t(10, 15), Some("dentist".into()))
        .await
        .unwrap();

    let slots = engine.availability.bookable_slots(world.tutor, monday()).await.unwrap();
    assert_eq!(starts(&slots), vec![t(9, 0), t(10, 30), t(11, 0), t(11, 30)]);

    let blocked = engine
        .booking
        .book(request(&world, world.student, t(10, 0), t(10, 25)))
        .await;
    assert!(matches!(blocked, Err(AppError::Conflict(_))));

    engine.availability.remove_block(world.tutor, block.id).await.unwrap();
    let slots = engine.availability.bookable_slots(world.tutor, monday()).await.unwrap();
    assert_eq!(slots.len(), 6);
}

#[tokio::test]
async fn test_window_overlap_and_ownership() {
    let world = world().await;
    let availability = &world.harness.engine.availability;

    let overlapping = availability
        .add_window(world.tutor, Weekday::Mon, t(11, 0), t(13, 0))
        .await;
    assert!(matches!(overlapping, Err(AppError::Conflict(_))));

    let backwards = availability
        .add_window(world.tutor, Weekday::Tue, t(13, 0), t(11, 0))
        .await;
    assert!(matches!(backwards, Err(AppError::BadRequest(_))));

    // Touching windows do not overlap.
    let afternoon = availability
        .add_window(world.tutor, Weekday::Mon, t(12, 0), t(13, 0))
        .await
        .unwrap();

    let someone_else = availability.remove_window(world.student, afternoon.id).await;
    assert!(matches!(someone_else, Err(AppError::NotFound(_))));

    availability.remove_window(world.tutor, afternoon.id).await.unwrap();
    assert_eq!(availability.list_windows(world.tutor).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_booking_of_same_interval_conflicts_even_without_lock() {
    let world = world().await;
    let engine = &world.harness.engine;
    let other = world.harness.directory.add_account("Other Student", AccountRole::Student);

    let first = book(&world, t(10, 0), t(10, 25)).await;

    // The reservation hold still owns the slot key.
    let while_held = engine.booking.book(request(&world, other, t(10, 0), t(10, 25))).await;
    match while_held {
        Err(AppError::Conflict(msg)) => assert!(msg.contains("being booked")),
        other => panic!("expected lock conflict, got {:?}", other),
    }

    // Drop the lock layer entirely: the transactional check still refuses.
    let key = SlotLockKey::new(world.tutor, monday(), t(10, 0));
    world.harness.locks.release(&key).await.unwrap();
    let without_lock = engine.booking.book(request(&world, other, t(10, 0), t(10, 25))).await;
    match without_lock {
        Err(AppError::Conflict(msg)) => assert!(msg.contains("conflicts with an existing booking")),
        other => panic!("expected overlap conflict, got {:?}", other),
    }

    // And straight at the store, bypassing the service.
    let mut duplicate = first.session.clone();
    duplicate.id = Uuid::new_v4();
    let mut purchase = first.purchase.clone();
    purchase.id = Uuid::new_v4();
    purchase.order_number = "SES-20261019-000001".into();
    let direct = world.harness.store.create_booking(duplicate, purchase).await;
    assert!(matches!(direct, Err(AppError::Conflict(_))));

    let occupying = world.harness.store.occupying_sessions(world.tutor, monday()).await.unwrap();
    assert_eq!(occupying.len(), 1);
}

#[tokio::test]
async fn test_overlapping_interval_with_different_lock_key_conflicts() {
    let world = world().await;
    let other = world.harness.directory.add_account("Other Student", AccountRole::Student);

    book(&world, t(10, 0), t(10, 25)).await;

    let shifted = world
        .harness
        .engine
        .booking
        .book(request(&world, other, t(10, 10), t(10, 35)))
        .await;
    assert!(matches!(shifted, Err(AppError::Conflict(_))));

    // The failed attempt released its own key.
    let key = SlotLockKey::new(world.tutor, monday(), t(10, 10));
    assert!(world.harness.locks.acquire(&key, Uuid::new_v4()).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_of_one_slot_have_one_winner() {
    let world = world().await;
    let students: Vec<Uuid> = (0..16)
        .map(|i| {
            world
                .harness
                .directory
                .add_account(&format!("Student {}", i), AccountRole::Student)
        })
        .collect();

    let attempts = students.iter().map(|student| {
        let booking = world.harness.engine.booking.clone();
        let req = request(&world, *student, t(11, 0), t(11, 25));
        tokio::spawn(async move { booking.book(req).await })
    });

    let results = futures::future::join_all(attempts).await;
    let winners = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();

    assert_eq!(winners, 1);
    assert_eq!(
        world.harness.store.occupying_sessions(world.tutor, monday()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_rejected_bookings_release_the_lock() {
    let world = world().await;
    let engine = &world.harness.engine;

    let outside = engine.booking.book(request(&world, world.student, t(13, 0), t(13, 25))).await;
    assert!(matches!(outside, Err(AppError::Conflict(_))));
    let key = SlotLockKey::new(world.tutor, monday(), t(13, 0));
    assert!(world.harness.locks.acquire(&key, Uuid::new_v4()).await.unwrap());

    let with_self = engine.booking.book(request(&world, world.tutor, t(9, 0), t(9, 25))).await;
    assert!(matches!(with_self, Err(AppError::BadRequest(_))));

    let mut past = request(&world, world.student, t(9, 0), t(9, 25));
    past.date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
    assert!(matches!(engine.booking.book(past).await, Err(AppError::BadRequest(_))));

    let mut unknown = request(&world, world.student, t(9, 0), t(9, 25));
    unknown.tutor_id = Uuid::new_v4();
    assert!(matches!(engine.booking.book(unknown).await, Err(AppError::NotFound(_))));

    let stranger = request(&world, Uuid::new_v4(), t(9, 0), t(9, 25));
    assert!(matches!(engine.booking.book(stranger).await, Err(AppError::NotFound(_))));
    let key = SlotLockKey::new(world.tutor, monday(), t(9, 0));
    assert!(world.harness.locks.acquire(&key, Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_times_with_seconds_are_rejected() {
    let world = world().await;
    let engine = &world.harness.engine;
    let half_past = NaiveTime::from_hms_opt(14, 0, 30).unwrap();

    let window = engine.availability.add_window(world.tutor, Weekday::Tue, half_past, t(15, 0)).await;
    assert!(matches!(window, Err(AppError::BadRequest(_))));

    let block = engine.availability.add_block(world.tutor, monday(), t(9, 0), half_past, None).await;
    assert!(matches!(block, Err(AppError::BadRequest(_))));

    let booking = engine
        .booking
        .book(request(&world, world.student, NaiveTime::from_hms_opt(10, 0, 30).unwrap(), t(10, 25)))
        .await;
    assert!(matches!(booking, Err(AppError::BadRequest(_))));

    let slots = engine.availability.bookable_slots(world.tutor, monday()).await.unwrap();
    assert_eq!(slots.len(), 6);
}

#[tokio::test]
async fn test_trial_end_time_is_derived() {
    let world = world().await;
    let mut trial = request(&world, world.student, t(9, 30), t(9, 31));
    trial.kind = SessionKind::Trial;

    let receipt = world.harness.engine.booking.book(trial).await.unwrap();
    assert_eq!(receipt.session.end_time, t(9, 55));
    assert_eq!(receipt.session.duration_minutes, 25);
    assert_eq!(receipt.session.kind, SessionKind::Trial);
}

#[tokio::test]
async fn test_confirm_payment_schedules_and_dispatches() {
    let world = world().await;
    let harness = &world.harness;

    let receipt = book(&world, t(10, 0), t(10, 25)).await;
    assert!(harness.notifier.sent().is_empty());

    let stranger = harness.directory.add_account("Stranger", AccountRole::Student);
    let forbidden = harness
        .engine
        .lifecycle
        .confirm_payment(receipt.session.id, stranger, "pay_x")
        .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let session = harness
        .engine
        .lifecycle
        .confirm_payment(receipt.session.id, world.student, "pay_123")
        .await
        .unwrap();
    assert_eq!(session.id, receipt.session.id);
    assert_eq!(session.status, SessionStatus::Scheduled);

    let purchase = stored_purchase(&world, &session).await;
    assert_eq!(purchase.payment_status, PaymentStatus::Completed);
    assert_eq!(purchase.transaction_ref.as_deref(), Some("pay_123"));
    assert_eq!(purchase.paid_at, Some(now()));

    let stored = harness.store.find_session(session.id).await.unwrap().unwrap();
    let meeting = stored.meeting.expect("meeting attached");
    assert!(meeting.join_url.contains(&session.id.simple().to_string()));
    assert_eq!(harness.meetings.requests()[0].tutor_name, "Ada Tutor");

    assert_eq!(harness.notifier.count(NotificationKind::Booking), 2);
    let emails = harness.mailer.sent();
    assert_eq!(emails.len(), 2);
    assert!(emails
        .iter()
        .all(|e| matches!(e.template, EmailTemplate::BookingConfirmation { .. })));

    // The hold is released once settled.
    let key = SlotLockKey::new(world.tutor, monday(), t(10, 0));
    assert!(harness.locks.acquire(&key, Uuid::new_v4()).await.unwrap());

    let again = harness
        .engine
        .lifecycle
        .confirm_payment(session.id, world.student, "pay_123")
        .await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_confirm_after_hold_expired_conflicts() {
    let harness = TestHarness::with_lock_ttl(now(), StdDuration::from_millis(50));
    let world = world_with(harness).await;

    let receipt = book(&world, t(10, 0), t(10, 25)).await;
    tokio::time::sleep(StdDuration::from_millis(120)).await;

    let late = world
        .harness
        .engine
        .lifecycle
        .confirm_payment(receipt.session.id, world.student, "pay_late")
        .await;
    match late {
        Err(AppError::Conflict(msg)) => assert!(msg.contains("expired")),
        other => panic!("expected expired hold conflict, got {:?}", other),
    }

    let stored = world.harness.store.find_session(receipt.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Pending);
    assert_eq!(
        stored_purchase(&world, &stored).await.payment_status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_meeting_failure_does_not_undo_confirmation() {
    let world = world().await;
    world.harness.meetings.fail_all();

    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    assert_eq!(session.status, SessionStatus::Scheduled);

    let stored = world.harness.store.find_session(session.id).await.unwrap().unwrap();
    assert!(stored.meeting.is_none());
    assert_eq!(world.harness.meetings.requests().len(), 1);
    assert_eq!(world.harness.notifier.count(NotificationKind::Booking), 2);
}

#[tokio::test]
async fn test_payment_outcomes() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;

    let paid = book(&world, t(9, 0), t(9, 25)).await;
    let session = lifecycle
        .record_payment_outcome(paid.purchase.id, PaymentOutcome::Completed { reference: "ch_1".into() })
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Scheduled);

    let settled_twice = lifecycle
        .record_payment_outcome(paid.purchase.id, PaymentOutcome::Failed { reason: "late".into() })
        .await;
    assert!(matches!(settled_twice, Err(AppError::BadRequest(_))));

    let failed = book(&world, t(10, 0), t(10, 25)).await;
    let session = lifecycle
        .record_payment_outcome(failed.purchase.id, PaymentOutcome::Failed { reason: "card declined".into() })
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.cancellation_reason.as_deref(), Some("card declined"));
    assert_eq!(
        stored_purchase(&world, &session).await.payment_status,
        PaymentStatus::Failed
    );
    assert_eq!(world.harness.notifier.count(NotificationKind::Payment), 1);

    let slots = world
        .harness
        .engine
        .availability
        .bookable_slots(world.tutor, monday())
        .await
        .unwrap();
    assert!(slots.iter().any(|s| s.start == t(10, 0)));
    assert!(!slots.iter().any(|s| s.start == t(9, 0)));

    let unknown = lifecycle
        .record_payment_outcome(Uuid::new_v4(), PaymentOutcome::Completed { reference: "x".into() })
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_reschedule_into_offered_slot_keeps_identity() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;
    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;

    let moved = lifecycle
        .reschedule(session.id, Actor::Participant(world.student), monday(), t(11, 0), t(11, 25))
        .await
        .unwrap();
    assert_eq!(moved.id, session.id);
    assert_eq!(moved.session_date, monday());
    assert_eq!((moved.start_time, moved.end_time), (t(11, 0), t(11, 25)));
    assert_eq!(moved.duration_minutes, 25);
    assert_eq!(moved.status, SessionStatus::Scheduled);

    // Moving into the slot right next to its own old interval also works.
    let back = lifecycle
        .reschedule(session.id, Actor::Participant(world.student), monday(), t(11, 30), t(11, 55))
        .await
        .unwrap();
    assert_eq!(back.start_time, t(11, 30));

    let emails = world.harness.mailer.sent();
    assert!(emails.iter().any(|e| matches!(
        e.template,
        EmailTemplate::Reschedule { previous, current }
            if previous.start_time == t(10, 0) && current.start_time == t(11, 0)
    )));
    assert_eq!(world.harness.notifier.count(NotificationKind::Reschedule), 4);
}

#[tokio::test]
async fn test_reschedule_into_unoffered_slot_conflicts() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;
    let other = world.harness.directory.add_account("Other Student", AccountRole::Student);

    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    world
        .harness
        .engine
        .booking
        .book(request(&world, other, t(11, 0), t(11, 25)))
        .await
        .unwrap();

    let outside = lifecycle
        .reschedule(session.id, Actor::Participant(world.student), monday(), t(12, 30), t(12, 55))
        .await;
    assert!(matches!(outside, Err(AppError::Conflict(_))));

    let taken = lifecycle
        .reschedule(session.id, Actor::Participant(world.student), monday(), t(11, 0), t(11, 25))
        .await;
    assert!(matches!(taken, Err(AppError::Conflict(_))));

    let off_grid = lifecycle
        .reschedule(session.id, Actor::Participant(world.student), monday(), t(9, 10), t(9, 35))
        .await;
    assert!(matches!(off_grid, Err(AppError::Conflict(_))));

    let stored = world.harness.store.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.start_time, t(10, 0));
}

#[tokio::test]
async fn test_admin_reschedule_skips_availability_but_not_overlap() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;
    let admin = world.harness.directory.add_account("Admin", AccountRole::Admin);
    let other = world.harness.directory.add_account("Other Student", AccountRole::Student);

    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    world
        .harness
        .engine
        .booking
        .book(request(&world, other, t(11, 0), t(11, 25)))
        .await
        .unwrap();

    let evening = lifecycle
        .reschedule(session.id, Actor::Admin(admin), monday(), t(18, 0), t(18, 45))
        .await
        .unwrap();
    assert_eq!(evening.duration_minutes, 45);

    let onto_pending = lifecycle
        .reschedule(session.id, Actor::Admin(admin), monday(), t(11, 10), t(11, 40))
        .await;
    assert!(matches!(onto_pending, Err(AppError::Conflict(_))));

    // Inside the 4 hour floor only the admin may move it.
    world.harness.clock.set(at(monday(), 16, 0));
    let participant = lifecycle
        .reschedule(session.id, Actor::Participant(world.student), monday(), t(9, 0), t(9, 25))
        .await;
    assert!(matches!(participant, Err(AppError::BadRequest(_))));
    lifecycle
        .reschedule(session.id, Actor::Admin(admin), monday(), t(19, 0), t(19, 25))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_refunds_only_beyond_threshold() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;

    let early = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    let late = book_and_pay(&world, t(11, 0), t(11, 25)).await;

    // 24h01m before the 10:00 session.
    world.harness.clock.set(at(monday(), 10, 0) - Duration::minutes(24 * 60 + 1));
    let policy = lifecycle
        .cancellation_policy(early.id, &Actor::Participant(world.student))
        .await
        .unwrap();
    assert!(policy.can_cancel && policy.refund_eligible);

    let cancelled = lifecycle
        .cancel(early.id, Actor::Participant(world.student), Some("sick".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(world.student));
    assert_eq!(
        stored_purchase(&world, &cancelled).await.payment_status,
        PaymentStatus::Refunded
    );

    // 23h59m before the 11:00 session.
    world.harness.clock.set(at(monday(), 11, 0) - Duration::minutes(23 * 60 + 59));
    let cancelled = lifecycle
        .cancel(late.id, Actor::Participant(world.tutor), None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(
        stored_purchase(&world, &cancelled).await.payment_status,
        PaymentStatus::Completed
    );

    assert_eq!(world.harness.notifier.count(NotificationKind::Cancellation), 4);
    let refunds: Vec<bool> = world
        .harness
        .mailer
        .sent()
        .into_iter()
        .filter_map(|e| match e.template {
            EmailTemplate::Cancellation { refund_issued, .. } => Some(refund_issued),
            _ => None,
        })
        .collect();
    assert_eq!(refunds, vec![true, true, false, false]);

    let twice = lifecycle.cancel(late.id, Actor::Participant(world.student), None).await;
    assert!(matches!(twice, Err(AppError::BadRequest(_))));

    // A cancelled interval is bookable again.
    let slots = world
        .harness
        .engine
        .availability
        .bookable_slots(world.tutor, monday())
        .await
        .unwrap();
    assert!(slots.iter().any(|s| s.start == t(10, 0)));
}

#[tokio::test]
async fn test_cancel_floor_and_admin_bypass() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;
    let admin = world.harness.directory.add_account("Admin", AccountRole::Admin);
    let stranger = world.harness.directory.add_account("Stranger", AccountRole::Student);

    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    world.harness.clock.set(at(monday(), 9, 0));

    let too_late = lifecycle.cancel(session.id, Actor::Participant(world.student), None).await;
    assert!(matches!(too_late, Err(AppError::BadRequest(_))));

    let not_theirs = lifecycle.cancel(session.id, Actor::Participant(stranger), None).await;
    assert!(matches!(not_theirs, Err(AppError::Forbidden(_))));

    let cancelled = lifecycle
        .cancel(session.id, Actor::Admin(admin), Some("tutor emergency".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(
        stored_purchase(&world, &cancelled).await.payment_status,
        PaymentStatus::Refunded
    );
}

#[tokio::test]
async fn test_session_views_are_limited_to_participants() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;
    let stranger = world.harness.directory.add_account("Stranger", AccountRole::Student);
    let admin = world.harness.directory.add_account("Admin", AccountRole::Admin);

    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    book(&world, t(11, 0), t(11, 25)).await;

    assert!(lifecycle.get_session(session.id, &Actor::Participant(world.tutor)).await.is_ok());
    assert!(lifecycle.get_session(session.id, &Actor::Admin(admin)).await.is_ok());
    assert!(matches!(
        lifecycle.get_session(session.id, &Actor::Participant(stranger)).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        lifecycle.get_session(Uuid::new_v4(), &Actor::Admin(admin)).await,
        Err(AppError::NotFound(_))
    ));

    let listed = lifecycle.list_sessions(world.student).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].start_time, t(11, 0));
    assert!(lifecycle.list_sessions(stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_complete_and_no_show() {
    let world = world().await;
    let lifecycle = &world.harness.engine.lifecycle;

    let taught = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    let missed = book_and_pay(&world, t(11, 0), t(11, 25)).await;

    let early = lifecycle.complete(taught.id, Actor::Participant(world.tutor)).await;
    assert!(matches!(early, Err(AppError::BadRequest(_))));

    world.harness.clock.set(at(monday(), 11, 5));
    let by_student = lifecycle.complete(taught.id, Actor::Participant(world.student)).await;
    assert!(matches!(by_student, Err(AppError::Forbidden(_))));

    let completed = lifecycle.complete(taught.id, Actor::Participant(world.tutor)).await.unwrap();
    assert_eq!(completed.status, SessionStatus::Completed);

    let no_show = lifecycle.mark_no_show(missed.id, Actor::Participant(world.tutor)).await.unwrap();
    assert_eq!(no_show.status, SessionStatus::NoShow);

    let terminal = lifecycle.cancel(completed.id, Actor::Participant(world.student), None).await;
    assert!(matches!(terminal, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_reminders_are_sent_once_per_horizon() {
    let world = world().await;
    let sweep = &world.harness.engine.reminders;
    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    let start = at(monday(), 10, 0);

    let far = sweep.run_once(start - Duration::hours(30)).await.unwrap();
    assert_eq!(far.day_reminders + far.hour_reminders, 0);

    let day = sweep.run_once(start - Duration::hours(23)).await.unwrap();
    assert_eq!(day.day_reminders, 1);
    let repeat = sweep.run_once(start - Duration::hours(22)).await.unwrap();
    assert_eq!(repeat.day_reminders, 0);

    let hour = sweep.run_once(start - Duration::minutes(50)).await.unwrap();
    assert_eq!((hour.day_reminders, hour.hour_reminders), (0, 1));
    let repeat = sweep.run_once(start - Duration::minutes(45)).await.unwrap();
    assert_eq!(repeat.hour_reminders, 0);

    let stored = world.harness.store.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.reminder_stage, ReminderStage::Hour);

    let stages: Vec<ReminderStage> = world
        .harness
        .mailer
        .sent()
        .into_iter()
        .filter_map(|e| match e.template {
            EmailTemplate::Reminder { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, vec![ReminderStage::Day, ReminderStage::Hour]);
    assert_eq!(world.harness.notifier.count(NotificationKind::Reminder), 2);
}

#[tokio::test]
async fn test_first_seen_inside_hour_gets_only_hour_reminder_and_reschedule_resets() {
    let world = world().await;
    let sweep = &world.harness.engine.reminders;
    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;

    let report = sweep.run_once(at(monday(), 9, 30)).await.unwrap();
    assert_eq!((report.day_reminders, report.hour_reminders), (0, 1));

    // Reminded sessions move back to a clean slate when rescheduled.
    let next_monday = monday() + Duration::days(7);
    let moved = world
        .harness
        .engine
        .lifecycle
        .reschedule(session.id, Actor::Participant(world.student), next_monday, t(9, 0), t(9, 25))
        .await
        .unwrap();
    assert_eq!(moved.reminder_stage, ReminderStage::None);

    let report = sweep.run_once(at(next_monday, 9, 0) - Duration::hours(20)).await.unwrap();
    assert_eq!(report.day_reminders, 1);
}

#[tokio::test]
async fn test_sweep_expires_unpaid_reservations() {
    let world = world().await;
    let receipt = book(&world, t(10, 0), t(10, 25)).await;

    let within_hold = world.harness.engine.reminders.run_once(now() + Duration::minutes(4)).await.unwrap();
    assert_eq!(within_hold.expired_reservations, 0);

    let report = world.harness.engine.reminders.run_once(now() + Duration::minutes(10)).await.unwrap();
    assert_eq!(report.expired_reservations, 1);

    let stored = world.harness.store.find_session(receipt.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Cancelled);
    assert_eq!(
        stored_purchase(&world, &stored).await.payment_status,
        PaymentStatus::Failed
    );

    let again = world.harness.engine.reminders.run_once(now() + Duration::minutes(20)).await.unwrap();
    assert_eq!(again.expired_reservations, 0);
}

#[tokio::test]
async fn test_stale_transition_is_rejected_by_store() {
    let world = world().await;
    let session = book_and_pay(&world, t(10, 0), t(10, 25)).await;
    let purchase = stored_purchase(&world, &session).await;

    // Two cancellations computed from the same snapshot: only one lands.
    let ctx = tutorbook::scheduling::lifecycle::PolicyContext {
        now: now(),
        offset: Utc.fix(),
        policy: Default::default(),
    };
    let first = tutorbook::scheduling::lifecycle::cancel(
        &session,
        Some(&purchase),
        &Actor::Participant(world.student),
        None,
        &ctx,
    )
    .unwrap();
    let second = tutorbook::scheduling::lifecycle::cancel(
        &session,
        Some(&purchase),
        &Actor::Participant(world.tutor),
        None,
        &ctx,
    )
    .unwrap();

    world.harness.store.apply_transition(&first).await.unwrap();
    let lost = world.harness.store.apply_transition(&second).await;
    assert!(matches!(lost, Err(AppError::Conflict(_))));

    let stored = world.harness.store.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.cancelled_by, Some(world.student));
}
