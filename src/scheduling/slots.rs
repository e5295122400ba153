use crate::config::SlotSettings;
use crate::models::slot::{minutes_rounded_up, minutes_since_midnight, time_from_minutes, BookableSlot, TimeRange};

/// Walks each window in steps of `duration + buffer`, emitting
/// `[cursor, cursor + duration)` while the slot still fits.
///
/// Windows are processed in start order and the result is flattened, so the
/// output is ordered for non-overlapping windows. Window bounds that carry
/// seconds are narrowed to whole minutes, so every slot lies inside its window.
pub fn generate_slots(windows: &[TimeRange], duration_minutes: u32, buffer_minutes: u32) -> Vec<TimeRange> {
    if duration_minutes == 0 {
        return Vec::new();
    }

    let mut ordered: Vec<&TimeRange> = windows.iter().collect();
    ordered.sort_by_key(|w| w.start);

    let step = duration_minutes + buffer_minutes;
    let mut slots = Vec::new();

    for window in ordered {
        let window_end = minutes_since_midnight(window.end);
        let mut cursor = minutes_rounded_up(window.start);

        while cursor + duration_minutes <= window_end {
            let (Some(start), Some(end)) = (
                time_from_minutes(cursor),
                time_from_minutes(cursor + duration_minutes),
            ) else {
                break;
            };
            slots.push(TimeRange::new(start, end));
            cursor += step;
        }
    }

    slots
}

/// Drops every candidate that overlaps an occupied session or a block.
pub fn filter_conflicts(candidates: Vec<TimeRange>, occupied: &[TimeRange], blocks: &[TimeRange]) -> Vec<TimeRange> {
    candidates
        .into_iter()
        .filter(|slot| {
            !occupied.iter().any(|taken| slot.overlaps(taken))
                && !blocks.iter().any(|block| slot.overlaps(block))
        })
        .collect()
}

/// `round(hourly_rate * duration / 60)` to the nearest cent, halves rounding up.
pub fn price_cents(hourly_rate_cents: i64, duration_minutes: i32) -> i64 {
    let numerator = hourly_rate_cents * i64::from(duration_minutes);
    if numerator >= 0 {
        (numerator + 30) / 60
    } else {
        (numerator - 30) / 60
    }
}

pub fn price_slots(slots: Vec<TimeRange>, hourly_rate_cents: i64) -> Vec<BookableSlot> {
    slots
        .into_iter()
        .map(|slot| {
            let duration_minutes = slot.duration_minutes();
            BookableSlot {
                start: slot.start,
                end: slot.end,
                duration_minutes,
                amount_cents: price_cents(hourly_rate_cents, duration_minutes),
            }
        })
        .collect()
}

/// Availability minus bookings and blocks for one tutor and date.
pub fn bookable_slots(
    windows: &[TimeRange],
    occupied: &[TimeRange],
    blocks: &[TimeRange],
    settings: &SlotSettings,
    hourly_rate_cents: i64,
) -> Vec<BookableSlot> {
    let candidates = generate_slots(windows, settings.session_duration_minutes, settings.buffer_minutes);
    let free = filter_conflicts(candidates, occupied, blocks);
    price_slots(free, hourly_rate_cents)
}
