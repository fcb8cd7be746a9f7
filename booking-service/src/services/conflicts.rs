//! Booking conflict rule.
//!
//! An existing booking blocks a requested window when either
//! - it still holds the item and its window overlaps the requested one (inclusive), or
//! - it is a REQUESTED booking created after the grace cutoff, which is a provisional hold on
//!   the whole item until the owner decides.
//!
//! Both stores load the item's holding bookings under the per-item lock and apply this rule.

use crate::models::{Booking, BookingStatus, BookingWindow};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Cutoff for provisional REQUESTED holds.
pub fn grace_cutoff(now: DateTime<Utc>, grace_period_minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(grace_period_minutes)
}

pub fn is_conflicting(
    existing: &Booking,
    requested: &BookingWindow,
    cutoff: DateTime<Utc>,
) -> bool {
    let overlapping = existing.status.holds_item() && existing.window().overlaps(requested);
    let provisional =
        existing.status == BookingStatus::Requested && existing.created_at > cutoff;
    overlapping || provisional
}

/// Bookings on `item_id` that block `requested`, ordered by start time.
pub fn find_conflicts<'a, I>(
    bookings: I,
    item_id: Uuid,
    requested: &BookingWindow,
    cutoff: DateTime<Utc>,
) -> Vec<Booking>
where
    I: IntoIterator<Item = &'a Booking>,
{
    let mut conflicts: Vec<Booking> = bookings
        .into_iter()
        .filter(|b| b.item_id == item_id && is_conflicting(b, requested, cutoff))
        .cloned()
        .collect();
    conflicts.sort_by_key(|b| b.start_date);
    conflicts
}

/// Other committed bookings whose windows overlap `booking`. Used when accepting.
pub fn committed_overlaps<'a>(booking: &Booking, siblings: &'a [Booking]) -> Vec<&'a Booking> {
    let window = booking.window();
    siblings
        .iter()
        .filter(|other| {
            other.id != booking.id
                && other.item_id == booking.item_id
                && other.status.is_committed()
                && other.window().overlaps(&window)
        })
        .collect()
}
