//! Booking state machine.
//!
//! ```text
//! REQUESTED -> ACCEPTED -> ACTIVE -> RETURNED -> COMPLETED
//! REQUESTED -> REJECTED
//! ACTIVE    -> COMPLETED
//! any       -> DISPUTED
//! ```
//!
//! Every mutation of a booking's status goes through [`apply`] or [`record_capture`].

use crate::models::{Booking, BookingStatus};
use chrono::{DateTime, Utc};
use service_core::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Accept,
    Reject,
    MarkActive,
    Return {
        notes: Option<String>,
        images: Vec<String>,
    },
    Complete,
    Dispute,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::MarkActive => "mark_active",
            Self::Return { .. } => "return",
            Self::Complete => "complete",
            Self::Dispute => "dispute",
        }
    }

    /// Transitions that can move a provisional booking into a committed status.
    pub fn commits_item(&self) -> bool {
        matches!(self, Self::Accept | Self::Dispute)
    }
}

fn invalid_state(message: &str, booking: &Booking) -> AppError {
    AppError::InvalidState(anyhow::anyhow!(
        "{} (current status: {})",
        message,
        booking.status
    ))
}

fn set_status(booking: &mut Booking, status: BookingStatus, now: DateTime<Utc>) {
    booking.status = status;
    booking.status_updated_at = now;
    booking.updated_at = now;
}

pub fn apply(
    booking: &mut Booking,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    match transition {
        Transition::Accept => {
            if booking.status != BookingStatus::Requested {
                return Err(invalid_state("Only requested bookings can be accepted", booking));
            }
            set_status(booking, BookingStatus::Accepted, now);
        }
        Transition::Reject => {
            if booking.status != BookingStatus::Requested {
                return Err(invalid_state("Only requested bookings can be rejected", booking));
            }
            set_status(booking, BookingStatus::Rejected, now);
        }
        Transition::MarkActive => activate(booking, now)?,
        Transition::Return { notes, images } => {
            if booking.status != BookingStatus::Active {
                return Err(invalid_state("Only active bookings can be returned", booking));
            }
            booking.returned_at = Some(now);
            booking.return_notes = notes;
            booking.return_images = images;
            set_status(booking, BookingStatus::Returned, now);
        }
        Transition::Complete => {
            if !matches!(
                booking.status,
                BookingStatus::Returned | BookingStatus::Active
            ) {
                return Err(invalid_state(
                    "Only returned or active bookings can be completed",
                    booking,
                ));
            }
            if booking.returned_at.is_none() {
                booking.returned_at = Some(now);
            }
            set_status(booking, BookingStatus::Completed, now);
        }
        Transition::Dispute => {
            if booking.status == BookingStatus::Disputed {
                return Err(invalid_state("Booking is already disputed", booking));
            }
            set_status(booking, BookingStatus::Disputed, now);
        }
    }
    Ok(())
}

/// ACCEPTED and paid -> ACTIVE. Shared by the explicit operation and payment capture.
pub fn activate(booking: &mut Booking, now: DateTime<Utc>) -> Result<(), AppError> {
    if booking.status != BookingStatus::Accepted {
        return Err(invalid_state(
            "Only accepted bookings can be marked active",
            booking,
        ));
    }
    if booking.paid_at.is_none() {
        return Err(invalid_state(
            "Booking must be paid before it can be marked active",
            booking,
        ));
    }
    set_status(booking, BookingStatus::Active, now);
    Ok(())
}

/// Record a verified capture.
///
/// Sets `paid_at` once, then activates the booking if it is accepted and its start time has
/// passed. Returns whether the booking changed.
pub fn record_capture(booking: &mut Booking, now: DateTime<Utc>) -> Result<bool, AppError> {
    if booking.paid_at.is_some() {
        return Ok(false);
    }
    if !booking.status.accepts_payment() {
        tracing::warn!(
            booking_id = %booking.id,
            status = %booking.status,
            "Capture reported for booking that cannot take payment"
        );
        return Ok(false);
    }

    booking.paid_at = Some(now);
    booking.updated_at = now;

    if booking.status == BookingStatus::Accepted && booking.has_started(now) {
        activate(booking, now)?;
    }
    Ok(true)
}
