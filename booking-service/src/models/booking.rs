//! Booking model and lifecycle status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Requested,
    Accepted,
    Active,
    Returned,
    Completed,
    Rejected,
    Disputed,
}

impl BookingStatus {
    /// Statuses whose window still reserves the item.
    pub const HOLDING: [BookingStatus; 5] = [
        Self::Requested,
        Self::Accepted,
        Self::Active,
        Self::Returned,
        Self::Disputed,
    ];

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Accepted => "ACCEPTED",
            Self::Active => "ACTIVE",
            Self::Returned => "RETURNED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Disputed => "DISPUTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Disputed)
    }

    pub fn holds_item(&self) -> bool {
        Self::HOLDING.contains(self)
    }

    /// Owner has agreed to lend; the window is no longer provisional.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Active | Self::Returned | Self::Disputed
        )
    }

    /// States in which a captured payment may be recorded.
    pub fn accepts_payment(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Active | Self::Returned | Self::Completed | Self::Disputed
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REQUESTED" => Ok(Self::Requested),
            "ACCEPTED" => Ok(Self::Accepted),
            "ACTIVE" => Ok(Self::Active),
            "RETURNED" => Ok(Self::Returned),
            "COMPLETED" => Ok(Self::Completed),
            "REJECTED" => Ok(Self::Rejected),
            "DISPUTED" => Ok(Self::Disputed),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

/// Inclusive `[start, end]` reservation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppError> {
        if end < start {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "End date must be on or after start date"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &BookingWindow) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Calendar days covered, counting both the start and end dates.
    pub fn duration_days(&self) -> i64 {
        (self.end.date_naive() - self.start.date_naive()).num_days() + 1
    }
}

/// Rating left by one party of a booking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyRating {
    pub given: bool,
    pub rating: Option<Decimal>,
    pub review: Option<String>,
}

/// One borrow agreement for one item between a borrower and the item's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub item_id: Uuid,
    pub apartment_id: Uuid,
    pub borrower_id: Uuid,
    pub owner_id: Uuid,
    pub status: BookingStatus,
    pub status_updated_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_days: i32,
    pub base_price: Decimal,
    pub platform_fee: Decimal,
    pub deposit_collected: Decimal,
    pub total_amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub gateway_order_id: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
    pub return_notes: Option<String>,
    pub return_images: Vec<String>,
    pub damage_reported: bool,
    pub damage_amount: Decimal,
    pub borrower_rating: PartyRating,
    pub owner_rating: PartyRating,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn window(&self) -> BookingWindow {
        BookingWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Requested,
            BookingStatus::Accepted,
            BookingStatus::Active,
            BookingStatus::Returned,
            BookingStatus::Completed,
            BookingStatus::Rejected,
            BookingStatus::Disputed,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_window_rejects_end_before_start() {
        assert!(BookingWindow::new(at(5, 10), at(5, 9)).is_err());
        assert!(BookingWindow::new(at(5, 10), at(5, 10)).is_ok());
    }

    #[test]
    fn test_duration_counts_calendar_days_inclusive() {
        let same_day = BookingWindow::new(at(5, 9), at(5, 18)).unwrap();
        assert_eq!(same_day.duration_days(), 1);

        let overnight = BookingWindow::new(at(5, 22), at(6, 1)).unwrap();
        assert_eq!(overnight.duration_days(), 2);

        let week = BookingWindow::new(at(1, 0), at(1, 0) + Duration::days(6)).unwrap();
        assert_eq!(week.duration_days(), 7);
    }

    #[test]
    fn test_overlap_bounds_are_inclusive() {
        let a = BookingWindow::new(at(1, 0), at(3, 0)).unwrap();
        let touching = BookingWindow::new(at(3, 0), at(4, 0)).unwrap();
        let after = BookingWindow::new(at(3, 1), at(4, 0)).unwrap();

        assert!(a.overlaps(&touching));
        assert!(touching.overlaps(&a));
        assert!(!a.overlaps(&after));
    }
}
