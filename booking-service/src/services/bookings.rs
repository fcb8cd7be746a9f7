//! Booking orchestration: creation, owner/borrower transitions and queries.

use crate::config::BookingRules;
use crate::middleware::CallerContext;
use crate::models::{Booking, BookingStatus, BookingWindow, PartyRating};
use crate::services::conflicts::{self, grace_cutoff};
use crate::services::lifecycle::{self, Transition};
use crate::services::metrics::record_transition;
use crate::services::pricing;
use crate::services::store::{
    BookingStore, InsertOutcome, ItemCatalog, LockScope, Mutation, Page, Party,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Caller must belong to the booking's apartment and be the named party.
pub(crate) fn authorize(
    booking: &Booking,
    caller: &CallerContext,
    party: Party,
) -> Result<(), AppError> {
    if booking.apartment_id != caller.apartment_id {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid apartment context"
        )));
    }
    if !party.matches(booking, caller.user_id) {
        let message = match party {
            Party::Borrower => "Only the borrower can perform this action",
            Party::Owner => "Only the item owner can perform this action",
        };
        return Err(AppError::Unauthorized(anyhow::anyhow!(message)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn ItemCatalog>,
    rules: BookingRules,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn ItemCatalog>,
        rules: BookingRules,
    ) -> Self {
        Self {
            store,
            catalog,
            rules,
        }
    }

    /// Request an item for `[start, end]`.
    #[instrument(skip(self, caller), fields(borrower_id = %caller.user_id, item_id = %item_id))]
    pub async fn create_booking(
        &self,
        caller: &CallerContext,
        item_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Booking, AppError> {
        let item = self
            .catalog
            .find_item(item_id)
            .await?
            .filter(|item| !item.is_deleted() && item.apartment_id == caller.apartment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Item {} not found", item_id)))?;

        if item.owner_id == caller.user_id {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "You cannot book your own item"
            )));
        }
        if !item.is_available {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Item is not available for booking"
            )));
        }

        let window = BookingWindow::new(start, end)?;
        let days = window.duration_days();
        if days <= 0 {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Invalid booking duration"
            )));
        }

        let max_days = item
            .max_consecutive_days
            .unwrap_or(self.rules.default_max_consecutive_days);
        if days > i64::from(max_days) {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Booking duration of {} days exceeds the maximum of {} days",
                days,
                max_days
            )));
        }

        let quote = pricing::quote(
            item.price_per_day,
            days,
            item.deposit_amount,
            self.rules.platform_fee_percent,
        )?;

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            item_id: item.id,
            apartment_id: item.apartment_id,
            borrower_id: caller.user_id,
            owner_id: item.owner_id,
            status: BookingStatus::Requested,
            status_updated_at: now,
            start_date: window.start,
            end_date: window.end,
            duration_days: days as i32,
            base_price: quote.base_price,
            platform_fee: quote.platform_fee,
            deposit_collected: quote.deposit,
            total_amount: quote.total_amount,
            paid_at: None,
            gateway_order_id: None,
            returned_at: None,
            return_notes: None,
            return_images: Vec::new(),
            damage_reported: false,
            damage_amount: Decimal::ZERO,
            borrower_rating: PartyRating::default(),
            owner_rating: PartyRating::default(),
            created_at: now,
            updated_at: now,
        };

        let cutoff = grace_cutoff(now, self.rules.grace_period_minutes);
        match self.store.insert_booking(booking, cutoff).await? {
            InsertOutcome::Inserted(booking) => {
                record_transition("create", true);
                info!(
                    booking_id = %booking.id,
                    total_amount = %booking.total_amount,
                    duration_days = booking.duration_days,
                    "Booking requested"
                );
                Ok(booking)
            }
            InsertOutcome::Conflicts(blockers) => {
                record_transition("create", false);
                warn!(
                    conflicts = blockers.len(),
                    first_conflict = %blockers[0].id,
                    "Booking request conflicts with existing bookings"
                );
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Item is already booked for the requested dates"
                )))
            }
        }
    }

    pub async fn accept_booking(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        self.transition(Some(caller), booking_id, Party::Owner, Transition::Accept)
            .await
    }

    pub async fn reject_booking(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        self.transition(Some(caller), booking_id, Party::Owner, Transition::Reject)
            .await
    }

    pub async fn mark_active(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        self.transition(Some(caller), booking_id, Party::Owner, Transition::MarkActive)
            .await
    }

    pub async fn return_booking(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
        notes: Option<String>,
        images: Vec<String>,
    ) -> Result<Booking, AppError> {
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let images = images
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        self.transition(
            Some(caller),
            booking_id,
            Party::Borrower,
            Transition::Return { notes, images },
        )
        .await
    }

    pub async fn complete_booking(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
    ) -> Result<Booking, AppError> {
        self.transition(Some(caller), booking_id, Party::Owner, Transition::Complete)
            .await
    }

    /// Raised by the dispute workflow, which authorizes the participants itself.
    pub async fn mark_disputed(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        self.transition(None, booking_id, Party::Owner, Transition::Dispute)
            .await
    }

    #[instrument(skip(self, caller, transition), fields(transition = transition.name()))]
    async fn transition(
        &self,
        caller: Option<&CallerContext>,
        booking_id: Uuid,
        party: Party,
        transition: Transition,
    ) -> Result<Booking, AppError> {
        let name = transition.name();
        let scope = if transition.commits_item() {
            LockScope::Item
        } else {
            LockScope::Booking
        };
        let caller = caller.copied();

        let result = self
            .store
            .update_booking(
                booking_id,
                scope,
                Box::new(move |booking: &mut Booking, siblings: &[Booking]| {
                    if let Some(caller) = &caller {
                        authorize(booking, caller, party)?;
                    }
                    if transition.commits_item()
                        && !booking.status.is_committed()
                        && !conflicts::committed_overlaps(booking, siblings).is_empty()
                    {
                        return Err(AppError::Conflict(anyhow::anyhow!(
                            "Item is already committed to another booking for these dates"
                        )));
                    }
                    lifecycle::apply(booking, transition, Utc::now())?;
                    Ok(Mutation::booking())
                }),
            )
            .await;

        record_transition(name, result.is_ok());
        let outcome = result.map_err(|e| {
            warn!(booking_id = %booking_id, error = %e, "Booking transition refused");
            e
        })?;

        info!(
            booking_id = %booking_id,
            status = %outcome.booking.status,
            "Booking transitioned"
        );
        Ok(outcome.booking)
    }

    pub async fn get_booking(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
        party: Party,
    ) -> Result<Booking, AppError> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking {} not found", booking_id)))?;
        authorize(&booking, caller, party)?;
        Ok(booking)
    }

    pub async fn list_bookings(
        &self,
        caller: &CallerContext,
        party: Party,
        page: Page,
    ) -> Result<Vec<Booking>, AppError> {
        self.store
            .list_for_party(party, caller.user_id, caller.apartment_id, page)
            .await
    }
}
