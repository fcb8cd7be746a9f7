//! Persistence seam for bookings, the payment ledger, and the item read model.

use crate::models::{Booking, ItemListing, LedgerEntry, LedgerWrite, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Locks held by [`BookingStore::update_booking`] besides the booking row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Booking,
    /// Also take the per-item lock and load other bookings holding an overlapping window.
    Item,
}

/// What a mutation closure asks the store to persist.
#[derive(Debug, Default)]
pub struct Mutation {
    pub booking_changed: bool,
    pub ledger: Option<LedgerWrite>,
}

impl Mutation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn booking() -> Self {
        Self {
            booking_changed: true,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, write: LedgerWrite) -> Self {
        self.ledger = Some(write);
        self
    }
}

/// Runs against the locked booking. The second argument holds overlapping siblings
/// under [`LockScope::Item`] and is empty otherwise. Returning an error rolls back.
pub type BookingMutation<'a> =
    Box<dyn FnOnce(&mut Booking, &[Booking]) -> Result<Mutation, AppError> + Send + 'a>;

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub booking: Booking,
    pub ledger: Option<LedgerEntry>,
}

#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Booking),
    Conflicts(Vec<Booking>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Borrower,
    Owner,
}

impl Party {
    pub fn matches(&self, booking: &Booking, user_id: Uuid) -> bool {
        match self {
            Party::Borrower => booking.borrower_id == user_id,
            Party::Owner => booking.owner_id == user_id,
        }
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: Option<u32>, size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(20).clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a REQUESTED booking unless the conflict rule finds blockers.
    /// The check and the insert run under the per-item lock.
    async fn insert_booking(
        &self,
        booking: Booking,
        grace_cutoff: DateTime<Utc>,
    ) -> Result<InsertOutcome, AppError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, AppError>;

    async fn find_by_gateway_order(&self, order_id: &str) -> Result<Option<Booking>, AppError>;

    /// Newest first, limited to bookings in `apartment_id`.
    async fn list_for_party(
        &self,
        party: Party,
        user_id: Uuid,
        apartment_id: Uuid,
        page: Page,
    ) -> Result<Vec<Booking>, AppError>;

    /// Read, mutate and write one booking atomically, together with an optional ledger upsert.
    /// Fails with `NotFound` for an unknown id.
    async fn update_booking<'a>(
        &self,
        id: Uuid,
        scope: LockScope,
        mutation: BookingMutation<'a>,
    ) -> Result<UpdateOutcome, AppError>;

    async fn find_ledger_entry(&self, order_id: &str) -> Result<Option<LedgerEntry>, AppError>;

    /// Newest first.
    async fn list_ledger_entries(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Lookup of lendable items, owned by the item catalog.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn find_item(&self, item_id: Uuid) -> Result<Option<ItemListing>, AppError>;
}

pub(crate) fn booking_not_found(id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Booking {} not found", id))
}

/// Guard shared by store implementations: the gateway order id is write-once, and
/// `paid_at` is never cleared.
pub(crate) fn check_write_once(before: &Booking, after: &Booking) -> Result<(), AppError> {
    if before.gateway_order_id.is_some() && after.gateway_order_id != before.gateway_order_id {
        return Err(AppError::InternalError(anyhow::anyhow!(
            "Gateway order id of booking {} cannot be changed",
            before.id
        )));
    }
    if before.paid_at.is_some() && after.paid_at != before.paid_at {
        return Err(AppError::InternalError(anyhow::anyhow!(
            "Payment time of booking {} cannot be changed",
            before.id
        )));
    }
    Ok(())
}
