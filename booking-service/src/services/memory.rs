//! In-process store used for local development and tests.
//!
//! A single mutex serializes every operation, which gives the same atomicity as the row and
//! advisory locks taken by the Postgres store.

use crate::models::{Booking, ItemListing, LedgerEntry, LedgerWrite, TransactionStatus};
use crate::services::conflicts;
use crate::services::store::{
    booking_not_found, check_write_once, BookingMutation, BookingStore, InsertOutcome,
    ItemCatalog, LockScope, Page, Party, UpdateOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    bookings: HashMap<Uuid, Booking>,
    ledger: HashMap<String, LedgerEntry>,
    items: HashMap<Uuid, ItemListing>,
}

#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_item(&self, item: ItemListing) {
        self.state.lock().await.items.insert(item.id, item);
    }

    /// Store a booking as-is, bypassing the conflict rule.
    pub async fn put_booking(&self, booking: Booking) {
        self.state.lock().await.bookings.insert(booking.id, booking);
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.lock().await.ledger.len()
    }
}

fn upsert_ledger(
    ledger: &mut HashMap<String, LedgerEntry>,
    write: LedgerWrite,
    now: DateTime<Utc>,
) -> LedgerEntry {
    match ledger.entry(write.gateway_order_id.clone()) {
        Entry::Occupied(mut occupied) => {
            let entry = occupied.get_mut();
            if !entry.absorb(write, now) {
                tracing::debug!(
                    order_id = %entry.gateway_order_id,
                    "Ledger entry already completed, write ignored"
                );
            }
            entry.clone()
        }
        Entry::Vacant(vacant) => vacant.insert(LedgerEntry::from_write(write, now)).clone(),
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_booking(
        &self,
        booking: Booking,
        grace_cutoff: DateTime<Utc>,
    ) -> Result<InsertOutcome, AppError> {
        let mut state = self.state.lock().await;

        let blockers = conflicts::find_conflicts(
            state.bookings.values(),
            booking.item_id,
            &booking.window(),
            grace_cutoff,
        );
        if !blockers.is_empty() {
            return Ok(InsertOutcome::Conflicts(blockers));
        }

        state.bookings.insert(booking.id, booking.clone());
        Ok(InsertOutcome::Inserted(booking))
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn find_by_gateway_order(&self, order_id: &str) -> Result<Option<Booking>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.gateway_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn list_for_party(
        &self,
        party: Party,
        user_id: Uuid,
        apartment_id: Uuid,
        page: Page,
    ) -> Result<Vec<Booking>, AppError> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.apartment_id == apartment_id && party.matches(b, user_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(bookings
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn update_booking<'a>(
        &self,
        id: Uuid,
        scope: LockScope,
        mutation: BookingMutation<'a>,
    ) -> Result<UpdateOutcome, AppError> {
        let mut state = self.state.lock().await;
        let current = state
            .bookings
            .get(&id)
            .cloned()
            .ok_or_else(|| booking_not_found(id))?;

        let siblings: Vec<Booking> = match scope {
            LockScope::Booking => Vec::new(),
            LockScope::Item => {
                let window = current.window();
                state
                    .bookings
                    .values()
                    .filter(|b| {
                        b.id != id
                            && b.item_id == current.item_id
                            && b.status.holds_item()
                            && b.window().overlaps(&window)
                    })
                    .cloned()
                    .collect()
            }
        };

        let mut working = current.clone();
        let mutation = mutation(&mut working, siblings.as_slice())?;

        let booking = if mutation.booking_changed {
            check_write_once(&current, &working)?;
            if let Some(order_id) = working.gateway_order_id.as_deref() {
                let taken = state
                    .bookings
                    .values()
                    .any(|b| b.id != id && b.gateway_order_id.as_deref() == Some(order_id));
                if taken {
                    return Err(AppError::InternalError(anyhow::anyhow!(
                        "Gateway order {} already belongs to another booking",
                        order_id
                    )));
                }
            }
            state.bookings.insert(id, working.clone());
            working
        } else {
            current
        };

        let ledger = mutation
            .ledger
            .map(|write| upsert_ledger(&mut state.ledger, write, Utc::now()));

        Ok(UpdateOutcome { booking, ledger })
    }

    async fn find_ledger_entry(&self, order_id: &str) -> Result<Option<LedgerEntry>, AppError> {
        Ok(self.state.lock().await.ledger.get(order_id).cloned())
    }

    async fn list_ledger_entries(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .values()
            .filter(|e| e.user_id == user_id && status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(entries
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl ItemCatalog for InMemoryBookingStore {
    async fn find_item(&self, item_id: Uuid) -> Result<Option<ItemListing>, AppError> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }
}
