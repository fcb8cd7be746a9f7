//! Postgres store tests. Run with `TEST_DATABASE_URL` pointing at a disposable database:
//! `cargo test -p booking-service --test postgres_store_test -- --ignored`.

mod common;

use booking_service::config::BookingRules;
use booking_service::middleware::CallerContext;
use booking_service::models::{Booking, BookingStatus, ItemListing, LedgerWrite, PaymentSource};
use booking_service::services::store::{LockScope, Mutation, Page, Party};
use booking_service::services::{BookingService, BookingStore, PgBookingStore};
use chrono::{Duration, Utc};
use common::{days_from_now, init_tracing};
use rust_decimal_macros::dec;
use serial_test::serial;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

async fn store() -> PgBookingStore {
    init_tracing();
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run Postgres store tests");
    let store = PgBookingStore::new(&url, 4, 1)
        .await
        .expect("Failed to connect to test database");
    store
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    store
}

async fn seed_item(store: &PgBookingStore) -> (ItemListing, CallerContext, CallerContext) {
    let apartment_id = Uuid::new_v4();
    let item = ItemListing {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        apartment_id,
        name: "Pressure washer".to_string(),
        price_per_day: dec!(150),
        deposit_amount: Some(dec!(500)),
        max_consecutive_days: None,
        is_available: true,
        deleted_at: None,
    };
    sqlx::query(
        r#"
        INSERT INTO items (id, owner_id, apartment_id, name, price_per_day, deposit_amount,
                           max_consecutive_days, is_available)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(item.id)
    .bind(item.owner_id)
    .bind(item.apartment_id)
    .bind(&item.name)
    .bind(item.price_per_day)
    .bind(item.deposit_amount)
    .bind(item.max_consecutive_days)
    .bind(item.is_available)
    .execute(store.pool())
    .await
    .expect("Failed to seed item");

    let owner = CallerContext::new(item.owner_id, apartment_id);
    let borrower = CallerContext::new(Uuid::new_v4(), apartment_id);
    (item, owner, borrower)
}

fn service(store: &PgBookingStore) -> BookingService {
    let shared = Arc::new(store.clone());
    BookingService::new(shared.clone(), shared, BookingRules::default())
}

#[tokio::test]
#[ignore]
#[serial]
async fn insert_and_read_back_booking() {
    let store = store().await;
    let (item, _, borrower) = seed_item(&store).await;
    let bookings = service(&store);
    let start = days_from_now(4);

    let created = bookings
        .create_booking(&borrower, item.id, start, start + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(created.duration_days, 3);
    assert_eq!(created.base_price, dec!(450));
    assert_eq!(created.platform_fee, dec!(45));
    assert_eq!(created.total_amount, dec!(995));

    let loaded = store.get_booking(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, BookingStatus::Requested);
    assert_eq!(loaded.total_amount, created.total_amount);
    assert!(loaded.return_images.is_empty());

    let listed = store
        .list_for_party(
            Party::Borrower,
            borrower.user_id,
            borrower.apartment_id,
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let elsewhere = store
        .list_for_party(
            Party::Borrower,
            borrower.user_id,
            Uuid::new_v4(),
            Page::default(),
        )
        .await
        .unwrap();
    assert!(elsewhere.is_empty());
}

#[tokio::test]
#[ignore]
#[serial]
async fn concurrent_inserts_are_serialized_per_item() {
    let store = store().await;
    let (item, _, _) = seed_item(&store).await;
    let bookings = service(&store);
    let start = days_from_now(6);

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let bookings = bookings.clone();
            let caller = CallerContext::new(Uuid::new_v4(), item.apartment_id);
            tokio::spawn(async move {
                bookings
                    .create_booking(&caller, item.id, start, start + Duration::days(1))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 4);
}

#[tokio::test]
#[ignore]
#[serial]
async fn ledger_upsert_never_regresses_completed_entries() {
    let store = store().await;
    let (item, owner, borrower) = seed_item(&store).await;
    let bookings = service(&store);
    let start = days_from_now(8);

    let booking = bookings
        .create_booking(&borrower, item.id, start, start)
        .await
        .unwrap();
    bookings.accept_booking(&owner, booking.id).await.unwrap();

    let order_id = format!("order_{}", Uuid::new_v4().simple());
    let pending_order = order_id.clone();
    let outcome = store
        .update_booking(
            booking.id,
            LockScope::Booking,
            Box::new(move |b: &mut Booking, _: &[Booking]| {
                b.gateway_order_id = Some(pending_order.clone());
                b.updated_at = Utc::now();
                Ok(Mutation::booking().with_ledger(LedgerWrite::pending(b, &pending_order, "created")))
            }),
        )
        .await
        .unwrap();
    assert_eq!(outcome.booking.gateway_order_id.as_deref(), Some(order_id.as_str()));

    let completed_order = order_id.clone();
    store
        .update_booking(
            booking.id,
            LockScope::Booking,
            Box::new(move |b: &mut Booking, _: &[Booking]| {
                b.paid_at = Some(Utc::now());
                Ok(Mutation::booking().with_ledger(LedgerWrite::completed(
                    b,
                    &completed_order,
                    Some("pay_pg"),
                    PaymentSource::Confirm,
                    None,
                )))
            }),
        )
        .await
        .unwrap();

    let failed_order = order_id.clone();
    let outcome = store
        .update_booking(
            booking.id,
            LockScope::Booking,
            Box::new(move |b: &mut Booking, _: &[Booking]| {
                Ok(Mutation::none().with_ledger(LedgerWrite::failed(
                    b,
                    &failed_order,
                    Some("pay_late"),
                    "payment.failed",
                )))
            }),
        )
        .await
        .unwrap();

    let entry = outcome.ledger.expect("ledger entry returned");
    assert_eq!(entry.status.as_str(), "completed");
    assert_eq!(entry.metadata.payment_id.as_deref(), Some("pay_pg"));

    let stored = store.find_ledger_entry(&order_id).await.unwrap().unwrap();
    assert_eq!(stored.status.as_str(), "completed");
}

#[tokio::test]
#[ignore]
#[serial]
async fn payment_fields_are_write_once() {
    let store = store().await;
    let (item, owner, borrower) = seed_item(&store).await;
    let bookings = service(&store);
    let start = days_from_now(10);

    let booking = bookings
        .create_booking(&borrower, item.id, start, start)
        .await
        .unwrap();
    bookings.accept_booking(&owner, booking.id).await.unwrap();

    store
        .update_booking(
            booking.id,
            LockScope::Booking,
            Box::new(|b: &mut Booking, _: &[Booking]| {
                b.gateway_order_id = Some(format!("order_{}", Uuid::new_v4().simple()));
                Ok(Mutation::booking())
            }),
        )
        .await
        .unwrap();

    let result = store
        .update_booking(
            booking.id,
            LockScope::Booking,
            Box::new(|b: &mut Booking, _: &[Booking]| {
                b.gateway_order_id = Some("order_replacement".to_string());
                Ok(Mutation::booking())
            }),
        )
        .await;
    assert!(result.is_err());
}
