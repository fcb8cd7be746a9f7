//! Postgres store for bookings and the payment ledger.
//!
//! Lock order is always the per-item advisory lock first, then the booking row.

use crate::models::{
    Booking, BookingStatus, ItemListing, LedgerEntry, LedgerMetadata, LedgerWrite, PartyRating,
    TransactionStatus,
};
use crate::services::conflicts;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    booking_not_found, check_write_once, BookingMutation, BookingStore, InsertOutcome,
    ItemCatalog, LockScope, Page, Party, UpdateOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, item_id, apartment_id, borrower_id, owner_id, status, \
    status_updated_at, start_date, end_date, duration_days, base_price, platform_fee, \
    deposit_collected, total_amount, paid_at, gateway_order_id, returned_at, return_notes, \
    return_images, damage_reported, damage_amount, borrower_rating_given, borrower_rating, \
    borrower_review, owner_rating_given, owner_rating, owner_review, created_at, updated_at";

const LEDGER_COLUMNS: &str = "id, user_id, booking_id, transaction_type, amount, currency, \
    gateway_order_id, status, description, metadata, created_at, completed_at";

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    item_id: Uuid,
    apartment_id: Uuid,
    borrower_id: Uuid,
    owner_id: Uuid,
    status: String,
    status_updated_at: DateTime<Utc>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    duration_days: i32,
    base_price: Decimal,
    platform_fee: Decimal,
    deposit_collected: Decimal,
    total_amount: Decimal,
    paid_at: Option<DateTime<Utc>>,
    gateway_order_id: Option<String>,
    returned_at: Option<DateTime<Utc>>,
    return_notes: Option<String>,
    return_images: Json<Vec<String>>,
    damage_reported: bool,
    damage_amount: Decimal,
    borrower_rating_given: bool,
    borrower_rating: Option<Decimal>,
    borrower_review: Option<String>,
    owner_rating_given: bool,
    owner_rating: Option<Decimal>,
    owner_review: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = AppError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status: BookingStatus = row
            .status
            .parse()
            .map_err(|e: String| AppError::InternalError(anyhow::anyhow!(e)))?;

        Ok(Booking {
            id: row.id,
            item_id: row.item_id,
            apartment_id: row.apartment_id,
            borrower_id: row.borrower_id,
            owner_id: row.owner_id,
            status,
            status_updated_at: row.status_updated_at,
            start_date: row.start_date,
            end_date: row.end_date,
            duration_days: row.duration_days,
            base_price: row.base_price,
            platform_fee: row.platform_fee,
            deposit_collected: row.deposit_collected,
            total_amount: row.total_amount,
            paid_at: row.paid_at,
            gateway_order_id: row.gateway_order_id,
            returned_at: row.returned_at,
            return_notes: row.return_notes,
            return_images: row.return_images.0,
            damage_reported: row.damage_reported,
            damage_amount: row.damage_amount,
            borrower_rating: PartyRating {
                given: row.borrower_rating_given,
                rating: row.borrower_rating,
                review: row.borrower_review,
            },
            owner_rating: PartyRating {
                given: row.owner_rating_given,
                rating: row.owner_rating,
                review: row.owner_review,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    id: Uuid,
    user_id: Uuid,
    booking_id: Option<Uuid>,
    transaction_type: String,
    amount: Decimal,
    currency: String,
    gateway_order_id: String,
    status: String,
    description: Option<String>,
    metadata: Json<LedgerMetadata>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let status: TransactionStatus = row
            .status
            .parse()
            .map_err(|e: String| AppError::InternalError(anyhow::anyhow!(e)))?;

        Ok(LedgerEntry {
            id: row.id,
            user_id: row.user_id,
            booking_id: row.booking_id,
            transaction_type: row.transaction_type,
            amount: row.amount,
            currency: row.currency,
            gateway_order_id: row.gateway_order_id,
            status,
            description: row.description,
            metadata: row.metadata.0,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn to_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, AppError> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn holding_statuses() -> Vec<String> {
    BookingStatus::HOLDING
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Postgres-backed [`BookingStore`] and [`ItemCatalog`].
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "booking-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Serializes conflict checks per item until the transaction ends.
    async fn lock_item(conn: &mut PgConnection, item_id: Uuid) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(item_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to lock item"))?;
        Ok(())
    }

    async fn booking_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Booking>, AppError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("Failed to lock booking"))?;

        row.map(Booking::try_from).transpose()
    }

    /// Bookings on the item that still hold it, excluding `exclude`.
    async fn holding_bookings(
        conn: &mut PgConnection,
        item_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Booking>, AppError> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE item_id = $1
              AND status = ANY($2)
              AND ($3::uuid IS NULL OR id <> $3)
            ORDER BY start_date
            "#,
            BOOKING_COLUMNS
        ))
        .bind(item_id)
        .bind(holding_statuses())
        .bind(exclude)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("Failed to load item bookings"))?;

        to_bookings(rows)
    }

    async fn insert_row(conn: &mut PgConnection, b: &Booking) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO bookings ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)
            "#,
            BOOKING_COLUMNS
        ))
        .bind(b.id)
        .bind(b.item_id)
        .bind(b.apartment_id)
        .bind(b.borrower_id)
        .bind(b.owner_id)
        .bind(b.status.as_str())
        .bind(b.status_updated_at)
        .bind(b.start_date)
        .bind(b.end_date)
        .bind(b.duration_days)
        .bind(b.base_price)
        .bind(b.platform_fee)
        .bind(b.deposit_collected)
        .bind(b.total_amount)
        .bind(b.paid_at)
        .bind(b.gateway_order_id.as_deref())
        .bind(b.returned_at)
        .bind(b.return_notes.as_deref())
        .bind(Json(&b.return_images))
        .bind(b.damage_reported)
        .bind(b.damage_amount)
        .bind(b.borrower_rating.given)
        .bind(b.borrower_rating.rating)
        .bind(b.borrower_rating.review.as_deref())
        .bind(b.owner_rating.given)
        .bind(b.owner_rating.rating)
        .bind(b.owner_rating.review.as_deref())
        .bind(b.created_at)
        .bind(b.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to insert booking"))?;
        Ok(())
    }

    async fn update_row(conn: &mut PgConnection, b: &Booking) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE bookings SET
                status = $2,
                status_updated_at = $3,
                paid_at = $4,
                gateway_order_id = $5,
                returned_at = $6,
                return_notes = $7,
                return_images = $8,
                damage_reported = $9,
                damage_amount = $10,
                borrower_rating_given = $11,
                borrower_rating = $12,
                borrower_review = $13,
                owner_rating_given = $14,
                owner_rating = $15,
                owner_review = $16,
                updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(b.id)
        .bind(b.status.as_str())
        .bind(b.status_updated_at)
        .bind(b.paid_at)
        .bind(b.gateway_order_id.as_deref())
        .bind(b.returned_at)
        .bind(b.return_notes.as_deref())
        .bind(Json(&b.return_images))
        .bind(b.damage_reported)
        .bind(b.damage_amount)
        .bind(b.borrower_rating.given)
        .bind(b.borrower_rating.rating)
        .bind(b.borrower_rating.review.as_deref())
        .bind(b.owner_rating.given)
        .bind(b.owner_rating.rating)
        .bind(b.owner_rating.review.as_deref())
        .bind(b.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::InternalError(anyhow::anyhow!(
                    "Gateway order {:?} already belongs to another booking",
                    b.gateway_order_id
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update booking: {}", e)),
        })?;
        Ok(())
    }

    /// Insert-or-update keyed by gateway order id. A completed entry is never downgraded;
    /// in that case the stored row is returned unchanged.
    async fn upsert_ledger(
        conn: &mut PgConnection,
        write: LedgerWrite,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, AppError> {
        let entry = LedgerEntry::from_write(write, now);

        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"
            INSERT INTO transactions ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (gateway_order_id) DO UPDATE SET
                status = EXCLUDED.status,
                description = EXCLUDED.description,
                metadata = EXCLUDED.metadata,
                completed_at = COALESCE(transactions.completed_at, EXCLUDED.completed_at)
            WHERE transactions.status <> 'completed' OR EXCLUDED.status = 'completed'
            RETURNING {columns}
            "#,
            columns = LEDGER_COLUMNS
        ))
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.booking_id)
        .bind(&entry.transaction_type)
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(&entry.gateway_order_id)
        .bind(entry.status.as_str())
        .bind(entry.description.as_deref())
        .bind(Json(&entry.metadata))
        .bind(entry.created_at)
        .bind(entry.completed_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("Failed to upsert ledger entry"))?;

        let row = match row {
            Some(row) => row,
            None => {
                debug!(
                    order_id = %entry.gateway_order_id,
                    "Ledger entry already completed, write ignored"
                );
                sqlx::query_as::<_, LedgerRow>(&format!(
                    "SELECT {} FROM transactions WHERE gateway_order_id = $1",
                    LEDGER_COLUMNS
                ))
                .bind(&entry.gateway_order_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(db_error("Failed to load ledger entry"))?
            }
        };

        LedgerEntry::try_from(row)
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    #[instrument(skip(self, booking), fields(booking_id = %booking.id, item_id = %booking.item_id))]
    async fn insert_booking(
        &self,
        booking: Booking,
        grace_cutoff: DateTime<Utc>,
    ) -> Result<InsertOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_booking"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        Self::lock_item(&mut tx, booking.item_id).await?;
        let holding = Self::holding_bookings(&mut tx, booking.item_id, None).await?;
        let blockers =
            conflicts::find_conflicts(&holding, booking.item_id, &booking.window(), grace_cutoff);
        if !blockers.is_empty() {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(InsertOutcome::Conflicts(blockers));
        }

        Self::insert_row(&mut tx, &booking).await?;
        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();
        Ok(InsertOutcome::Inserted(booking))
    }

    #[instrument(skip(self))]
    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking"])
            .start_timer();

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get booking"))?;

        timer.observe_duration();
        row.map(Booking::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_gateway_order(&self, order_id: &str) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_gateway_order"])
            .start_timer();

        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE gateway_order_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find booking by order"))?;

        timer.observe_duration();
        row.map(Booking::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_for_party(
        &self,
        party: Party,
        user_id: Uuid,
        apartment_id: Uuid,
        page: Page,
    ) -> Result<Vec<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_for_party"])
            .start_timer();

        let column = match party {
            Party::Borrower => "borrower_id",
            Party::Owner => "owner_id",
        };

        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE {} = $1 AND apartment_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            BOOKING_COLUMNS, column
        ))
        .bind(user_id)
        .bind(apartment_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list bookings"))?;

        timer.observe_duration();
        to_bookings(rows)
    }

    #[instrument(skip(self, mutation))]
    async fn update_booking<'a>(
        &self,
        id: Uuid,
        scope: LockScope,
        mutation: BookingMutation<'a>,
    ) -> Result<UpdateOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_booking"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        if scope == LockScope::Item {
            let item_id: Option<Uuid> =
                sqlx::query_scalar("SELECT item_id FROM bookings WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error("Failed to resolve booking item"))?;
            let item_id = item_id.ok_or_else(|| booking_not_found(id))?;
            Self::lock_item(&mut tx, item_id).await?;
        }

        let current = Self::booking_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| booking_not_found(id))?;

        let siblings = match scope {
            LockScope::Booking => Vec::new(),
            LockScope::Item => {
                let window = current.window();
                Self::holding_bookings(&mut tx, current.item_id, Some(id))
                    .await?
                    .into_iter()
                    .filter(|b| b.window().overlaps(&window))
                    .collect()
            }
        };

        let mut working = current.clone();
        let mutation = mutation(&mut working, siblings.as_slice())?;

        let booking = if mutation.booking_changed {
            check_write_once(&current, &working)?;
            Self::update_row(&mut tx, &working).await?;
            working
        } else {
            current
        };

        let ledger = match mutation.ledger {
            Some(write) => Some(Self::upsert_ledger(&mut tx, write, Utc::now()).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();
        Ok(UpdateOutcome { booking, ledger })
    }

    #[instrument(skip(self))]
    async fn find_ledger_entry(&self, order_id: &str) -> Result<Option<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_ledger_entry"])
            .start_timer();

        let row = sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {} FROM transactions WHERE gateway_order_id = $1",
            LEDGER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get ledger entry"))?;

        timer.observe_duration();
        row.map(LedgerEntry::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_ledger_entries(
        &self,
        user_id: Uuid,
        status: Option<TransactionStatus>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_ledger_entries"])
            .start_timer();

        let rows = sqlx::query_as::<_, LedgerRow>(&format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE user_id = $1
              AND ($2::varchar IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list ledger entries"))?;

        timer.observe_duration();
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ItemCatalog for PgBookingStore {
    #[instrument(skip(self))]
    async fn find_item(&self, item_id: Uuid) -> Result<Option<ItemListing>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_item"])
            .start_timer();

        let item = sqlx::query_as::<_, ItemListing>(
            r#"
            SELECT id, owner_id, apartment_id, name, price_per_day, deposit_amount,
                   max_consecutive_days, is_available, deleted_at
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get item"))?;

        timer.observe_duration();
        Ok(item)
    }
}
