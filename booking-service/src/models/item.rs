//! Read model of a lendable item, owned by the item catalog.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ItemListing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub apartment_id: Uuid,
    pub name: String,
    pub price_per_day: Decimal,
    pub deposit_amount: Option<Decimal>,
    pub max_consecutive_days: Option<i32>,
    pub is_available: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ItemListing {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
