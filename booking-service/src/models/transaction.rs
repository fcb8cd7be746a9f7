//! Idempotency ledger: one entry per gateway order.

use super::Booking;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BOOKING_PAYMENT: &str = "booking_payment";
pub const DEFAULT_CURRENCY: &str = "INR";
pub const GATEWAY_NAME: &str = "razorpay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// Which path recorded the ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Order,
    Confirm,
    Webhook,
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Confirm => "confirm",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMetadata {
    pub gateway: String,
    pub source: PaymentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl LedgerMetadata {
    fn new(source: PaymentSource) -> Self {
        Self {
            gateway: GATEWAY_NAME.to_string(),
            source,
            order_status: None,
            payment_id: None,
            event: None,
        }
    }
}

/// Persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub transaction_type: String,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_order_id: String,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub metadata: LedgerMetadata,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert-or-update request keyed by gateway order id.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerWrite {
    pub user_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_order_id: String,
    pub status: TransactionStatus,
    pub description: String,
    pub metadata: LedgerMetadata,
}

impl LedgerWrite {
    fn for_booking(
        booking: &Booking,
        order_id: &str,
        status: TransactionStatus,
        metadata: LedgerMetadata,
    ) -> Self {
        Self {
            user_id: booking.borrower_id,
            booking_id: Some(booking.id),
            amount: booking.total_amount,
            currency: DEFAULT_CURRENCY.to_string(),
            gateway_order_id: order_id.to_string(),
            status,
            description: format!("Booking payment for {}", booking.id),
            metadata,
        }
    }

    pub fn pending(booking: &Booking, order_id: &str, order_status: &str) -> Self {
        let mut metadata = LedgerMetadata::new(PaymentSource::Order);
        metadata.order_status = Some(order_status.to_string());
        Self::for_booking(booking, order_id, TransactionStatus::Pending, metadata)
    }

    pub fn completed(
        booking: &Booking,
        order_id: &str,
        payment_id: Option<&str>,
        source: PaymentSource,
        event: Option<&str>,
    ) -> Self {
        let mut metadata = LedgerMetadata::new(source);
        metadata.payment_id = payment_id.map(str::to_string);
        metadata.event = event.map(str::to_string);
        Self::for_booking(booking, order_id, TransactionStatus::Completed, metadata)
    }

    pub fn failed(
        booking: &Booking,
        order_id: &str,
        payment_id: Option<&str>,
        event: &str,
    ) -> Self {
        let mut metadata = LedgerMetadata::new(PaymentSource::Webhook);
        metadata.payment_id = payment_id.map(str::to_string);
        metadata.event = Some(event.to_string());
        Self::for_booking(booking, order_id, TransactionStatus::Failed, metadata)
    }
}

impl LedgerEntry {
    pub fn from_write(write: LedgerWrite, now: DateTime<Utc>) -> Self {
        let completed_at = (write.status == TransactionStatus::Completed).then_some(now);
        Self {
            id: Uuid::new_v4(),
            user_id: write.user_id,
            booking_id: write.booking_id,
            transaction_type: BOOKING_PAYMENT.to_string(),
            amount: write.amount,
            currency: write.currency,
            gateway_order_id: write.gateway_order_id,
            status: write.status,
            description: Some(write.description),
            metadata: write.metadata,
            created_at: now,
            completed_at,
        }
    }

    /// Whether a repeated write may overwrite this entry. A completed entry never regresses.
    pub fn accepts(&self, incoming: TransactionStatus) -> bool {
        self.status != TransactionStatus::Completed || incoming == TransactionStatus::Completed
    }

    /// Fold a repeated write into this entry. Returns false when the write was refused.
    pub fn absorb(&mut self, write: LedgerWrite, now: DateTime<Utc>) -> bool {
        if !self.accepts(write.status) {
            return false;
        }
        if write.status == TransactionStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = write.status;
        self.description = Some(write.description);
        self.metadata = write.metadata;
        true
    }
}
