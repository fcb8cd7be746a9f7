//! Request and response bodies for the HTTP surface. JSON field names are camelCase.

use crate::models::{
    Booking, BookingStatus, LedgerEntry, LedgerMetadata, PartyRating, TransactionStatus,
};
use crate::services::store::Page;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub item_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBookingRequest {
    #[validate(length(max = 2000, message = "Return notes must be at most 2000 characters"))]
    pub return_notes: Option<String>,
    #[validate(length(max = 10, message = "At most 10 return images are allowed"))]
    pub return_images: Option<Vec<String>>,
}

/// Fields are optional here; which one is missing decides the error reported.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    #[validate(length(max = 64))]
    pub razorpay_order_id: Option<String>,
    #[validate(length(max = 64))]
    pub razorpay_payment_id: Option<String>,
    #[validate(length(max = 256))]
    pub razorpay_signature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.size)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl TransactionQuery {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingResponse {
    pub given: bool,
    pub rating: Option<Decimal>,
    pub review: Option<String>,
}

impl From<PartyRating> for RatingResponse {
    fn from(rating: PartyRating) -> Self {
        Self {
            given: rating.given,
            rating: rating.rating,
            review: rating.review,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
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
    pub razorpay_order_id: Option<String>,
    pub returned_at: Option<DateTime<Utc>>,
    pub return_notes: Option<String>,
    pub return_images: Vec<String>,
    pub damage_reported: bool,
    pub damage_amount: Decimal,
    pub borrower_rating: RatingResponse,
    pub owner_rating: RatingResponse,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            item_id: b.item_id,
            apartment_id: b.apartment_id,
            borrower_id: b.borrower_id,
            owner_id: b.owner_id,
            status: b.status,
            status_updated_at: b.status_updated_at,
            start_date: b.start_date,
            end_date: b.end_date,
            duration_days: b.duration_days,
            base_price: b.base_price,
            platform_fee: b.platform_fee,
            deposit_collected: b.deposit_collected,
            total_amount: b.total_amount,
            paid_at: b.paid_at,
            razorpay_order_id: b.gateway_order_id,
            returned_at: b.returned_at,
            return_notes: b.return_notes,
            return_images: b.return_images,
            damage_reported: b.damage_reported,
            damage_amount: b.damage_amount,
            borrower_rating: b.borrower_rating.into(),
            owner_rating: b.owner_rating.into(),
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

/// Gateway order details handed to the checkout client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrderResponse {
    pub booking_id: Uuid,
    pub order_id: String,
    /// Public key id for checkout initialization.
    pub key_id: String,
    /// Amount in paise.
    pub amount: u64,
    pub currency: String,
    pub status: String,
    pub booking_status: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub amount: Decimal,
    pub currency: String,
    pub razorpay_order_id: String,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub metadata: LedgerMetadata,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<LedgerEntry> for TransactionResponse {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            booking_id: e.booking_id,
            transaction_type: e.transaction_type,
            amount: e.amount,
            currency: e.currency,
            razorpay_order_id: e.gateway_order_id,
            status: e.status,
            description: e.description,
            metadata: e.metadata,
            created_at: e.created_at,
            completed_at: e.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_is_camel_case() {
        let body = r#"{
            "itemId": "7f9c24e8-3b12-4fef-91e0-7c2f1d1d2a10",
            "startDate": "2026-03-01T10:00:00Z",
            "endDate": "2026-03-02T10:00:00Z"
        }"#;
        let request: CreateBookingRequest = serde_json::from_str(body).unwrap();
        assert!(request.end_date > request.start_date);
    }

    #[test]
    fn test_return_request_limits() {
        let request = ReturnBookingRequest {
            return_notes: Some("x".repeat(2001)),
            return_images: None,
        };
        assert!(request.validate().is_err());

        let request = ReturnBookingRequest {
            return_notes: Some("All good".to_string()),
            return_images: Some(vec!["https://img/1.jpg".to_string()]),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_transaction_query_parses_status() {
        let query: TransactionQuery =
            serde_json::from_str(r#"{"status":"completed","size":500}"#).unwrap();
        assert_eq!(query.status, Some(TransactionStatus::Completed));
        assert_eq!(query.page().size, Page::MAX_SIZE);
    }
}
