//! Razorpay payment handlers for bookings.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::extract::WithRejection;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        ConfirmPaymentRequest, PaymentOrderResponse, TransactionQuery, TransactionResponse,
        WebhookAck,
    },
    middleware::{CallerContext, OptionalJson},
    startup::AppState,
};

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Create or reuse the Razorpay order for a booking. Also mounted as `/intent`.
pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentOrderResponse>, AppError> {
    let order = state.payments.create_order(&caller, id).await?;
    Ok(Json(order))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
    payload: OptionalJson<ConfirmPaymentRequest>,
) -> Result<Json<PaymentOrderResponse>, AppError> {
    let payload = payload.into_inner_or_default();
    payload.validate()?;

    tracing::info!(
        booking_id = %id,
        razorpay_order_id = ?payload.razorpay_order_id,
        razorpay_payment_id = ?payload.razorpay_payment_id,
        "Confirming Razorpay payment"
    );

    let order = state
        .payments
        .confirm_payment(
            &caller,
            id,
            payload.razorpay_order_id,
            payload.razorpay_payment_id,
            payload.razorpay_signature,
        )
        .await?;
    Ok(Json(order))
}

pub async fn list_my_transactions(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let entries = state
        .payments
        .list_my_transactions(&caller, query.status, query.page())
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Razorpay webhook receiver. The raw body is needed for signature verification.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(body, _): WithRejection<Bytes, AppError>,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookAck {
        message: outcome.message(),
    }))
}
