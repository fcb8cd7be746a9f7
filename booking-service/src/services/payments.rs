//! Payment orchestration for bookings: order creation, checkout confirmation and webhook
//! reconciliation.
//!
//! Every booking mutation runs inside [`BookingStore::update_booking`], so a confirm racing a
//! webhook for the same order serializes on the booking row and the ledger sees one entry per
//! gateway order.

use crate::dtos::PaymentOrderResponse;
use crate::middleware::CallerContext;
use crate::models::{
    Booking, BookingStatus, LedgerEntry, LedgerWrite, PaymentSource, TransactionStatus,
    DEFAULT_CURRENCY,
};
use crate::services::bookings::authorize;
use crate::services::conflicts;
use crate::services::lifecycle;
use crate::services::metrics::record_payment_event;
use crate::services::pricing::to_minor_units;
use crate::services::razorpay::{GatewayError, RazorpayClient};
use crate::services::store::{BookingMutation, BookingStore, LockScope, Mutation, Page, Party};
use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const EVENT_PAYMENT_CAPTURED: &str = "payment.captured";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

const ORDER_STATUS_CREATED: &str = "created";
const PAYMENT_STATUS_PAID: &str = "paid";

/// How a webhook delivery was acknowledged. Every variant is a 200 for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    NotConfigured,
    MissingOrderId,
    BookingNotFound,
    Processed(String),
    Ignored(String),
}

impl WebhookOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::NotConfigured => "Razorpay webhook secret not configured. Event ignored.".to_string(),
            Self::MissingOrderId => "Webhook ignored: missing order_id".to_string(),
            Self::BookingNotFound => "Webhook ignored: booking not found".to_string(),
            Self::Processed(event) => format!("Webhook processed: {}", event),
            Self::Ignored(event) => format!("Webhook ignored: {}", event),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::MissingOrderId | Self::BookingNotFound => "unmapped",
            Self::Processed(_) => "processed",
            Self::Ignored(_) => "ignored",
        }
    }
}

fn ensure_payable(booking: &Booking) -> Result<(), AppError> {
    if booking.status != BookingStatus::Accepted {
        return Err(AppError::InvalidState(anyhow::anyhow!(
            "Only accepted bookings can be paid (current status: {})",
            booking.status
        )));
    }
    if booking.is_paid() {
        return Err(AppError::InvalidState(anyhow::anyhow!(
            "Booking is already paid"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn missing(field: &str) -> AppError {
    AppError::ValidationError(anyhow::anyhow!("{} is required", field))
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    gateway: RazorpayClient,
}

impl PaymentService {
    pub fn new(store: Arc<dyn BookingStore>, gateway: RazorpayClient) -> Self {
        Self { store, gateway }
    }

    fn order_response(&self, booking: &Booking, status: &str) -> Result<PaymentOrderResponse, AppError> {
        Ok(PaymentOrderResponse {
            booking_id: booking.id,
            order_id: booking.gateway_order_id.clone().unwrap_or_default(),
            key_id: self.gateway.key_id().to_string(),
            amount: to_minor_units(booking.total_amount)?,
            currency: DEFAULT_CURRENCY.to_string(),
            status: status.to_string(),
            booking_status: booking.status,
        })
    }

    /// Create the gateway order for an accepted booking, or hand back the one it already has.
    ///
    /// The gateway call happens outside any transaction. A failure there leaves the booking and
    /// the ledger untouched.
    #[instrument(skip(self, caller), fields(borrower_id = %caller.user_id))]
    pub async fn create_order(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
    ) -> Result<PaymentOrderResponse, AppError> {
        let configured = self.gateway.is_configured();
        let check_caller = *caller;

        let checked = self
            .store
            .update_booking(
                booking_id,
                LockScope::Item,
                Box::new(move |booking: &mut Booking, siblings: &[Booking]| {
                    authorize(booking, &check_caller, Party::Borrower)?;
                    ensure_payable(booking)?;
                    if !configured {
                        return Err(GatewayError::NotConfigured.into());
                    }

                    if let Some(order_id) = booking.gateway_order_id.as_deref() {
                        let write = LedgerWrite::pending(booking, order_id, ORDER_STATUS_CREATED);
                        return Ok(Mutation::none().with_ledger(write));
                    }

                    if !conflicts::committed_overlaps(booking, siblings).is_empty() {
                        return Err(AppError::Conflict(anyhow::anyhow!(
                            "Item is already committed to another booking for these dates"
                        )));
                    }
                    Ok(Mutation::none())
                }),
            )
            .await?;

        if checked.booking.gateway_order_id.is_some() {
            info!(
                booking_id = %booking_id,
                order_id = ?checked.booking.gateway_order_id,
                "Reusing existing Razorpay order"
            );
            return self.order_response(&checked.booking, ORDER_STATUS_CREATED);
        }

        let amount = to_minor_units(checked.booking.total_amount)?;
        let receipt = format!("booking_{}", booking_id);
        let order = self
            .gateway
            .create_order(amount, DEFAULT_CURRENCY, &receipt)
            .await
            .map_err(|e| {
                warn!(booking_id = %booking_id, error = %e, "Razorpay order creation failed");
                AppError::from(e)
            })?;

        let persist_caller = *caller;
        let order_id = order.id.clone();
        let order_status = order.status.clone();
        let outcome = self
            .store
            .update_booking(
                booking_id,
                LockScope::Booking,
                Box::new(move |booking: &mut Booking, _: &[Booking]| {
                    authorize(booking, &persist_caller, Party::Borrower)?;
                    ensure_payable(booking)?;

                    if let Some(existing) = booking.gateway_order_id.as_deref() {
                        warn!(
                            booking_id = %booking.id,
                            existing_order_id = %existing,
                            orphaned_order_id = %order_id,
                            "Booking received a Razorpay order concurrently, keeping the first"
                        );
                        let write = LedgerWrite::pending(booking, existing, ORDER_STATUS_CREATED);
                        return Ok(Mutation::none().with_ledger(write));
                    }

                    booking.gateway_order_id = Some(order_id.clone());
                    booking.updated_at = Utc::now();
                    let write = LedgerWrite::pending(booking, &order_id, &order_status);
                    Ok(Mutation::booking().with_ledger(write))
                }),
            )
            .await?;

        let status = if outcome.booking.gateway_order_id.as_deref() == Some(order.id.as_str()) {
            order.status.as_str()
        } else {
            ORDER_STATUS_CREATED
        };

        record_payment_event(PaymentSource::Order.as_str(), "created");
        info!(
            booking_id = %booking_id,
            order_id = ?outcome.booking.gateway_order_id,
            amount,
            "Payment order ready"
        );
        self.order_response(&outcome.booking, status)
    }

    /// Confirm a checkout reported by the client.
    ///
    /// Resolution, validation, signature check and capture all run against the locked booking.
    #[instrument(skip(self, caller, signature), fields(borrower_id = %caller.user_id))]
    pub async fn confirm_payment(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
        order_id: Option<String>,
        payment_id: Option<String>,
        signature: Option<String>,
    ) -> Result<PaymentOrderResponse, AppError> {
        let gateway = self.gateway.clone();
        let caller = *caller;

        let result = self
            .store
            .update_booking(
                booking_id,
                LockScope::Booking,
                Box::new(move |booking: &mut Booking, _: &[Booking]| {
                    authorize(booking, &caller, Party::Borrower)?;

                    let order_id = non_blank(order_id)
                        .or_else(|| booking.gateway_order_id.clone())
                        .ok_or_else(|| {
                            AppError::ValidationError(anyhow::anyhow!(
                                "No Razorpay order found for this booking"
                            ))
                        })?;
                    let payment_id = non_blank(payment_id).ok_or_else(|| missing("razorpayPaymentId"))?;
                    let signature = non_blank(signature).ok_or_else(|| missing("razorpaySignature"))?;

                    if booking.gateway_order_id.as_deref() != Some(order_id.as_str()) {
                        warn!(
                            booking_id = %booking.id,
                            expected_order_id = ?booking.gateway_order_id,
                            received_order_id = %order_id,
                            "Order ID mismatch"
                        );
                        return Err(AppError::ValidationError(anyhow::anyhow!(
                            "Razorpay order does not match this booking"
                        )));
                    }

                    if booking.is_paid()
                        && matches!(booking.status, BookingStatus::Accepted | BookingStatus::Active)
                    {
                        return Ok(Mutation::none());
                    }

                    if booking.status != BookingStatus::Accepted {
                        return Err(AppError::InvalidState(anyhow::anyhow!(
                            "Only accepted bookings can be paid (current status: {})",
                            booking.status
                        )));
                    }

                    if !gateway.verify_payment_signature(&order_id, &payment_id, &signature)? {
                        return Err(AppError::ValidationError(anyhow::anyhow!(
                            "Invalid Razorpay payment signature"
                        )));
                    }

                    let changed = lifecycle::record_capture(booking, Utc::now())?;
                    let write = LedgerWrite::completed(
                        booking,
                        &order_id,
                        Some(&payment_id),
                        PaymentSource::Confirm,
                        None,
                    );
                    Ok(Mutation {
                        booking_changed: changed,
                        ledger: Some(write),
                    })
                }),
            )
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                record_payment_event(PaymentSource::Confirm.as_str(), "rejected");
                return Err(e);
            }
        };

        let label = if outcome.ledger.is_some() {
            "captured"
        } else {
            "duplicate"
        };
        record_payment_event(PaymentSource::Confirm.as_str(), label);
        info!(
            booking_id = %booking_id,
            status = %outcome.booking.status,
            outcome = label,
            "Payment confirmed"
        );

        self.order_response(&outcome.booking, PAYMENT_STATUS_PAID)
    }

    /// Reconcile a gateway webhook delivery.
    ///
    /// Only a bad signature or an unparseable body is an error. Deliveries this service cannot
    /// map are acknowledged so the gateway stops retrying.
    #[instrument(skip(self, body, signature))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        let outcome = self.reconcile(body, signature).await;
        match &outcome {
            Ok(outcome) => {
                record_payment_event(PaymentSource::Webhook.as_str(), outcome.label());
                info!(outcome = %outcome.message(), "Webhook acknowledged");
            }
            Err(e) => {
                record_payment_event(PaymentSource::Webhook.as_str(), "rejected");
                warn!(error = %e, "Webhook rejected");
            }
        }
        outcome
    }

    async fn reconcile(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        if !self.gateway.webhook_configured() {
            warn!("Razorpay webhook secret not configured, ignoring delivery");
            return Ok(WebhookOutcome::NotConfigured);
        }

        let invalid_signature =
            || AppError::ValidationError(anyhow::anyhow!("Invalid webhook signature"));
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid_signature)?;
        if !self.gateway.verify_webhook_signature(body, signature)? {
            return Err(invalid_signature());
        }

        let event = self.gateway.parse_webhook_event(body)?;
        let Some(order_id) = event.order_id() else {
            return Ok(WebhookOutcome::MissingOrderId);
        };
        let Some(booking) = self.store.find_by_gateway_order(order_id).await? else {
            info!(order_id = %order_id, event = %event.event, "No booking for webhook order");
            return Ok(WebhookOutcome::BookingNotFound);
        };

        let order_id = order_id.to_string();
        let payment_id = event.payment_id().map(str::to_string);
        let event_name = event.event.clone();

        let mutation: BookingMutation<'static> = match event_name.as_str() {
            EVENT_PAYMENT_CAPTURED => {
                let event_name = event_name.clone();
                Box::new(move |booking: &mut Booking, _: &[Booking]| {
                    let changed = lifecycle::record_capture(booking, Utc::now())?;
                    let write = LedgerWrite::completed(
                        booking,
                        &order_id,
                        payment_id.as_deref(),
                        PaymentSource::Webhook,
                        Some(&event_name),
                    );
                    Ok(Mutation {
                        booking_changed: changed,
                        ledger: Some(write),
                    })
                })
            }
            EVENT_PAYMENT_FAILED => {
                let event_name = event_name.clone();
                Box::new(move |booking: &mut Booking, _: &[Booking]| {
                    let write = LedgerWrite::failed(
                        booking,
                        &order_id,
                        payment_id.as_deref(),
                        &event_name,
                    );
                    Ok(Mutation::none().with_ledger(write))
                })
            }
            _ => return Ok(WebhookOutcome::Ignored(event.event)),
        };

        let outcome = self
            .store
            .update_booking(booking.id, LockScope::Booking, mutation)
            .await?;

        info!(
            booking_id = %booking.id,
            event = %event_name,
            status = %outcome.booking.status,
            paid = outcome.booking.is_paid(),
            ledger_status = ?outcome.ledger.as_ref().map(|l| l.status),
            "Webhook reconciled"
        );
        Ok(WebhookOutcome::Processed(event_name))
    }

    pub async fn list_my_transactions(
        &self,
        caller: &CallerContext,
        status: Option<TransactionStatus>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        self.store
            .list_ledger_entries(caller.user_id, status, page)
            .await
    }
}
