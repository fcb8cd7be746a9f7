//! Razorpay payment gateway client.
//!
//! Implements Razorpay's Orders API for payment initiation and the HMAC signature checks used
//! for checkout confirmation and webhooks.

use crate::config::RazorpayConfig;
use crate::services::metrics::record_gateway_request;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::utils::signature::verify_hmac_sha256_hex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Razorpay credentials are not configured")]
    NotConfigured,

    #[error("Razorpay request timed out")]
    Timeout,

    #[error("Razorpay request failed: {0}")]
    Transport(String),

    #[error("Razorpay error: {code} - {description}")]
    Rejected { code: String, description: String },

    #[error("Malformed Razorpay response: {0}")]
    MalformedResponse(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::ValidationError(anyhow::Error::new(err))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Razorpay client for interacting with the Razorpay API.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest<'a> {
    /// Amount in smallest currency unit (paise for INR).
    pub amount: u64,
    pub currency: &'a str,
    pub receipt: &'a str,
    /// 1 = capture automatically once authorized.
    pub payment_capture: u8,
}

/// Response from Razorpay order creation.
#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    pub receipt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

/// Razorpay webhook event. Only the fields reconciliation needs are read.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookPaymentEntity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPaymentEntity {
    #[serde(default)]
    pub entity: PaymentEntity,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentEntity {
    pub id: Option<String>,
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<u64>,
}

impl WebhookEvent {
    fn entity(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    pub fn order_id(&self) -> Option<&str> {
        self.entity()
            .and_then(|e| e.order_id.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.entity()
            .and_then(|e| e.id.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl RazorpayClient {
    /// Create a new Razorpay client with a bounded request timeout.
    pub fn new(config: RazorpayConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Check if Razorpay is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }

    pub fn webhook_configured(&self) -> bool {
        self.config.has_webhook_secret()
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Create a new order in Razorpay.
    ///
    /// A timeout, transport failure, non-2xx reply, or a reply without an order id is an error.
    pub async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let result = self.send_create_order(amount, currency, receipt).await;
        record_gateway_request("create_order", result.is_ok());
        result
    }

    async fn send_create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<RazorpayOrder, GatewayError> {
        let request = CreateOrderRequest {
            amount,
            currency,
            receipt,
            payment_capture: 1,
        };

        let url = format!("{}/orders", self.config.api_base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Razorpay create_order response");

        if !status.is_success() {
            let detail = serde_json::from_str::<RazorpayErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| RazorpayErrorDetail {
                    code: status.as_u16().to_string(),
                    description: body.chars().take(200).collect(),
                });
            tracing::error!(
                code = %detail.code,
                description = %detail.description,
                "Razorpay order creation failed"
            );
            return Err(GatewayError::Rejected {
                code: detail.code,
                description: detail.description,
            });
        }

        let order: RazorpayOrder = serde_json::from_str(&body)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        if order.id.trim().is_empty() {
            return Err(GatewayError::MalformedResponse(
                "order id missing".to_string(),
            ));
        }

        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            currency = %order.currency,
            "Razorpay order created"
        );
        Ok(order)
    }

    /// Verify payment signature from Razorpay checkout.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, AppError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured.into());
        }

        let payload = format!("{}|{}", order_id, payment_id);
        let is_valid = verify_hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            payload.as_bytes(),
            signature,
        )?;

        if is_valid {
            tracing::info!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }

    /// Verify webhook signature.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(request_body, webhook_secret)`
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> Result<bool, AppError> {
        let is_valid = verify_hmac_sha256_hex(
            self.config.webhook_secret.expose_secret(),
            body,
            signature.trim(),
        )?;

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(is_valid)
    }

    /// Parse webhook event from request body.
    pub fn parse_webhook_event(&self, body: &[u8]) -> Result<WebhookEvent, AppError> {
        serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(error = %e, "Malformed webhook payload");
            AppError::ValidationError(anyhow::anyhow!("Invalid webhook payload"))
        })
    }
}
