//! Common test utilities for booking-service integration tests.
#![allow(dead_code)]

use booking_service::config::{
    BookingConfig, BookingRules, DatabaseConfig, Environment, RazorpayConfig, StoreBackend,
};
use booking_service::middleware::caller::{APARTMENT_ID_HEADER, USER_ID_HEADER};
use booking_service::middleware::CallerContext;
use booking_service::models::{Booking, ItemListing};
use booking_service::services::{init_metrics, BookingStore, InMemoryBookingStore};
use booking_service::startup::Application;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Method, RequestBuilder, Response};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;
use service_core::utils::signature::hmac_sha256_hex;
use std::sync::{Arc, Once};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KEY_ID: &str = "rzp_test_key";
pub const KEY_SECRET: &str = "rzp_test_secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

static INIT: Once = Once::new();

/// Initialize tracing and the metrics recorder for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,booking_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
        init_metrics();
    });
}

pub fn test_config(gateway_url: &str) -> BookingConfig {
    BookingConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "booking-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        database: DatabaseConfig {
            url: Secret::new(String::new()),
            max_connections: 2,
            min_connections: 1,
        },
        razorpay: RazorpayConfig {
            key_id: KEY_ID.to_string(),
            key_secret: Secret::new(KEY_SECRET.to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: gateway_url.to_string(),
            timeout_secs: 2,
        },
        rules: BookingRules::default(),
    }
}

/// Owner, borrower and one item in a shared apartment.
pub struct Scenario {
    pub owner: CallerContext,
    pub borrower: CallerContext,
    pub item: ItemListing,
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: InMemoryBookingStore,
    pub gateway: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut BookingConfig)) -> Self {
        init_tracing();

        let gateway = MockServer::start().await;
        let mut config = test_config(&gateway.uri());
        customize(&mut config);

        let store = InMemoryBookingStore::new();
        let app = Application::build_with(
            config,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
        .await
        .expect("Failed to build application");

        let address = format!("http://127.0.0.1:{}", app.port());
        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        Self {
            address,
            client: reqwest::Client::new(),
            store,
            gateway,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn request(&self, method: Method, path: &str, caller: &CallerContext) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(USER_ID_HEADER, caller.user_id.to_string())
            .header(APARTMENT_ID_HEADER, caller.apartment_id.to_string())
    }

    /// Seed an item priced at 100/day with a 50 deposit and a 5-day cap.
    pub async fn scenario(&self) -> Scenario {
        self.scenario_with(Decimal::new(100, 0), Some(Decimal::new(50, 0)), Some(5))
            .await
    }

    pub async fn scenario_with(
        &self,
        price_per_day: Decimal,
        deposit: Option<Decimal>,
        max_days: Option<i32>,
    ) -> Scenario {
        let apartment_id = Uuid::new_v4();
        let owner = CallerContext::new(Uuid::new_v4(), apartment_id);
        let borrower = CallerContext::new(Uuid::new_v4(), apartment_id);
        let item = ItemListing {
            id: Uuid::new_v4(),
            owner_id: owner.user_id,
            apartment_id,
            name: "Cordless drill".to_string(),
            price_per_day,
            deposit_amount: deposit,
            max_consecutive_days: max_days,
            is_available: true,
            deleted_at: None,
        };
        self.store.put_item(item.clone()).await;

        Scenario {
            owner,
            borrower,
            item,
        }
    }

    pub async fn create_booking(
        &self,
        caller: &CallerContext,
        item_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Response {
        self.request(Method::POST, "/v1/bookings", caller)
            .json(&json!({
                "itemId": item_id,
                "startDate": start,
                "endDate": end,
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn transition(&self, caller: &CallerContext, booking_id: Uuid, action: &str) -> Response {
        self.request(
            Method::PATCH,
            &format!("/v1/bookings/{}/{}", booking_id, action),
            caller,
        )
        .send()
        .await
        .expect("Failed to execute request")
    }

    /// Create a two-day booking and have the owner accept it.
    pub async fn accepted_booking(&self, scenario: &Scenario, start: DateTime<Utc>) -> Value {
        let response = self
            .create_booking(
                &scenario.borrower,
                scenario.item.id,
                start,
                start + Duration::days(1),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let booking: Value = response.json().await.unwrap();

        let response = self
            .transition(&scenario.owner, booking_id(&booking), "accept")
            .await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    pub async fn booking(&self, id: Uuid) -> Booking {
        self.store
            .get_booking(id)
            .await
            .unwrap()
            .expect("booking should exist")
    }

    /// Mount a successful order creation on the mock gateway.
    pub async fn mock_order(&self, order_id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "entity": "order",
                "amount": 27000,
                "currency": "INR",
                "receipt": "receipt",
                "status": "created"
            })))
            .expect(expected_calls)
            .mount(&self.gateway)
            .await;
    }

    pub async fn create_order(&self, caller: &CallerContext, booking_id: Uuid) -> Response {
        self.request(
            Method::POST,
            &format!("/v1/payments/bookings/{}/order", booking_id),
            caller,
        )
        .send()
        .await
        .expect("Failed to execute request")
    }

    pub async fn confirm(
        &self,
        caller: &CallerContext,
        booking_id: Uuid,
        order_id: Option<&str>,
        payment_id: &str,
        signature: &str,
    ) -> Response {
        self.request(
            Method::POST,
            &format!("/v1/payments/bookings/{}/confirm", booking_id),
            caller,
        )
        .json(&json!({
            "razorpayOrderId": order_id,
            "razorpayPaymentId": payment_id,
            "razorpaySignature": signature,
        }))
        .send()
        .await
        .expect("Failed to execute request")
    }

    pub async fn webhook(&self, body: &str, signature: Option<&str>) -> Response {
        let mut request = self
            .client
            .post(self.url("/v1/payments/webhook"))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header("X-Razorpay-Signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }
}

pub fn booking_id(body: &Value) -> Uuid {
    body["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("response should carry a booking id")
}

pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("decimal serialized as string")
}

/// Ten in the morning, `days` days from today.
pub fn days_from_now(days: i64) -> DateTime<Utc> {
    let date = (Utc::now() + Duration::days(days)).date_naive();
    Utc.from_utc_datetime(&date.and_hms_opt(10, 0, 0).expect("valid time"))
}

pub fn payment_signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(KEY_SECRET, format!("{}|{}", order_id, payment_id).as_bytes())
        .expect("HMAC accepts any key length")
}

pub fn webhook_signature(body: &str) -> String {
    hmac_sha256_hex(WEBHOOK_SECRET, body.as_bytes()).expect("HMAC accepts any key length")
}

pub fn payment_event(event: &str, order_id: Option<&str>, payment_id: &str) -> String {
    json!({
        "entity": "event",
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "status": "captured",
                    "amount": 27000
                }
            }
        }
    })
    .to_string()
}
