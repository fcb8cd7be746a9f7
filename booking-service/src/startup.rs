//! Application startup and lifecycle management.

use crate::config::{BookingConfig, StoreBackend};
use crate::handlers::{self, bookings, payments};
use crate::services::{
    BookingService, BookingStore, InMemoryBookingStore, ItemCatalog, PaymentService,
    PgBookingStore, RazorpayClient,
};
use axum::{
    middleware::from_fn,
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BookingConfig>,
    pub store: Arc<dyn BookingStore>,
    pub bookings: BookingService,
    pub payments: PaymentService,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the store selected by configuration.
    pub async fn build(config: BookingConfig) -> Result<Self, AppError> {
        match config.store {
            StoreBackend::Postgres => {
                let store = PgBookingStore::new(
                    config.database.url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await?;
                store.run_migrations().await?;

                let store = Arc::new(store);
                Self::build_with(config, store.clone(), store).await
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory booking store, data is lost on restart");
                let store = Arc::new(InMemoryBookingStore::new());
                Self::build_with(config, store.clone(), store).await
            }
        }
    }

    /// Build the application around injected collaborators.
    pub async fn build_with(
        config: BookingConfig,
        store: Arc<dyn BookingStore>,
        catalog: Arc<dyn ItemCatalog>,
    ) -> Result<Self, AppError> {
        let razorpay = RazorpayClient::new(config.razorpay.clone())?;
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!(
                "Razorpay credentials not configured - payment orders will be refused"
            );
        }

        let bookings = BookingService::new(store.clone(), catalog, config.rules.clone());
        let payments = PaymentService::new(store.clone(), razorpay);

        let address = config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Booking service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state: AppState {
                config: Arc::new(config),
                store,
                bookings,
                payments,
            },
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);
        axum::serve(self.listener, router).await
    }
}

pub fn router(state: AppState) -> Router {
    let booking_routes = Router::new()
        .route("/", post(bookings::create_booking))
        .route("/me/borrowed", get(bookings::list_borrowed))
        .route("/me/borrowed/:id", get(bookings::get_borrowed))
        .route("/me/lent", get(bookings::list_lent))
        .route("/me/lent/:id", get(bookings::get_lent))
        .route("/:id/accept", patch(bookings::accept_booking))
        .route("/:id/reject", patch(bookings::reject_booking))
        .route("/:id/mark-active", patch(bookings::mark_active))
        .route("/:id/return", patch(bookings::return_booking))
        .route("/:id/complete", patch(bookings::complete_booking));

    let payment_routes = Router::new()
        .route("/bookings/:id/order", post(payments::create_order))
        .route("/bookings/:id/intent", post(payments::create_order))
        .route("/bookings/:id/confirm", post(payments::confirm_payment))
        .route("/me/transactions", get(payments::list_my_transactions))
        .route("/webhook", post(payments::webhook));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .nest("/v1/bookings", booking_routes)
        .nest("/v1/payments", payment_routes)
        .route(
            "/internal/bookings/:id/dispute",
            post(bookings::mark_disputed),
        )
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                    apartment_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
}
