//! Prometheus metrics for booking-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Booking state transitions by name and outcome.
pub static BOOKING_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_transitions_total",
        "Total number of booking state transitions attempted",
        &["transition", "outcome"]
    )
    .expect("Failed to register booking_transitions_total")
});

/// Payment capture and failure events by source (confirm, webhook) and outcome.
pub static PAYMENT_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_payment_events_total",
        "Total number of payment events processed",
        &["source", "outcome"]
    )
    .expect("Failed to register booking_payment_events_total")
});

/// Outbound gateway calls.
pub static GATEWAY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "booking_gateway_requests_total",
        "Total number of payment gateway requests",
        &["operation", "outcome"]
    )
    .expect("Failed to register booking_gateway_requests_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "booking_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register booking_db_query_duration_seconds")
});

/// Install the `metrics` recorder for HTTP middleware and force the lazy registrations.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
        }
    }

    Lazy::force(&BOOKING_TRANSITIONS_TOTAL);
    Lazy::force(&PAYMENT_EVENTS_TOTAL);
    Lazy::force(&GATEWAY_REQUESTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

pub fn record_transition(transition: &str, ok: bool) {
    BOOKING_TRANSITIONS_TOTAL
        .with_label_values(&[transition, outcome(ok)])
        .inc();
}

pub fn record_payment_event(source: &str, outcome: &str) {
    PAYMENT_EVENTS_TOTAL
        .with_label_values(&[source, outcome])
        .inc();
}

pub fn record_gateway_request(operation: &str, ok: bool) {
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome(ok)])
        .inc();
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Ok(custom_metrics) = encoder.encode_to_string(&metric_families) {
        output.push_str(&custom_metrics);
    }

    output
}
