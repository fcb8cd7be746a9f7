mod common;

use common::TestApp;
use reqwest::Method;
use serde_json::Value;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "booking-service-test");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn readiness_reports_store_health() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/ready"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn metrics_endpoint_exposes_booking_counters() {
    let app = TestApp::spawn().await;
    let scenario = app.scenario().await;
    let start = common::days_from_now(3);
    app.create_booking(&scenario.borrower, scenario.item.id, start, start)
        .await;

    let body = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to execute request")
        .text()
        .await
        .unwrap();

    assert!(body.contains("booking_transitions_total"));
}

#[tokio::test]
async fn requests_without_caller_headers_are_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/v1/bookings/me/borrowed"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let scenario = app.scenario().await;
    let response = app
        .request(Method::GET, "/v1/bookings/me/borrowed", &scenario.borrower)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
}
