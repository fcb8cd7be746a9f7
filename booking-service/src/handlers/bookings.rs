//! Booking lifecycle handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{BookingResponse, CreateBookingRequest, PageQuery, ReturnBookingRequest},
    middleware::{CallerContext, OptionalJson},
    services::store::Party,
    startup::AppState,
};

pub async fn create_booking(
    State(state): State<AppState>,
    caller: CallerContext,
    WithRejection(Json(payload), _): WithRejection<Json<CreateBookingRequest>, AppError>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        item_id = %payload.item_id,
        start_date = %payload.start_date,
        end_date = %payload.end_date,
        "Creating booking"
    );

    let booking = state
        .bookings
        .create_booking(&caller, payload.item_id, payload.start_date, payload.end_date)
        .await?;

    Ok((StatusCode::CREATED, Json(booking.into())))
}

pub async fn list_borrowed(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = state
        .bookings
        .list_bookings(&caller, Party::Borrower, query.page())
        .await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

pub async fn list_lent(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = state
        .bookings
        .list_bookings(&caller, Party::Owner, query.page())
        .await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

pub async fn get_borrowed(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .bookings
        .get_booking(&caller, id, Party::Borrower)
        .await?;
    Ok(Json(booking.into()))
}

pub async fn get_lent(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.get_booking(&caller, id, Party::Owner).await?;
    Ok(Json(booking.into()))
}

pub async fn accept_booking(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.accept_booking(&caller, id).await?;
    Ok(Json(booking.into()))
}

pub async fn reject_booking(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.reject_booking(&caller, id).await?;
    Ok(Json(booking.into()))
}

pub async fn mark_active(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.mark_active(&caller, id).await?;
    Ok(Json(booking.into()))
}

/// The body is optional; an empty request records a return without notes.
pub async fn return_booking(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
    payload: OptionalJson<ReturnBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let payload = payload.into_inner_or_default();
    payload.validate()?;

    let booking = state
        .bookings
        .return_booking(
            &caller,
            id,
            payload.return_notes,
            payload.return_images.unwrap_or_default(),
        )
        .await?;
    Ok(Json(booking.into()))
}

pub async fn complete_booking(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.complete_booking(&caller, id).await?;
    Ok(Json(booking.into()))
}

/// Internal route for the dispute workflow. Not exposed through the gateway.
pub async fn mark_disputed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.mark_disputed(id).await?;
    Ok(Json(booking.into()))
}
