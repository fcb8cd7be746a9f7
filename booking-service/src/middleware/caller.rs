//! Caller identity extracted from request headers.
//!
//! The upstream auth layer authenticates the user and injects `X-User-ID` and
//! `X-Apartment-ID`. This service trusts them and never resolves identity itself.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const APARTMENT_ID_HEADER: &str = "X-Apartment-ID";

/// Authenticated caller and the apartment they are acting in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: Uuid,
    pub apartment_id: Uuid,
}

impl CallerContext {
    pub fn new(user_id: Uuid, apartment_id: Uuid) -> Self {
        Self {
            user_id,
            apartment_id,
        }
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", name)))?;

    Uuid::parse_str(value)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, USER_ID_HEADER)?;
        let apartment_id = header_uuid(parts, APARTMENT_ID_HEADER)?;

        let span = tracing::Span::current();
        span.record("user_id", tracing::field::display(user_id));
        span.record("apartment_id", tracing::field::display(apartment_id));

        Ok(CallerContext::new(user_id, apartment_id))
    }
}
