use axum::{
    Json,
    extract::rejection::{BytesRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(anyhow::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] validator::ValidationErrors),

    #[error("Invalid state: {0}")]
    InvalidState(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::InvalidRequest(_) => "VALIDATION_ERROR",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::Conflict(_) => "BOOKING_CONFLICT",
            AppError::NotFound(_) => "RESOURCE_NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ConfigError(_) => "CONFIGURATION_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidState(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(anyhow::anyhow!(rejection.body_text()))
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        AppError::ValidationError(anyhow::anyhow!(rejection.body_text()))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let (error, message) = match &self {
            AppError::ValidationError(err) => ("Validation Error", err.to_string()),
            AppError::InvalidRequest(err) => ("Validation Error", err.to_string()),
            AppError::InvalidState(err) => ("Invalid State", err.to_string()),
            AppError::Conflict(err) => ("Booking Conflict", err.to_string()),
            AppError::NotFound(err) => ("Not Found", err.to_string()),
            AppError::Unauthorized(err) => ("Unauthorized", err.to_string()),
            AppError::InternalError(err)
            | AppError::DatabaseError(err)
            | AppError::ConfigError(err) => {
                tracing::error!(code = code, error = %err, "Request failed with internal error");
                ("Internal Server Error", "An unexpected error occurred".to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                timestamp: chrono::Utc::now().to_rfc3339(),
                status: status.as_u16(),
                error: error.to_string(),
                code,
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_category() {
        let errors = [
            AppError::ValidationError(anyhow::anyhow!("bad")),
            AppError::InvalidState(anyhow::anyhow!("state")),
            AppError::Conflict(anyhow::anyhow!("overlap")),
            AppError::NotFound(anyhow::anyhow!("missing")),
            AppError::Unauthorized(anyhow::anyhow!("who")),
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::ValidationError(anyhow::anyhow!("x")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidState(anyhow::anyhow!("x")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::NotFound(anyhow::anyhow!("x")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized(anyhow::anyhow!("x")).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::DatabaseError(anyhow::anyhow!("x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_json_rejection_uses_error_body() {
        let rejection = Json::<serde_json::Value>::from_bytes(b"{not json").unwrap_err();
        let response = AppError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["status"], 400);
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_internal_details_are_not_exposed() {
        let response =
            AppError::DatabaseError(anyhow::anyhow!("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "DATABASE_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("hunter2"));
    }
}
