//! JSON body that may be omitted entirely.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use service_core::error::AppError;

/// An empty body yields `None`. A present but malformed body is a validation error.
#[derive(Debug, Clone, Default)]
pub struct OptionalJson<T>(pub Option<T>);

impl<T: Default> OptionalJson<T> {
    pub fn into_inner_or_default(self) -> T {
        self.0.unwrap_or_default()
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }
        let Json(value) = Json::<T>::from_bytes(&bytes)?;
        Ok(Self(Some(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Notes {
        notes: Option<String>,
    }

    async fn extract(body: &'static str) -> Result<OptionalJson<Notes>, AppError> {
        let request = axum::http::Request::builder()
            .body(Body::from(body))
            .unwrap();
        OptionalJson::<Notes>::from_request(request, &()).await
    }

    #[tokio::test]
    async fn test_empty_body_is_none() {
        assert_eq!(extract("").await.unwrap().0, None);
        assert_eq!(extract("  \n").await.unwrap().0, None);
    }

    #[tokio::test]
    async fn test_present_body_is_parsed() {
        let parsed = extract(r#"{"notes":"ok"}"#).await.unwrap();
        assert_eq!(parsed.into_inner_or_default().notes.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        assert!(matches!(
            extract("{notes").await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            extract(r#"{"notes":7}"#).await,
            Err(AppError::ValidationError(_))
        ));
    }
}
