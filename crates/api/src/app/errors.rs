//! Service errors as JSON responses.
//!
//! Body shape: `{ "error": <code>, "kind": <kind>, "message": <text> }`.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::error;

use stockroom_core::{DomainError, ErrorKind};
use stockroom_infra::ServiceError;

const STORAGE_FAILURE_MESSAGE: &str = "the request could not be completed, try again later";

/// Handler error. Wraps the service taxonomy so every failure leaves the API
/// through one mapping.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(pub ServiceError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e.into())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match kind {
            ErrorKind::StorageFailure => {
                error!(error = %self.0, "storage failure");
                STORAGE_FAILURE_MESSAGE.to_string()
            }
            _ => self.0.to_string(),
        };
        json_error(status_for(kind), self.0.code(), kind, message)
    }
}

pub fn json_error(
    status: StatusCode,
    code: &str,
    kind: ErrorKind,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "kind": kind,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// `Json<T>` whose rejection is a validation error in the common body shape.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ApiError(ServiceError::Validation(e.body_text())))?;
        Ok(Self(value))
    }
}

/// `Query<T>` with the same rejection mapping as [`ApiJson`].
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| ApiError(ServiceError::Validation(e.body_text())))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use stockroom_infra::StoreError;

    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::StorageFailure), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_details_stay_out_of_the_response() {
        let resp = ApiError(ServiceError::Storage(StoreError::Backend(
            "password authentication failed for user stockroom".to_string(),
        )))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
