///! Service-level failure taxonomy and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use skystat_common::UnknownFilter;

use crate::store::{StorageError, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing request fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown snapshot id, or "latest" on an empty store.
    #[error("snapshot not found: {0}")]
    NotFound(String),

    /// A stored filter code outside the closed enumeration. Reported,
    /// never replaced with a guessed label.
    #[error(transparent)]
    UnknownFilter(#[from] UnknownFilter),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Storage(err) => ServiceError::Storage(err),
        }
    }
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::UnknownFilter(_) | ServiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::Validation("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("id 9".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::UnknownFilter(UnknownFilter(42)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err = ServiceError::from(StoreError::NotFound("id 7".to_string()));
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
