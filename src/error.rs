use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::federation::FederationError;
use crate::storage::StoreError;

pub type PodResult<T> = Result<T, PodError>;

/// Pod error type
///
/// A closed set of five kinds. Each carries an optional message; when absent
/// the kind's default message is used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PodError {
    #[error("{}", .0.as_deref().unwrap_or("Resource Not Found"))]
    NotFound(Option<String>),

    #[error("{}", .0.as_deref().unwrap_or("Bad Request"))]
    BadRequest(Option<String>),

    #[error("{}", .0.as_deref().unwrap_or("Not Authorized"))]
    Unauthorized(Option<String>),

    #[error("{}", .0.as_deref().unwrap_or("Not Implemented"))]
    NotImplemented(Option<String>),

    #[error("{}", .0.as_deref().unwrap_or("Internal Server Error"))]
    Internal(Option<String>),
}

impl PodError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PodError::NotFound(_) => StatusCode::NOT_FOUND,
            PodError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PodError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PodError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            PodError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client
    ///
    /// Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PodError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(error = %self, "Authorization failed");
        } else {
            tracing::debug!(
                error = %self,
                status = %status.as_u16(),
                "Client error occurred"
            );
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PodError::NotFound(Some(msg.into()))
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        PodError::BadRequest(Some(msg.into()))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        PodError::Unauthorized(Some(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        PodError::Internal(Some(msg.into()))
    }
}

impl IntoResponse for PodError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let body = json!({ "error": self.user_message() });
        (self.status_code(), axum::Json(body)).into_response()
    }
}

// ============================================================================
// Conversion from lower layers
// ============================================================================

impl From<StoreError> for PodError {
    fn from(err: StoreError) -> Self {
        PodError::Internal(Some(format!("Storage error: {err}")))
    }
}

impl From<FederationError> for PodError {
    fn from(err: FederationError) -> Self {
        if err.is_not_found() {
            PodError::NotFound(Some(err.to_string()))
        } else {
            PodError::Internal(Some(err.to_string()))
        }
    }
}

impl From<muttr_crypto::ArmorError> for PodError {
    fn from(err: muttr_crypto::ArmorError) -> Self {
        PodError::BadRequest(Some(err.to_string()))
    }
}

impl From<muttr_types::AddressError> for PodError {
    fn from(err: muttr_types::AddressError) -> Self {
        PodError::BadRequest(Some(err.to_string()))
    }
}

impl From<muttr_types::ContentKeyError> for PodError {
    fn from(err: muttr_types::ContentKeyError) -> Self {
        PodError::BadRequest(Some(err.to_string()))
    }
}

impl From<muttr_types::TokenMethodError> for PodError {
    fn from(err: muttr_types::TokenMethodError) -> Self {
        PodError::BadRequest(Some(err.to_string()))
    }
}

impl From<tokio::task::JoinError> for PodError {
    fn from(err: tokio::task::JoinError) -> Self {
        PodError::Internal(Some(format!("Background task failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_messages() {
        assert_eq!(PodError::NotFound(None).to_string(), "Resource Not Found");
        assert_eq!(PodError::BadRequest(None).to_string(), "Bad Request");
        assert_eq!(PodError::Unauthorized(None).to_string(), "Not Authorized");
        assert_eq!(PodError::NotImplemented(None).to_string(), "Not Implemented");
        assert_eq!(PodError::Internal(None).to_string(), "Internal Server Error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PodError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(PodError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(PodError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            PodError::NotImplemented(None).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            PodError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = PodError::internal("connection refused to 10.0.0.3");
        assert_eq!(err.user_message(), "Internal Server Error");
        assert_eq!(PodError::bad_request("bad key").user_message(), "bad key");
    }

    #[test]
    fn test_federation_not_found_maps_to_not_found() {
        let err = FederationError::Status {
            url: "https://pod.net/aliases/bob".into(),
            status: 404,
        };
        assert!(matches!(PodError::from(err), PodError::NotFound(_)));

        let err = FederationError::Status {
            url: "https://pod.net/aliases/bob".into(),
            status: 502,
        };
        assert!(matches!(PodError::from(err), PodError::Internal(_)));
    }
}
