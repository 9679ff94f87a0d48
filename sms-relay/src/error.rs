use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use tower::BoxError;
use tower_relay::RelayError;
use tracing::error;
use tracing::warn;

use crate::api::ApiResponse;
use crate::validation::ValidationError;

/// MessageBird's error code for an unknown or missing access key.
const INVALID_ACCESS_KEY: i64 = 2;

/// Everything `POST /messages` can answer besides a created message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request not allowed (invalid HTTP method)")]
    MethodNotAllowed,

    #[error("Bad request (invalid payload json structure)")]
    MalformedJson,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Too many requests (request limit exceeded)")]
    LimitExceeded,

    #[error("Request timeout (process took to long to finish)")]
    Timeout,

    #[error("{message}")]
    Rejected { code: Option<i64>, message: String },

    #[error("Internal error ({0})")]
    Internal(String),

    #[error("Service unavailable (dispatcher is shutting down)")]
    Unavailable,
}

impl ApiError {
    /// Recovers the relay error carried by a dispatch failure.
    pub fn from_dispatch(error: BoxError) -> Self {
        match error.downcast::<RelayError>() {
            Ok(relay) => (*relay).into(),
            Err(other) => ApiError::Internal(other.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MalformedJson => StatusCode::BAD_REQUEST,
            ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::LimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Rejected {
                code: Some(INVALID_ACCESS_KEY),
                ..
            } => StatusCode::UNAUTHORIZED,
            ApiError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Overloaded => ApiError::LimitExceeded,
            RelayError::Timeout => ApiError::Timeout,
            RelayError::Rejected { code, message } => ApiError::Rejected { code, message },
            RelayError::Inner(message) => ApiError::Internal(message),
            RelayError::Closed => ApiError::Unavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(message) => error!(%message, "request failed"),
            ApiError::Rejected { code, message } => {
                warn!(?code, %message, "provider rejected message")
            }
            _ => {}
        }

        crate::api::json_response(status, &ApiResponse::failure(self.to_string()))
    }
}
