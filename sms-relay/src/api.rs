//! HTTP surface: `POST /messages` and `GET /health`.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tower::ServiceExt;
use tower_relay::DispatchService;
use tower_relay::Receipt;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::error::ApiError;
use crate::validation::Submission;

/// Envelope of every `/messages` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub id: String,
    pub recipient: u64,
    pub originator: String,
    pub message: String,
    pub status: String,
    pub created: DateTime<Utc>,
}

impl ApiResponse {
    pub fn created(receipt: Receipt) -> Self {
        Self {
            success: true,
            data: Some(MessageData {
                id: receipt.id,
                recipient: receipt.recipient,
                originator: receipt.originator,
                message: receipt.body,
                status: receipt.status,
                created: receipt.created,
            }),
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Encodes `body` as JSON; an encoding failure becomes a bare 500.
pub(crate) fn json_response(status: StatusCode, body: &ApiResponse) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(err) => {
            error!(error = %err, ?body, "failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Clone, Debug)]
struct AppState {
    dispatch: DispatchService,
}

pub fn router(dispatch: DispatchService) -> Router {
    Router::new()
        .route(
            "/messages",
            post(create_message).fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .with_state(AppState { dispatch })
}

async fn create_message(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    // A `null` body carries no fields and is validated like an empty object.
    let submission: Option<Submission> = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "malformed submission");
        ApiError::MalformedJson
    })?;
    let message = submission.unwrap_or_default().validate()?;

    let receipt = state
        .dispatch
        .oneshot(message)
        .await
        .map_err(ApiError::from_dispatch)?;

    info!(id = %receipt.id, recipient = receipt.recipient, "message created");
    Ok(json_response(
        StatusCode::CREATED,
        &ApiResponse::created(receipt),
    ))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn health() -> StatusCode {
    StatusCode::OK
}
