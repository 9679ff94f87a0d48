//! A stand-in for the MessageBird REST API.

use axum::Form;
use axum::Json;
use axum::Router;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use chrono::Utc;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::messagebird::KEY_HEADER_NAME;
use crate::messagebird::MessageCreated;
use crate::messagebird::MessageError;
use crate::messagebird::MessageErrors;
use crate::messagebird::MessageItem;
use crate::messagebird::MessageRecipients;

/// The only key the fake server accepts.
pub(crate) const TEST_ACCESS_KEY: &str = "test_gshuPaZoeEG6ovbc8M79w0QyM";

#[derive(Debug, Deserialize)]
struct CreateForm {
    recipients: u64,
    originator: String,
    body: String,
}

async fn create_message(headers: HeaderMap, Form(form): Form<CreateForm>) -> Response {
    let expected = format!("{KEY_HEADER_NAME} {TEST_ACCESS_KEY}");
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);

    if !authorized {
        let errors = MessageErrors {
            errors: vec![MessageError {
                code: 2,
                description: "Request not allowed (incorrect access_key)".to_string(),
                parameter: Some("access_key".to_string()),
            }],
        };
        return (StatusCode::UNAUTHORIZED, Json(errors)).into_response();
    }

    let now = Utc::now();
    let created = MessageCreated {
        id: format!("{:032x}", rand::random::<u128>()),
        originator: form.originator,
        body: form.body,
        created_datetime: now,
        recipients: MessageRecipients {
            total_count: 1,
            total_sent_count: 1,
            total_delivered_count: 0,
            total_delivery_failed_count: 0,
            items: vec![MessageItem {
                recipient: form.recipients,
                status: "sent".to_string(),
                status_datetime: Some(now),
            }],
        },
    };
    (StatusCode::CREATED, Json(created)).into_response()
}

/// Serves the fake API on an ephemeral port and returns its base URL.
pub(crate) async fn spawn_fake_messagebird() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = Router::new().route("/messages", post(create_message));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{address}")
}
