use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use clap::Parser;
use futures::future::join_all;
use futures::future::pending;
use http_body_util::BodyExt;
use more_asserts::assert_ge;
use relay_limit::TokenBucket;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::ServiceExt;
use tower::service_fn;
use tower::util::BoxCloneSyncService;
use tower_relay::DispatchLayer;
use tower_relay::Message;
use tower_relay::ProviderReply;
use tower_relay::ProviderService;

use super::*;
use crate::messagebird::Options;
use crate::testing::TEST_ACCESS_KEY;
use crate::testing::spawn_fake_messagebird;

const FAST_THROTTLE: Duration = Duration::from_millis(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn relay(
    buffer: usize,
    request_timeout: Duration,
    throttle_rate: Duration,
    provider: Option<ProviderService>,
) -> Router {
    let pacer = Arc::new(TokenBucket::pacer(throttle_rate, NonZeroUsize::MIN));
    let dispatch = DispatchLayer::new(pacer, NonZeroUsize::new(buffer).unwrap(), request_timeout)
        .spawn(provider);
    api::router(dispatch)
}

fn messagebird(base_url: &str, access_key: &str) -> ProviderService {
    let client = MessageBirdClient::new(Options {
        access_key: access_key.to_string(),
        base_url: Some(base_url.to_string()),
        ..Options::default()
    })
    .unwrap();
    BoxCloneSyncService::new(client)
}

/// A provider that never answers.
fn hanging_provider() -> ProviderService {
    BoxCloneSyncService::new(service_fn(|_message: Message| {
        pending::<Result<ProviderReply, BoxError>>()
    }))
}

fn valid_body() -> serde_json::Value {
    json!({
        "recipient": 31612345678_i64,
        "originator": "MessageBird",
        "message": "This is a test message"
    })
}

async fn send(app: Router, method: Method, body: impl Into<Body>) -> (StatusCode, ApiResponse) {
    let request = Request::builder()
        .method(method)
        .uri("/messages")
        .header(CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: ApiResponse = serde_json::from_slice(&bytes).unwrap();
    (status, body)
}

async fn post(app: Router, body: serde_json::Value) -> (StatusCode, ApiResponse) {
    send(app, Method::POST, body.to_string()).await
}

fn assert_failure(response: (StatusCode, ApiResponse), status: StatusCode, error: &str) {
    assert_eq!(response.0, status);
    assert!(!response.1.success);
    assert_eq!(response.1.data, None);
    assert_eq!(response.1.error.as_deref(), Some(error));
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
        assert_failure(
            send(app, method, "").await,
            StatusCode::METHOD_NOT_ALLOWED,
            "Request not allowed (invalid HTTP method)",
        );
    }
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    assert_failure(
        send(app, Method::POST, r#"{"invalid_json"}"#).await,
        StatusCode::BAD_REQUEST,
        "Bad request (invalid payload json structure)",
    );
}

#[tokio::test]
async fn wrongly_typed_field_is_a_bad_request() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let body = json!({"recipient": "31612345678", "originator": "MessageBird", "message": "hi"});
    assert_failure(
        post(app, body).await,
        StatusCode::BAD_REQUEST,
        "Bad request (invalid payload json structure)",
    );
}

#[tokio::test]
async fn null_body_is_validated_as_empty() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    assert_failure(
        send(app, Method::POST, "null").await,
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid parameter (recipient value is out of bounds)",
    );
}

#[tokio::test]
async fn recipient_out_of_bounds() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let mut body = valid_body();
    body["recipient"] = json!(123456);
    assert_failure(
        post(app, body).await,
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid parameter (recipient value is out of bounds)",
    );
}

#[tokio::test]
async fn originator_not_present() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let mut body = valid_body();
    body["originator"] = json!("");
    assert_failure(
        post(app, body).await,
        StatusCode::UNPROCESSABLE_ENTITY,
        "Missing parameter (originator value is not present)",
    );
}

#[tokio::test]
async fn originator_too_long() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let mut body = valid_body();
    body["originator"] = json!("MessageBird1");
    assert_failure(
        post(app, body).await,
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid parameter (originator value is to long)",
    );
}

#[tokio::test]
async fn message_not_present() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let mut body = valid_body();
    body["message"] = json!("");
    assert_failure(
        post(app, body).await,
        StatusCode::UNPROCESSABLE_ENTITY,
        "Missing parameter (message value is not present)",
    );
}

#[tokio::test]
async fn message_too_long() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let mut body = valid_body();
    body["message"] = json!("m".repeat(161));
    assert_failure(
        post(app, body).await,
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid parameter (message value is to long)",
    );
}

#[tokio::test]
async fn missing_provider_is_an_internal_error() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    assert_failure(
        post(app, valid_body()).await,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal error (API client not set)",
    );
}

#[tokio::test(start_paused = true)]
async fn hanging_provider_times_out() {
    let timeout = Duration::from_millis(500);
    let app = relay(10, timeout, FAST_THROTTLE, Some(hanging_provider()));

    let start = tokio::time::Instant::now();
    assert_failure(
        post(app, valid_body()).await,
        StatusCode::REQUEST_TIMEOUT,
        "Request timeout (process took to long to finish)",
    );
    assert_ge!(start.elapsed(), timeout);
}

#[tokio::test(start_paused = true)]
async fn eleventh_concurrent_request_is_refused() {
    let app = relay(10, REQUEST_TIMEOUT, Duration::from_secs(1), Some(hanging_provider()));

    let handles: Vec<_> = (0..11)
        .map(|_| tokio::spawn(post(app.clone(), valid_body())))
        .collect();
    let statuses: Vec<StatusCode> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().0)
        .collect();

    let refused = statuses
        .iter()
        .filter(|status| **status == StatusCode::TOO_MANY_REQUESTS)
        .count();
    let timed_out = statuses
        .iter()
        .filter(|status| **status == StatusCode::REQUEST_TIMEOUT)
        .count();
    assert_eq!(refused, 1);
    assert_eq!(timed_out, 10);
}

#[tokio::test]
async fn wrong_access_key_is_unauthorized() {
    let base_url = spawn_fake_messagebird().await;
    let provider = messagebird(&base_url, "not_the_right_key");
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, Some(provider));

    assert_failure(
        post(app, valid_body()).await,
        StatusCode::UNAUTHORIZED,
        "Request not allowed (incorrect access_key)",
    );
}

#[tokio::test]
async fn created_sms_echoes_the_submission() {
    let base_url = spawn_fake_messagebird().await;
    let provider = messagebird(&base_url, TEST_ACCESS_KEY);
    let app = relay(10, REQUEST_TIMEOUT, Duration::from_secs(1), Some(provider));

    let (status, response) = post(app, valid_body()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(response.success);
    assert_eq!(response.error, None);

    let data = response.data.unwrap();
    assert_eq!(data.id.len(), 32);
    assert_eq!(data.recipient, 31612345678);
    assert_eq!(data.originator, "MessageBird");
    assert_eq!(data.message, "This is a test message");
    assert_eq!(data.status, "sent");
}

#[tokio::test]
async fn unreachable_provider_is_an_internal_error() {
    // Nothing listens on port 9 of the loopback interface.
    let provider = messagebird("http://127.0.0.1:9", TEST_ACCESS_KEY);
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, Some(provider));

    let (status, response) = post(app, valid_body()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = response.error.unwrap();
    assert!(
        error.starts_with("Internal error (request to MessageBird failed"),
        "{error}"
    );
}

#[tokio::test]
async fn health_is_ok() {
    let app = relay(10, REQUEST_TIMEOUT, FAST_THROTTLE, None);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn shutdown_refuses_new_messages() {
    let config = Config::try_parse_from([
        "sms-relay",
        "--access-key",
        "",
        "--throttle-rate",
        "10ms",
    ])
    .unwrap();
    let shutdown = CancellationToken::new();
    let app = app(&config, shutdown.clone()).unwrap();

    assert_failure(
        post(app.clone(), valid_body()).await,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal error (API client not set)",
    );

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_failure(
        post(app, valid_body()).await,
        StatusCode::SERVICE_UNAVAILABLE,
        "Service unavailable (dispatcher is shutting down)",
    );
}
