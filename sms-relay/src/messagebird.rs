//! MessageBird provider adapter.
//!
//! Sends one message per call to the MessageBird REST API and decodes the
//! answer into a [`ProviderReply`]. A 2xx status carries the created-message
//! shape; any other status carries the error-list shape.

use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::Serialize;
use tower::BoxError;
use tower::Service;
use tower_relay::Message;
use tower_relay::ProviderFault;
use tower_relay::ProviderReply;
use tower_relay::Receipt;
use tracing::debug;

/// Where requests go when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://rest.messagebird.com";

/// Scheme of the `Authorization` header expected by MessageBird.
pub const KEY_HEADER_NAME: &str = "AccessKey";

#[derive(Debug, thiserror::Error)]
pub enum MessageBirdError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to MessageBird failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("undecodable MessageBird response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("MessageBird response lists no recipients")]
    NoRecipients,
}

/// Client settings.
#[derive(Clone, Debug)]
pub struct Options {
    pub access_key: String,
    /// Defaults to [`DEFAULT_BASE_URL`].
    pub base_url: Option<String>,
    /// Transport timeout of a single call.
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            base_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Body of a `201 Created` answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreated {
    pub id: String,
    pub originator: String,
    pub body: String,
    pub created_datetime: DateTime<Utc>,
    pub recipients: MessageRecipients,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecipients {
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub total_sent_count: u32,
    #[serde(default)]
    pub total_delivered_count: u32,
    #[serde(default)]
    pub total_delivery_failed_count: u32,
    pub items: Vec<MessageItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageItem {
    pub recipient: u64,
    pub status: String,
    #[serde(default)]
    pub status_datetime: Option<DateTime<Utc>>,
}

/// Body of an error answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageErrors {
    pub errors: Vec<MessageError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageError {
    pub code: i64,
    pub description: String,
    #[serde(default)]
    pub parameter: Option<String>,
}

impl MessageCreated {
    fn into_receipt(self) -> Result<Receipt, MessageBirdError> {
        let item = self
            .recipients
            .items
            .into_iter()
            .next()
            .ok_or(MessageBirdError::NoRecipients)?;

        Ok(Receipt {
            id: self.id,
            recipient: item.recipient,
            originator: self.originator,
            body: self.body,
            status: item.status,
            created: self.created_datetime,
        })
    }
}

impl From<MessageError> for ProviderFault {
    fn from(error: MessageError) -> Self {
        ProviderFault {
            code: error.code,
            description: error.description,
            parameter: error.parameter,
        }
    }
}

/// Decides between the two response shapes by status code.
pub(crate) fn decode_reply(status: StatusCode, body: &[u8]) -> Result<ProviderReply, MessageBirdError> {
    let decode_error = |source| MessageBirdError::Decode {
        status: status.as_u16(),
        source,
    };

    if status.is_success() {
        let created: MessageCreated = serde_json::from_slice(body).map_err(decode_error)?;
        Ok(ProviderReply::Created(created.into_receipt()?))
    } else {
        let errors: MessageErrors = serde_json::from_slice(body).map_err(decode_error)?;
        Ok(ProviderReply::Rejected(
            errors.errors.into_iter().map(ProviderFault::from).collect(),
        ))
    }
}

/// Sends SMS messages through MessageBird.
#[derive(Clone, Debug)]
pub struct MessageBirdClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
}

impl MessageBirdClient {
    pub fn new(options: Options) -> Result<Self, MessageBirdError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(MessageBirdError::Client)?;

        Ok(Self {
            http,
            base_url: options
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            access_key: options.access_key,
        })
    }

    /// Joins `path` onto the base URL with exactly one `/` in between.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn create_message(&self, message: &Message) -> Result<ProviderReply, MessageBirdError> {
        let form = [
            ("recipients", message.recipient.to_string()),
            ("originator", message.originator.clone()),
            ("body", message.body.clone()),
        ];

        let response = self
            .http
            .post(self.url("messages"))
            .header(AUTHORIZATION, format!("{KEY_HEADER_NAME} {}", self.access_key))
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            recipient = message.recipient,
            "MessageBird response received"
        );

        decode_reply(status, &body)
    }
}

impl Service<Message> for MessageBirdClient {
    type Response = ProviderReply;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<ProviderReply, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Message) -> Self::Future {
        let client = self.clone();
        Box::pin(async move {
            client
                .create_message(&message)
                .await
                .map_err(BoxError::from)
        })
    }
}
