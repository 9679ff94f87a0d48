use chrono::DateTime;
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::RelayError;

/// The payload relayed to the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub recipient: u64,
    pub originator: String,
    pub body: String,
}

/// What the provider issued for a created message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub id: String,
    pub recipient: u64,
    pub originator: String,
    pub body: String,
    /// Delivery status of `recipient`, as reported by the provider.
    pub status: String,
    pub created: DateTime<Utc>,
}

/// One entry of a provider error list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderFault {
    pub code: i64,
    pub description: String,
    pub parameter: Option<String>,
}

/// The decoded answer of a provider call.
///
/// A rejection is a normal reply, not an error: errors are reserved for
/// transport and decoding failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderReply {
    Created(Receipt),
    Rejected(Vec<ProviderFault>),
}

/// The single result produced for every dispatched request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Delivered(Receipt),
    ProviderRejected { code: Option<i64>, message: String },
    InternalFailure { message: String },
}

impl Outcome {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Outcome::InternalFailure {
            message: message.into(),
        }
    }

    /// Surfaces the first fault, which is the one callers are shown.
    pub(crate) fn rejected(faults: Vec<ProviderFault>) -> Self {
        match faults.into_iter().next() {
            Some(fault) => Outcome::ProviderRejected {
                code: Some(fault.code),
                message: fault.description,
            },
            None => Outcome::ProviderRejected {
                code: None,
                message: "provider rejected the request".to_string(),
            },
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Outcome::Delivered(_) => "delivered",
            Outcome::ProviderRejected { .. } => "provider_rejected",
            Outcome::InternalFailure { .. } => "internal_failure",
        }
    }

    pub fn into_result(self) -> Result<Receipt, RelayError> {
        match self {
            Outcome::Delivered(receipt) => Ok(receipt),
            Outcome::ProviderRejected { code, message } => {
                Err(RelayError::Rejected { code, message })
            }
            Outcome::InternalFailure { message } => Err(RelayError::Inner(message)),
        }
    }
}

/// A unit of work travelling from the ingress to exactly one worker.
///
/// The record owns the only sender of its outcome channel, so at most one
/// outcome can ever be delivered for it.
#[derive(Debug)]
pub struct Request {
    pub(crate) message: Message,
    pub(crate) deadline: Instant,
    pub(crate) reply: oneshot::Sender<Outcome>,
}

impl Request {
    /// Builds a record and the receiving half its submitter waits on.
    pub fn new(message: Message, deadline: Instant) -> (Self, oneshot::Receiver<Outcome>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                message,
                deadline,
                reply,
            },
            rx,
        )
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
