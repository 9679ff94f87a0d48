use std::ops::RangeInclusive;

use serde::Deserialize;
use tower_relay::Message;

/// Allowed number of decimal digits in a recipient.
pub const RECIPIENT_DIGITS: RangeInclusive<usize> = 7..=15;

/// Longest alphanumeric originator MessageBird accepts.
pub const ORIGINATOR_MAX_CHARS: usize = 11;

/// Longest single-part SMS body.
pub const MESSAGE_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid parameter (recipient value is out of bounds)")]
    RecipientOutOfBounds,

    #[error("Missing parameter (originator value is not present)")]
    MissingOriginator,

    #[error("Invalid parameter (originator value is to long)")]
    OriginatorTooLong,

    #[error("Missing parameter (message value is not present)")]
    MissingMessage,

    #[error("Invalid parameter (message value is to long)")]
    MessageTooLong,
}

/// The JSON body of `POST /messages`.
///
/// Absent fields decode to their zero value and are then reported by
/// [`Submission::validate`] rather than as a malformed body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Submission {
    pub recipient: i64,
    pub originator: String,
    pub message: String,
}

impl Submission {
    /// Checks every field in a fixed order and returns the first violation.
    pub fn validate(self) -> Result<Message, ValidationError> {
        let recipient = u64::try_from(self.recipient)
            .ok()
            .filter(|recipient| RECIPIENT_DIGITS.contains(&digits(*recipient)))
            .ok_or(ValidationError::RecipientOutOfBounds)?;

        if self.originator.is_empty() {
            return Err(ValidationError::MissingOriginator);
        }
        if self.originator.chars().count() > ORIGINATOR_MAX_CHARS {
            return Err(ValidationError::OriginatorTooLong);
        }
        if self.message.is_empty() {
            return Err(ValidationError::MissingMessage);
        }
        if self.message.chars().count() > MESSAGE_MAX_CHARS {
            return Err(ValidationError::MessageTooLong);
        }

        Ok(Message {
            recipient,
            originator: self.originator,
            body: self.message,
        })
    }
}

fn digits(value: u64) -> usize {
    value.checked_ilog10().map_or(1, |log| log as usize + 1)
}
