//! Error types for notification decoding.

use thiserror::Error;

/// Errors raised while turning a queue message into a replication decision.
///
/// None of these are acknowledged; the queue decides about redelivery.
#[derive(Debug, Error)]
pub enum EventError {
    /// Body missing or not a notification envelope.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// Envelope parsed but required fields are missing or inconsistent.
    #[error("invalid event: {0}")]
    Invalid(String),

    /// Event name outside the modelled set.
    #[error("unknown event action: {0}")]
    UnknownAction(String),

    /// Recognised event type with no replication behaviour.
    #[error("unsupported event action: {0}")]
    Unsupported(String),
}
