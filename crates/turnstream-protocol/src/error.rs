//! Error types for the turnstream protocol.

use serde::Serialize;
use thiserror::Error;

use crate::ids::TurnId;

/// A payload line that could not be turned into an event at all.
///
/// Only malformed JSON and non-object payloads end up here; a well-formed
/// object always decodes to some [`crate::Event`], possibly `Unknown`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload is not a JSON object (found {found})")]
    NotAnObject { found: &'static str },
}

/// Failure to decode one recommended item of a cart.
///
/// Scoped to the item: the rest of the cart still decodes.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartItemError {
    #[error("recommended item #{index} is not an object")]
    NotAnObject { index: usize },
    #[error("recommended item #{index} is missing the `{pick}` pick")]
    MissingPick { index: usize, pick: &'static str },
    #[error("recommended item #{index} has an invalid `{pick}` pick: {reason}")]
    InvalidPick {
        index: usize,
        pick: &'static str,
        reason: String,
    },
}

impl CartItemError {
    pub fn index(&self) -> usize {
        match self {
            Self::NotAnObject { index }
            | Self::MissingPick { index, .. }
            | Self::InvalidPick { index, .. } => *index,
        }
    }
}

/// Errors raised by the turn state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("turn {turn_id} is closed; rejected `{event_type}` event")]
    Closed {
        turn_id: TurnId,
        event_type: &'static str,
    },
}

/// Errors surfaced by a chunk source (the transport collaborator).
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("transport io error: {0}")]
    Io(String),
    #[error("transport returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport timed out")]
    TimedOut,
    #[error("transport closed unexpectedly: {0}")]
    Closed(String),
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => Self::TimedOut,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Self::Closed(error.to_string()),
            _ => Self::Io(error.to_string()),
        }
    }
}

/// Convenience result type for payload decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
