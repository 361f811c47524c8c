//! Error types for the relay hub.

use thiserror::Error;

/// Errors surfaced by a single ingestion or broadcast call.
///
/// Per-subscriber delivery failures are not represented here: they are
/// recovered inside the broadcast engine and reported in its
/// `BroadcastReport` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The inbound payload could not be decoded as a structured record.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The subscriber registry is closed (hub shutting down).
    #[error("subscriber registry unavailable")]
    RegistryUnavailable,
}

impl RelayError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::MalformedPayload(_) => 400,
            RelayError::RegistryUnavailable => 503,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MalformedPayload(err.to_string())
    }
}
