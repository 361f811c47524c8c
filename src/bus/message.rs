//! Queue message envelope and bus error type.

use std::error::Error;

use thiserror::Error;

/// A message carried by a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    /// Broker-assigned or producer-assigned identifier, used for ack/nack.
    pub id: String,
    /// Serialized body (a JSON event for the relay).
    pub payload: Vec<u8>,
    /// Optional headers.
    pub metadata: Option<Vec<(String, String)>>,
}

impl QueueMessage {
    /// Create a new message with the given payload bytes.
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload,
            metadata: None,
        }
    }

    /// Create a message with a string payload.
    pub fn with_string_payload(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(id, payload.into().into_bytes())
    }

    /// Create a message whose body is the JSON encoding of `payload`.
    pub fn encode<T: serde::Serialize>(
        id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, BusError> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| BusError::SerializationFailed(e.to_string()))?;
        Ok(Self::new(id, bytes))
    }

    /// Add a header to the message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// Look up a header by key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached, or the connection dropped.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Serialization of the message failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
    /// The broker rejected the message.
    #[error("message rejected: {0}")]
    Rejected(String),
    /// Timeout waiting for the broker.
    #[error("bus timeout")]
    Timeout,
    /// Other error.
    #[error("bus error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl BusError {
    /// Whether this error means the broker itself is unreachable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BusError::ConnectionFailed(_) | BusError::Timeout)
    }
}
