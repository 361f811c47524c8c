//! Event source adapter: every ingestion path goes through [`normalize`].

use serde_json::Value;

use super::Event;
use crate::bus::QueueMessage;
use crate::error::RelayError;

/// A raw inbound payload, before normalization.
#[derive(Debug, Clone)]
pub enum Ingest {
    /// A structured value handed over by a direct caller.
    Value(Value),
    /// Serialized bytes, e.g. an HTTP body or a queue message body.
    Bytes(Vec<u8>),
}

impl From<Value> for Ingest {
    fn from(value: Value) -> Self {
        Ingest::Value(value)
    }
}

impl From<Vec<u8>> for Ingest {
    fn from(bytes: Vec<u8>) -> Self {
        Ingest::Bytes(bytes)
    }
}

impl From<&[u8]> for Ingest {
    fn from(bytes: &[u8]) -> Self {
        Ingest::Bytes(bytes.to_vec())
    }
}

impl From<QueueMessage> for Ingest {
    fn from(message: QueueMessage) -> Self {
        Ingest::Bytes(message.payload)
    }
}

impl From<Event> for Ingest {
    fn from(event: Event) -> Self {
        Ingest::Value(event.into_value())
    }
}

/// Decode a raw payload into the canonical [`Event`].
///
/// Anything that is not a JSON object is a `MalformedPayload`.
pub fn normalize(ingest: Ingest) -> Result<Event, RelayError> {
    let value = match ingest {
        Ingest::Value(value) => value,
        Ingest::Bytes(bytes) => serde_json::from_slice::<Value>(&bytes)?,
    };

    match value {
        Value::Object(fields) => Ok(Event::from_map(fields)),
        other => Err(RelayError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
