//! Canonical event record and the source adapter that produces it.
//!
//! An [`Event`] is an opaque JSON object. The relay never validates its
//! fields; it only guarantees that whatever arrives as a structured record
//! is forwarded to subscribers unchanged: field order and the exact text of
//! every number are kept. A few well-known optional fields
//! have read-only accessors so logs and the producer can refer to them.
//!
//! ```
//! use serde_json::json;
//! use trail_relay::event::{normalize, Ingest};
//!
//! let from_http = normalize(Ingest::Value(json!({ "athlete": "A", "event": "running" }))).unwrap();
//! let from_queue = normalize(Ingest::Bytes(br#"{"athlete":"A","event":"running"}"#.to_vec())).unwrap();
//! assert_eq!(from_http, from_queue);
//! ```

mod adapter;

pub use adapter::{normalize, Ingest};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names with a conventional meaning in producer payloads.
pub mod fields {
    pub const ATHLETE: &str = "athlete";
    pub const KIND: &str = "event";
    pub const SEQ: &str = "seq";
    pub const SESSION_ID: &str = "session_id";
    pub const QUEUE: &str = "queue";
}

/// Compact JSON text of an event, shared by every subscriber it is sent to.
pub type Payload = Arc<str>;

/// One producer observation, forwarded atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Wrap an already-decoded JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Borrow the underlying fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a raw field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn athlete(&self) -> Option<&str> {
        self.get(fields::ATHLETE).and_then(Value::as_str)
    }

    /// The `event` field, if it names a known kind.
    pub fn kind(&self) -> Option<EventKind> {
        self.get(fields::KIND)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Producer-assigned sequence number. Opaque to the relay.
    pub fn seq(&self) -> Option<u64> {
        self.get(fields::SEQ).and_then(Value::as_u64)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(fields::SESSION_ID).and_then(Value::as_str)
    }

    pub fn queue(&self) -> Option<&str> {
        self.get(fields::QUEUE).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize to the compact JSON text sent over the wire.
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(&self.fields).map(Payload::from)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        event.into_value()
    }
}

/// The `event` field of a position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Running,
    Finished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Running => "running",
            EventKind::Finished => "finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(EventKind::Running),
            "finished" => Ok(EventKind::Finished),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}
