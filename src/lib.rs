//! Event relay hub for live trail-race updates.
//!
//! Events arrive over HTTP (`POST /events`) or from a named queue, and are
//! fanned out to every connected WebSocket subscriber. See [`RelayHub`].

pub mod broadcast;
pub mod bus;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod event;
#[cfg(feature = "http")]
pub mod http;
mod hub;
pub mod metrics;
pub mod producer;
pub mod registry;
pub mod telemetry;

pub use broadcast::{BroadcastEngine, BroadcastReport};
pub use config::{ConfigError, RelayConfig};
pub use connection::{ConnectionManager, ConnectionOutcome, ConnectionSettings, PeerFrame};
pub use consumer::{ConsumerStats, QueueConsumer};
pub use error::RelayError;
pub use event::{Event, EventKind, Ingest};
pub use hub::{RelayHub, RelayHubBuilder};
pub use metrics::RelayMetrics;
pub use producer::EventProducer;
pub use registry::{SubscriberId, SubscriberRegistry};
