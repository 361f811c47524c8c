//! Event producer — the publishing side of queue ingestion.
//!
//! Data sources (the trail simulator, one task per athlete) publish position
//! updates through an `EventProducer`. It stamps the optional fields the
//! queue path carries and keeps the producer-side counters.
//!
//! | field | value |
//! |---|---|
//! | `queue` | the queue name the event is sent to |
//! | `seq` | per-producer sequence number, starting at 1 |
//! | `session_id` | random id fixed for the producer's lifetime |

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::{BusError, QueueMessage, Sender};
use crate::event::{fields, Event};
use crate::metrics::RelayMetrics;

/// Publishes events to one named queue.
pub struct EventProducer<S: Sender> {
    sender: S,
    queue: String,
    session_id: String,
    seq: AtomicU64,
    metrics: RelayMetrics,
}

impl<S: Sender> EventProducer<S> {
    pub fn new(sender: S, queue: impl Into<String>, metrics: RelayMetrics) -> Self {
        Self::with_session_id(sender, queue, Uuid::new_v4().to_string(), metrics)
    }

    pub fn with_session_id(
        sender: S,
        queue: impl Into<String>,
        session_id: impl Into<String>,
        metrics: RelayMetrics,
    ) -> Self {
        Self {
            sender,
            queue: queue.into(),
            session_id: session_id.into(),
            seq: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stamp and send one event. Returns the sequence number it was given.
    ///
    /// Fields the caller already set are overwritten. A failed send still
    /// consumes its sequence number.
    pub fn publish(&self, mut event: Event) -> Result<u64, BusError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        event.insert(fields::QUEUE, self.queue.as_str());
        event.insert(fields::SEQ, seq);
        event.insert(fields::SESSION_ID, self.session_id.as_str());

        let message = QueueMessage::encode(format!("{}-{}", self.session_id, seq), &event)?
            .with_metadata("content-type", "application/json");

        match self.sender.send(&self.queue, message) {
            Ok(()) => {
                self.metrics.increment_published();
                debug!(queue = %self.queue, seq, "Published event");
                Ok(seq)
            }
            Err(e) => {
                if e.is_connection_error() {
                    self.metrics.increment_connection_errors();
                }
                warn!(queue = %self.queue, seq, error = %e, "Error publishing event");
                Err(e)
            }
        }
    }
}
