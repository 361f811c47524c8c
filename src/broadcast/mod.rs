//! Broadcast engine — fan one event out to every registered subscriber.
//!
//! A broadcast is two explicit phases:
//!
//! 1. **Attempt all.** Take a registry snapshot and try a non-blocking
//!    delivery into each subscriber's mailbox. A failure is recorded against
//!    that subscriber only; the pass continues.
//! 2. **Prune failed.** Remove every subscriber that failed from the
//!    registry.
//!
//! Mailbox enqueues for one event happen under a short fan-out gate so that
//! each subscriber sees events in the order they entered the engine. Socket
//! writes happen later, concurrently, in each connection's own task.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::RelayError;
use crate::event::Event;
use crate::metrics::RelayMetrics;
use crate::registry::{SendFailure, SubscriberId, SubscriberRegistry};

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the event was handed to.
    pub reached: usize,
    /// Subscribers that failed and were removed from the registry.
    pub dropped: Vec<(SubscriberId, SendFailure)>,
}

impl BroadcastReport {
    pub fn dropped_ids(&self) -> Vec<SubscriberId> {
        self.dropped.iter().map(|(id, _)| *id).collect()
    }
}

/// Delivers events to a [`SubscriberRegistry`].
#[derive(Debug)]
pub struct BroadcastEngine {
    registry: Arc<SubscriberRegistry>,
    metrics: RelayMetrics,
    gate: Mutex<()>,
}

impl BroadcastEngine {
    pub fn new(registry: Arc<SubscriberRegistry>, metrics: RelayMetrics) -> Self {
        Self {
            registry,
            metrics,
            gate: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Deliver `event` to every subscriber in a snapshot taken now.
    ///
    /// Never fails because of unreachable subscribers; only an unavailable
    /// registry or an unserializable event aborts the call.
    pub fn broadcast(&self, event: &Event) -> Result<BroadcastReport, RelayError> {
        let payload = event.to_payload()?;
        let mut report = BroadcastReport::default();

        {
            // The guarded section never awaits, so a poisoned gate only means
            // another pass panicked mid-fanout; the unit value is still fine.
            let _order = self.gate.lock().unwrap_or_else(|p| p.into_inner());
            let snapshot = self.registry.snapshot()?;

            for (id, subscriber) in snapshot.iter() {
                match subscriber.try_deliver(Arc::clone(&payload)) {
                    Ok(()) => report.reached += 1,
                    Err(failure) => {
                        warn!(subscriber_id = %id, error = %failure, "Error sending to subscriber");
                        report.dropped.push((*id, failure));
                    }
                }
            }
        }

        for (id, _) in &report.dropped {
            self.registry.remove(*id);
        }

        if !report.dropped.is_empty() {
            self.metrics.add_dropped_subscribers(report.dropped.len());
        }

        debug!(
            reached = report.reached,
            dropped = report.dropped.len(),
            "Broadcast pass complete"
        );
        Ok(report)
    }
}
