//! Relay hub — the single entry point shared by every transport.
//!
//! `RelayHub` owns the registry, the broadcast engine, the metrics and the
//! shutdown token. HTTP handlers, the queue consumer and embedding code all
//! go through [`RelayHub::ingest`] and [`RelayHub::connections`].
//!
//! ```
//! use serde_json::json;
//! use trail_relay::event::Ingest;
//! use trail_relay::RelayHub;
//!
//! let hub = RelayHub::builder().build().unwrap();
//! let report = hub.ingest(Ingest::Value(json!({ "athlete": "A" }))).unwrap();
//! assert_eq!(report.reached, 0);
//! assert_eq!(hub.metrics().processed(), 1);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcast::{BroadcastEngine, BroadcastReport};
use crate::connection::{ConnectionManager, ConnectionSettings};
use crate::error::RelayError;
use crate::event::{normalize, Ingest};
use crate::metrics::{MetricsError, RelayMetrics};
use crate::registry::SubscriberRegistry;

/// Builder for [`RelayHub`].
#[derive(Debug, Default)]
pub struct RelayHubBuilder {
    settings: ConnectionSettings,
    metrics: Option<RelayMetrics>,
    shutdown: Option<CancellationToken>,
}

impl RelayHubBuilder {
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.settings.mailbox_capacity = capacity;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.settings.send_timeout = timeout;
        self
    }

    /// Share an existing metrics instance (e.g. with an `EventProducer`).
    pub fn metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Tie the hub to an external shutdown token.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build(self) -> Result<RelayHub, MetricsError> {
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => RelayMetrics::new()?,
        };
        let shutdown = self.shutdown.unwrap_or_default();
        let registry = Arc::new(SubscriberRegistry::with_metrics(metrics.clone()));
        let engine = BroadcastEngine::new(Arc::clone(&registry), metrics.clone());
        let connections = ConnectionManager::new(
            Arc::clone(&registry),
            self.settings,
            shutdown.clone(),
        );

        Ok(RelayHub {
            inner: Arc::new(HubInner {
                registry,
                engine,
                connections,
                metrics,
                shutdown,
            }),
        })
    }
}

/// The event relay hub. Cheap to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct RelayHub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    registry: Arc<SubscriberRegistry>,
    engine: BroadcastEngine,
    connections: ConnectionManager,
    metrics: RelayMetrics,
    shutdown: CancellationToken,
}

impl RelayHub {
    pub fn builder() -> RelayHubBuilder {
        RelayHubBuilder::default()
    }

    /// Accept one inbound event and broadcast it.
    ///
    /// Succeeds regardless of how many subscribers were reached. Latency is
    /// measured from acceptance to the end of the prune phase.
    pub fn ingest(&self, ingest: impl Into<Ingest>) -> Result<BroadcastReport, RelayError> {
        let accepted_at = Instant::now();

        if self.is_shutting_down() {
            return Err(RelayError::RegistryUnavailable);
        }

        let event = match normalize(ingest.into()) {
            Ok(event) => event,
            Err(e) => {
                self.inner.metrics.increment_malformed();
                return Err(e);
            }
        };

        debug!(
            athlete = event.athlete().unwrap_or("-"),
            seq = ?event.seq(),
            "Broadcasting event"
        );
        let report = self.inner.engine.broadcast(&event)?;

        self.inner.metrics.increment_processed();
        self.inner.metrics.observe_latency(accepted_at.elapsed());
        Ok(report)
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.inner.connections
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.inner.metrics
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// A token cancelled when the hub shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting connections and events.
    ///
    /// Broadcast passes already running complete; connection tasks flush
    /// their queued events and close.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!(subscribers = self.subscriber_count(), "Relay hub shutting down");
        }
        self.inner.shutdown.cancel();
        self.inner.registry.close();
    }
}
