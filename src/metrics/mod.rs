//! Metrics recorder — Prometheus counters for relayed traffic.
//!
//! All metrics live in a private [`prometheus::Registry`] so several hubs
//! (e.g. in tests) never collide on global registration. Updates are
//! atomic; nothing is ever reset.

use std::string::FromUtf8Error;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use thiserror::Error;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("exposition is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

/// Process-wide relay metrics. Cheap to clone; clones share counters.
#[derive(Debug, Clone)]
pub struct RelayMetrics {
    inner: Arc<RelayMetricsInner>,
}

#[derive(Debug)]
struct RelayMetricsInner {
    registry: Registry,
    positions_processed: IntCounter,
    processing_latency: Histogram,
    messages_published: IntCounter,
    connection_errors: IntCounter,
    events_malformed: IntCounter,
    subscribers_dropped: IntCounter,
    subscribers_active: IntGauge,
    speed_factor: Gauge,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let positions_processed = IntCounter::new(
            "positions_processed_total",
            "Total number of positions processed.",
        )?;
        let processing_latency = Histogram::with_opts(HistogramOpts::new(
            "processing_latency_seconds",
            "Processing latency for events (in seconds).",
        ))?;
        let messages_published = IntCounter::new(
            "messages_published_total",
            "Total number of messages published to the queue.",
        )?;
        let connection_errors = IntCounter::new(
            "connection_errors_total",
            "Total number of message broker connection errors.",
        )?;
        let events_malformed = IntCounter::new(
            "events_malformed_total",
            "Total number of inbound payloads rejected as malformed.",
        )?;
        let subscribers_dropped = IntCounter::new(
            "subscribers_dropped_total",
            "Total number of subscribers removed after a failed delivery.",
        )?;
        let subscribers_active =
            IntGauge::new("subscribers_active", "Currently connected subscribers.")?;
        let speed_factor = Gauge::new("speed_factor", "Current simulation speed factor.")?;

        registry.register(Box::new(positions_processed.clone()))?;
        registry.register(Box::new(processing_latency.clone()))?;
        registry.register(Box::new(messages_published.clone()))?;
        registry.register(Box::new(connection_errors.clone()))?;
        registry.register(Box::new(events_malformed.clone()))?;
        registry.register(Box::new(subscribers_dropped.clone()))?;
        registry.register(Box::new(subscribers_active.clone()))?;
        registry.register(Box::new(speed_factor.clone()))?;

        Ok(Self {
            inner: Arc::new(RelayMetricsInner {
                registry,
                positions_processed,
                processing_latency,
                messages_published,
                connection_errors,
                events_malformed,
                subscribers_dropped,
                subscribers_active,
                speed_factor,
            }),
        })
    }

    pub fn increment_processed(&self) {
        self.inner.positions_processed.inc();
    }

    pub fn observe_latency(&self, elapsed: Duration) {
        self.inner.processing_latency.observe(elapsed.as_secs_f64());
    }

    pub fn increment_published(&self) {
        self.inner.messages_published.inc();
    }

    pub fn increment_connection_errors(&self) {
        self.inner.connection_errors.inc();
    }

    pub fn increment_malformed(&self) {
        self.inner.events_malformed.inc();
    }

    pub fn add_dropped_subscribers(&self, count: usize) {
        self.inner.subscribers_dropped.inc_by(count as u64);
    }

    pub fn subscriber_added(&self) {
        self.inner.subscribers_active.inc();
    }

    pub fn subscriber_removed(&self) {
        self.inner.subscribers_active.dec();
    }

    pub fn set_speed_factor(&self, factor: f64) {
        self.inner.speed_factor.set(factor);
    }

    pub fn processed(&self) -> u64 {
        self.inner.positions_processed.get()
    }

    pub fn published(&self) -> u64 {
        self.inner.messages_published.get()
    }

    pub fn connection_errors(&self) -> u64 {
        self.inner.connection_errors.get()
    }

    pub fn malformed(&self) -> u64 {
        self.inner.events_malformed.get()
    }

    pub fn dropped_subscribers(&self) -> u64 {
        self.inner.subscribers_dropped.get()
    }

    pub fn active_subscribers(&self) -> i64 {
        self.inner.subscribers_active.get()
    }

    pub fn latency_samples(&self) -> u64 {
        self.inner.processing_latency.get_sample_count()
    }

    pub fn speed_factor(&self) -> f64 {
        self.inner.speed_factor.get()
    }

    /// Render every metric in the text exposition format.
    pub fn snapshot(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
