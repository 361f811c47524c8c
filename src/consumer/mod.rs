//! Queue consumer — feeds messages from a named queue into the hub.
//!
//! A background thread polls a [`Listener`], hands each message body to
//! [`RelayHub::ingest`], and settles it. Delivery is at-most-once: a message
//! that cannot be decoded is rejected without requeueing, and a broker
//! error loses whatever was in flight.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use trail_relay::bus::{InMemoryQueue, QueueMessage, Sender};
//! use trail_relay::consumer::QueueConsumer;
//! use trail_relay::RelayHub;
//!
//! let hub = RelayHub::builder().build().unwrap();
//! let queue = InMemoryQueue::new();
//! let consumer = QueueConsumer::spawn(hub.clone(), "grupo6", queue.clone(), Duration::from_millis(10));
//!
//! queue.send("grupo6", QueueMessage::with_string_payload("m-1", r#"{"athlete":"A"}"#)).unwrap();
//! std::thread::sleep(Duration::from_millis(200));
//!
//! let stats = consumer.stop();
//! assert_eq!(stats.handled, 1);
//! ```

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{BusError, Listener, QueueMessage};
use crate::error::RelayError;
use crate::hub::RelayHub;

/// Statistics from the consumer thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages broadcast and acknowledged.
    pub handled: usize,
    /// Messages rejected as malformed.
    pub malformed: usize,
    /// Messages the hub refused (shutting down).
    pub refused: usize,
    /// Broker errors while listening or settling.
    pub connection_errors: usize,
    /// Number of poll cycles completed.
    pub polls: usize,
}

/// Handle to a background consumer thread. Drop or call `stop()` to shut down.
pub struct QueueConsumer {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<ConsumerStats>>,
}

impl QueueConsumer {
    /// Start consuming `queue` from `listener`.
    ///
    /// The thread also exits on its own once the hub shuts down.
    pub fn spawn<L>(hub: RelayHub, queue: &str, listener: L, poll_interval: Duration) -> Self
    where
        L: Listener + 'static,
    {
        let queue = queue.to_string();
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = ConsumerStats::default();
            let timeout_ms = poll_interval.as_millis() as u64;

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }
                if hub.is_shutting_down() {
                    break;
                }

                stats.polls += 1;

                match listener.listen(&queue, timeout_ms) {
                    Ok(Some(message)) => {
                        handle_message(&hub, &listener, &queue, message, &mut stats)
                    }
                    Ok(None) => {}
                    Err(e) => {
                        record_bus_error(&hub, &queue, &e, &mut stats);
                        // Back off instead of spinning on a dead broker.
                        thread::sleep(poll_interval);
                    }
                }
            }

            debug!(queue = %queue, ?stats, "Queue consumer stopped");
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the consumer and wait for it to finish. Returns stats.
    pub fn stop(mut self) -> ConsumerStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => ConsumerStats::default(),
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

fn handle_message<L: Listener>(
    hub: &RelayHub,
    listener: &L,
    queue: &str,
    message: QueueMessage,
    stats: &mut ConsumerStats,
) {
    let id = message.id.clone();

    let settled = match hub.ingest(message) {
        Ok(report) => {
            stats.handled += 1;
            debug!(queue, message_id = %id, reached = report.reached, "Relayed queue message");
            listener.ack(queue, &id)
        }
        Err(RelayError::MalformedPayload(reason)) => {
            stats.malformed += 1;
            warn!(queue, message_id = %id, %reason, "Dropping malformed queue message");
            listener.nack(queue, &id, "malformed payload")
        }
        Err(e @ RelayError::RegistryUnavailable) => {
            stats.refused += 1;
            listener.nack(queue, &id, &e.to_string())
        }
    };

    if let Err(e) = settled {
        record_bus_error(hub, queue, &e, stats);
    }
}

fn record_bus_error(hub: &RelayHub, queue: &str, error: &BusError, stats: &mut ConsumerStats) {
    stats.connection_errors += 1;
    hub.metrics().increment_connection_errors();
    warn!(queue, error = %error, "Message broker error");
}
