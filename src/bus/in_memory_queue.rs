//! In-memory queue for testing and single-process scenarios.
//!
//! Provides named point-to-point queues implementing both [`Sender`] and
//! [`Listener`], so a producer and the relay's queue consumer can run in
//! one process without a broker:
//! - Unit and integration testing without external dependencies
//! - Single-process demos
//! - Development and prototyping

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{lock, BusError, Listener, QueueMessage, Sender};

/// In-memory named queues.
///
/// Features:
/// - Thread-safe (clones share the same queues)
/// - Each message is delivered to exactly one listener
/// - Acks and nacks are recorded for inspection
///
/// ## Example
///
/// ```
/// use trail_relay::bus::{InMemoryQueue, Listener, QueueMessage, Sender};
///
/// let queue = InMemoryQueue::new();
/// queue.send("grupo6", QueueMessage::with_string_payload("m-1", r#"{"athlete":"A"}"#)).unwrap();
///
/// let message = queue.listen("grupo6", 100).unwrap().unwrap();
/// assert_eq!(message.id, "m-1");
/// queue.ack("grupo6", &message.id).unwrap();
/// assert_eq!(queue.acknowledged(), vec!["m-1".to_string()]);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<QueueMessage>>>>,
    acked: Arc<Mutex<Vec<String>>>,
    rejected: Arc<Mutex<Vec<(String, String)>>>,
}

impl InMemoryQueue {
    /// Create a new, empty set of queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting on a queue.
    pub fn depth(&self, queue: &str) -> usize {
        lock(&self.queues).get(queue).map_or(0, VecDeque::len)
    }

    /// Get acknowledged message IDs, in ack order.
    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.acked).clone()
    }

    /// Get rejected `(message id, reason)` pairs, in nack order.
    pub fn rejected(&self) -> Vec<(String, String)> {
        lock(&self.rejected).clone()
    }

    /// Drop every waiting message on a queue, returning how many were dropped.
    pub fn purge(&self, queue: &str) -> usize {
        lock(&self.queues)
            .get_mut(queue)
            .map_or(0, |q| q.drain(..).count())
    }
}

impl Sender for InMemoryQueue {
    fn send(&self, queue: &str, message: QueueMessage) -> Result<(), BusError> {
        lock(&self.queues)
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        Ok(())
    }
}

impl Listener for InMemoryQueue {
    fn listen(&self, queue: &str, timeout_ms: u64) -> Result<Option<QueueMessage>, BusError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Some(message) = lock(&self.queues)
                .get_mut(queue)
                .and_then(VecDeque::pop_front)
            {
                return Ok(Some(message));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, _queue: &str, message_id: &str) -> Result<(), BusError> {
        lock(&self.acked).push(message_id.to_string());
        Ok(())
    }

    fn nack(&self, _queue: &str, message_id: &str, reason: &str) -> Result<(), BusError> {
        // No redelivery: a rejected message is gone.
        lock(&self.rejected).push((message_id.to_string(), reason.to_string()));
        Ok(())
    }
}
