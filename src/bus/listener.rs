//! Listener trait for point-to-point messaging.

use super::message::{BusError, QueueMessage};

/// Trait for consuming a named queue (point-to-point).
///
/// Listeners on the same queue compete: each message is delivered to
/// exactly one of them. A delivered message stays unsettled until it is
/// acknowledged or rejected.
pub trait Listener: Send + Sync {
    /// Listen for the next message on a named queue, blocking until one
    /// is available or the timeout expires.
    fn listen(&self, queue: &str, timeout_ms: u64) -> Result<Option<QueueMessage>, BusError>;

    /// Acknowledge that a message has been handled.
    fn ack(&self, queue: &str, message_id: &str) -> Result<(), BusError>;

    /// Reject a message without requeueing it.
    fn nack(&self, queue: &str, message_id: &str, reason: &str) -> Result<(), BusError>;
}
