//! Queue bus — broker-neutral messaging abstractions for queue ingestion.
//!
//! The relay consumes position updates from a named queue, typically on a
//! RabbitMQ broker. The broker client itself is pluggable: anything
//! implementing [`Listener`] can feed the hub through
//! [`QueueConsumer`](crate::consumer::QueueConsumer), and anything
//! implementing [`Sender`] can back an
//! [`EventProducer`](crate::producer::EventProducer).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  send(queue, msg)  ┌──────────────────┐  listen(queue)  ┌───────────────┐
//! │  EventProducer   │ ─────────────────► │  broker / queue  │ ──────────────► │ QueueConsumer │
//! │  (Sender)        │                    │ (AmqpQueue or    │ ◄────────────── │ (Listener)    │
//! │                  │                    │  InMemoryQueue)  │    ack / nack   │               │
//! └──────────────────┘                    └──────────────────┘                 └───────────────┘
//! ```

#[cfg(feature = "amqp")]
mod amqp;
mod in_memory_queue;
mod listener;
mod message;
mod sender;

#[cfg(feature = "amqp")]
pub use amqp::AmqpQueue;
pub use in_memory_queue::InMemoryQueue;
pub use listener::Listener;
pub use message::{BusError, QueueMessage};
pub use sender::Sender;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
