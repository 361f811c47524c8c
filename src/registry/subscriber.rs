//! Subscriber handle and its outbound mailbox.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Payload;

/// Registry-assigned subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendFailure {
    /// The connection behind this subscriber is gone.
    #[error("subscriber connection closed")]
    Closed,
    /// The subscriber's mailbox is full; it cannot keep up.
    #[error("subscriber mailbox full")]
    Backpressure,
}

/// The broadcast-side half of a subscriber: a bounded mailbox sender plus
/// a shared closed flag.
#[derive(Debug, Clone)]
pub struct Subscriber {
    tx: mpsc::Sender<Payload>,
    closed: Arc<AtomicBool>,
}

/// The connection-side half: drains payloads in the order they were
/// delivered.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Payload>,
    closed: Arc<AtomicBool>,
}

impl Subscriber {
    /// Create a subscriber and the mailbox its connection task will drain.
    pub fn channel(capacity: usize) -> (Subscriber, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        (
            Subscriber {
                tx,
                closed: Arc::clone(&closed),
            },
            Mailbox { rx, closed },
        )
    }

    /// Enqueue a payload without waiting.
    pub fn try_deliver(&self, payload: Payload) -> Result<(), SendFailure> {
        if self.is_closed() {
            return Err(SendFailure::Closed);
        }
        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendFailure::Backpressure),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                Err(SendFailure::Closed)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Mailbox {
    /// Wait for the next payload. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Take a payload that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }

    /// Refuse further deliveries. Payloads already queued can still be drained.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.rx.close();
    }
}
