//! Subscriber registry — the concurrency-safe set of live subscribers.
//!
//! Replaces a shared, unguarded connection list. Every operation takes
//! `&self`; callers never coordinate access themselves.
//!
//! ```
//! use trail_relay::registry::{Subscriber, SubscriberRegistry};
//!
//! let registry = SubscriberRegistry::new();
//! let (subscriber, _mailbox) = Subscriber::channel(16);
//! let id = registry.add(subscriber);
//!
//! assert_eq!(registry.snapshot().unwrap().len(), 1);
//! assert!(registry.remove(id));
//! assert!(!registry.remove(id)); // idempotent
//! ```

mod subscriber;

pub use subscriber::{Mailbox, SendFailure, Subscriber, SubscriberId};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::RelayError;
use crate::metrics::RelayMetrics;

/// Live subscribers keyed by id.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: DashMap<SubscriberId, Subscriber>,
    next_id: AtomicU64,
    closed: AtomicBool,
    metrics: Option<RelayMetrics>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that keeps `subscribers_active` in step with its entries.
    pub fn with_metrics(metrics: RelayMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::default()
        }
    }

    /// Insert a subscriber and return its handle.
    ///
    /// Ids are never reused, so a reconnecting peer always gets a new one.
    pub fn add(&self, subscriber: Subscriber) -> SubscriberId {
        let id = SubscriberId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.entries.insert(id, subscriber);
        if let Some(metrics) = &self.metrics {
            metrics.subscriber_added();
        }
        id
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        match self.entries.remove(&id) {
            Some((_, subscriber)) => {
                subscriber.mark_closed();
                if let Some(metrics) = &self.metrics {
                    metrics.subscriber_removed();
                }
                true
            }
            None => false,
        }
    }

    /// Copy out the current subscriber set.
    ///
    /// The returned snapshot owns its handles; concurrent `add`/`remove`
    /// calls proceed on the live map while it is iterated.
    pub fn snapshot(&self) -> Result<Snapshot, RelayError> {
        if self.is_closed() {
            return Err(RelayError::RegistryUnavailable);
        }
        let entries = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        Ok(Snapshot { entries })
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop serving snapshots. Existing entries stay until removed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// An owned, immutable view of the registry at one instant.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(SubscriberId, Subscriber)>,
}

impl Snapshot {
    pub fn iter(&self) -> impl Iterator<Item = &(SubscriberId, Subscriber)> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<SubscriberId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Snapshot {
    type Item = (SubscriberId, Subscriber);
    type IntoIter = std::vec::IntoIter<(SubscriberId, Subscriber)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
