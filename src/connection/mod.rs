//! Connection lifecycle manager — one subscriber connection from handshake
//! to close.
//!
//! The lifecycle is encoded in types:
//!
//! ```text
//! PendingConnection ──open()──► OpenConnection ──run() / close()──► ConnectionOutcome
//!    (Connecting)                  (Open)                              (Closed)
//! ```
//!
//! `open()` registers the subscriber; leaving `Open` (by `run()` returning,
//! `close()`, or dropping the connection) removes it exactly once. Nothing
//! leads back from `Closed`: a reconnecting peer goes through
//! [`ConnectionManager::accept`] again and gets a new id.
//!
//! [`OpenConnection::run`] is transport-agnostic. It writes relayed events
//! to any `Sink<Payload>` and watches any `Stream` of [`PeerFrame`]s for
//! closure, so the HTTP layer only has to adapt its WebSocket type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::event::Payload;
use crate::registry::{Mailbox, Subscriber, SubscriberId, SubscriberRegistry};

/// Connection state, for logs and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// An inbound frame from the peer, reduced to what the lifecycle cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Text(String),
    /// Binary, ping or pong frames.
    Other,
    Close,
}

/// Why a connection reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or ended the stream.
    PeerClosed,
    /// The inbound stream yielded an error.
    ProtocolError(String),
    /// Writing a relayed event failed or timed out.
    SendFailed(String),
    /// The broadcast engine pruned this subscriber.
    Evicted,
    /// The hub is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::ProtocolError(e) => write!(f, "protocol error: {}", e),
            CloseReason::SendFailed(e) => write!(f, "send failed: {}", e),
            CloseReason::Evicted => write!(f, "evicted"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Final report for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub id: SubscriberId,
    pub reason: CloseReason,
    /// Events written to the peer.
    pub delivered: u64,
}

/// Per-connection tuning.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Events a subscriber may have queued before it counts as too slow.
    pub mailbox_capacity: usize,
    /// Upper bound on a single write to the peer.
    pub send_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            send_timeout: Duration::from_secs(1),
        }
    }
}

/// Accepts connections and ties each one to the registry.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    registry: Arc<SubscriberRegistry>,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        settings: ConnectionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            settings,
            shutdown,
        }
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.settings
    }

    /// Start a new connection in `Connecting`.
    ///
    /// Refused once shutdown has begun.
    pub fn accept(&self) -> Result<PendingConnection, RelayError> {
        if self.shutdown.is_cancelled() || self.registry.is_closed() {
            return Err(RelayError::RegistryUnavailable);
        }
        Ok(PendingConnection {
            manager: self.clone(),
        })
    }
}

/// A connection whose handshake has not completed.
#[derive(Debug)]
pub struct PendingConnection {
    manager: ConnectionManager,
}

impl PendingConnection {
    pub fn state(&self) -> ConnectionState {
        ConnectionState::Connecting
    }

    /// Handshake succeeded: register the subscriber.
    pub fn open(self) -> Result<OpenConnection, RelayError> {
        let manager = self.manager;
        if manager.shutdown.is_cancelled() || manager.registry.is_closed() {
            return Err(RelayError::RegistryUnavailable);
        }

        let (subscriber, mailbox) = Subscriber::channel(manager.settings.mailbox_capacity);
        let id = manager.registry.add(subscriber);
        info!(subscriber_id = %id, "Client connected");

        Ok(OpenConnection {
            id,
            manager,
            mailbox,
            closed: false,
        })
    }
}

/// A registered subscriber connection.
#[derive(Debug)]
pub struct OpenConnection {
    id: SubscriberId,
    manager: ConnectionManager,
    mailbox: Mailbox,
    closed: bool,
}

impl OpenConnection {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Relay events to the peer until the connection closes.
    pub async fn run<Tx, Rx, E>(mut self, mut sink: Tx, mut stream: Rx) -> ConnectionOutcome
    where
        Tx: Sink<Payload> + Unpin,
        Tx::Error: fmt::Display,
        Rx: Stream<Item = Result<PeerFrame, E>> + Unpin,
        E: fmt::Display,
    {
        let shutdown = self.manager.shutdown.clone();
        let send_timeout = self.manager.settings.send_timeout;
        let mut delivered = 0u64;

        let reason = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break CloseReason::Shutdown,

                frame = stream.next() => match frame {
                    None | Some(Ok(PeerFrame::Close)) => break CloseReason::PeerClosed,
                    Some(Ok(PeerFrame::Text(text))) => {
                        debug!(subscriber_id = %self.id, len = text.len(), "Ignoring inbound message");
                    }
                    Some(Ok(PeerFrame::Other)) => {}
                    Some(Err(e)) => break CloseReason::ProtocolError(e.to_string()),
                },

                payload = self.mailbox.recv() => match payload {
                    Some(payload) => match write(&mut sink, payload, send_timeout).await {
                        Ok(()) => delivered += 1,
                        Err(e) => break CloseReason::SendFailed(e),
                    },
                    None => break CloseReason::Evicted,
                },
            }
        };

        if reason == CloseReason::Shutdown {
            // Deliver what was already accepted for this subscriber.
            self.mailbox.close();
            while let Some(payload) = self.mailbox.try_recv() {
                if write(&mut sink, payload, send_timeout).await.is_err() {
                    break;
                }
                delivered += 1;
            }
        }

        if !matches!(reason, CloseReason::SendFailed(_)) {
            let _ = tokio::time::timeout(send_timeout, sink.close()).await;
        }

        match &reason {
            CloseReason::PeerClosed | CloseReason::Shutdown => {
                info!(subscriber_id = %self.id, delivered, reason = %reason, "WebSocket client disconnected");
            }
            _ => {
                warn!(subscriber_id = %self.id, delivered, reason = %reason, "WebSocket client dropped");
            }
        }

        self.finish();
        ConnectionOutcome {
            id: self.id,
            reason,
            delivered,
        }
    }

    /// Close without running, e.g. when the transport failed right after
    /// the handshake.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.mailbox.close();
        self.manager.registry.remove(self.id);
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.finish();
    }
}

async fn write<Tx>(sink: &mut Tx, payload: Payload, limit: Duration) -> Result<(), String>
where
    Tx: Sink<Payload> + Unpin,
    Tx::Error: fmt::Display,
{
    match tokio::time::timeout(limit, sink.send(payload)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write timed out after {:?}", limit)),
    }
}
